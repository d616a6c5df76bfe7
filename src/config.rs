//! # Manager configuration.
//!
//! [`ManagerConfig`] is loaded from a YAML parameter file with the following
//! shape (the `controller_manager:` block of the robot's parameter store):
//!
//! ```yaml
//! controller_manager:
//!   failproof_controller: "FreezeController"
//!   time_step: 0.0025
//!   is_real_robot: true
//!   controller_pairs:
//!     - controller:
//!         plugin_name: "WalkPlugin"
//!         name: "walk"
//!         is_ros: true
//!         parameter_package: "/etc/anymal/walk"
//!         parameter_path: "params.xml"
//!       emergency_controller:
//!         plugin_name: "StandPlugin"
//!         name: "stand"
//! ```
//!
//! ## Rules
//! - `failproof_controller` and a positive `time_step` are required; anything
//!   else is optional.
//! - A missing `emergency_controller` downgrades that pair to
//!   "fallback = failproof".
//! - A malformed pair entry is skipped with a warning; it never aborts
//!   setup. Only the failproof entry is load-bearing.
//! - Entries wrapped in a legacy `controller_pair:` key are unwrapped
//!   transparently.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::SetupError;

/// One controller of a pair, as named in the parameter file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControllerEntry {
    /// Plugin class to construct the controller from.
    pub plugin_name: String,
    /// Name the controller is addressed by in switch requests.
    pub name: String,
    /// True if the plugin is transport-aware and needs a surface handle.
    #[serde(default)]
    pub is_ros: bool,
    /// Package directory the controller loads parameters from.
    #[serde(default)]
    pub parameter_package: String,
    /// Parameter file path, relative to the package directory.
    #[serde(default)]
    pub parameter_path: String,
}

impl ControllerEntry {
    /// Joined parameter location, or `None` when the entry declares none.
    pub fn full_parameter_path(&self) -> Option<PathBuf> {
        match (
            self.parameter_package.is_empty(),
            self.parameter_path.is_empty(),
        ) {
            (true, true) => None,
            (true, false) => Some(PathBuf::from(&self.parameter_path)),
            (false, true) => Some(PathBuf::from(&self.parameter_package)),
            (false, false) => {
                Some(Path::new(&self.parameter_package).join(&self.parameter_path))
            }
        }
    }
}

/// A nominal controller with its optional paired emergency controller.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerPairEntry {
    /// The nominal controller.
    pub controller: ControllerEntry,
    /// First fallback on the nominal's failure; failproof when absent.
    #[serde(default)]
    pub emergency_controller: Option<ControllerEntry>,
}

/// Validated controller-manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Plugin class of the failproof controller. Required.
    pub failproof_controller: String,
    /// Controller pairs in declaration order.
    pub controller_pairs: Vec<ControllerPairEntry>,
    /// Fixed control tick period.
    pub time_step: Duration,
    /// True when commands reach physical hardware.
    pub is_real_robot: bool,
}

#[derive(Deserialize)]
struct RawFile {
    controller_manager: RawManager,
}

#[derive(Deserialize)]
struct RawManager {
    failproof_controller: String,
    #[serde(default)]
    controller_pairs: Vec<serde_yaml::Value>,
    time_step: f64,
    #[serde(default)]
    is_real_robot: bool,
}

impl ManagerConfig {
    /// Parses the `controller_manager:` block from a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, SetupError> {
        let raw: RawFile = serde_yaml::from_str(text).map_err(|e| SetupError::Config {
            reason: e.to_string(),
        })?;
        Self::from_raw(raw.controller_manager)
    }

    /// Reads and parses a YAML parameter file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SetupError::Config {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&text)
    }

    fn from_raw(raw: RawManager) -> Result<Self, SetupError> {
        if !raw.time_step.is_finite() || raw.time_step <= 0.0 {
            return Err(SetupError::Config {
                reason: format!("time_step must be a positive number, got {}", raw.time_step),
            });
        }
        if raw.failproof_controller.is_empty() {
            return Err(SetupError::Config {
                reason: "failproof_controller must not be empty".to_string(),
            });
        }

        let mut controller_pairs = Vec::with_capacity(raw.controller_pairs.len());
        for (index, value) in raw.controller_pairs.into_iter().enumerate() {
            match parse_pair(value) {
                Ok(pair) => controller_pairs.push(pair),
                Err(reason) => {
                    warn!(index, %reason, "skipping malformed controller pair entry");
                }
            }
        }

        Ok(Self {
            failproof_controller: raw.failproof_controller,
            controller_pairs,
            time_step: Duration::from_secs_f64(raw.time_step),
            is_real_robot: raw.is_real_robot,
        })
    }
}

/// Parses one pair entry, unwrapping a legacy `controller_pair:` key.
fn parse_pair(value: serde_yaml::Value) -> Result<ControllerPairEntry, String> {
    let wrapper_key = serde_yaml::Value::from("controller_pair");
    let value = match value {
        serde_yaml::Value::Mapping(ref map) if map.len() == 1 => match map.get(&wrapper_key) {
            Some(inner) => inner.clone(),
            None => value,
        },
        other => other,
    };

    let pair: ControllerPairEntry =
        serde_yaml::from_value(value).map_err(|e| e.to_string())?;
    if pair.controller.name.is_empty() || pair.controller.plugin_name.is_empty() {
        return Err("controller name and plugin_name must not be empty".to_string());
    }
    if let Some(emergency) = &pair.emergency_controller {
        if emergency.name.is_empty() || emergency.plugin_name.is_empty() {
            return Err("emergency name and plugin_name must not be empty".to_string());
        }
    }
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
controller_manager:
  failproof_controller: "FreezeController"
  time_step: 0.0025
  is_real_robot: true
  controller_pairs:
    - controller:
        plugin_name: "WalkPlugin"
        name: "walk"
        is_ros: true
        parameter_package: "/etc/anymal/walk"
        parameter_path: "params.xml"
      emergency_controller:
        plugin_name: "StandPlugin"
        name: "stand"
    - controller:
        plugin_name: "TrotPlugin"
        name: "trot"
"#;

    #[test]
    fn parses_full_config() {
        let cfg = ManagerConfig::from_yaml_str(FULL).unwrap();
        assert_eq!(cfg.failproof_controller, "FreezeController");
        assert_eq!(cfg.time_step, Duration::from_secs_f64(0.0025));
        assert!(cfg.is_real_robot);
        assert_eq!(cfg.controller_pairs.len(), 2);

        let walk = &cfg.controller_pairs[0];
        assert!(walk.controller.is_ros);
        assert_eq!(
            walk.controller.full_parameter_path(),
            Some(PathBuf::from("/etc/anymal/walk/params.xml"))
        );
        assert_eq!(
            walk.emergency_controller.as_ref().map(|e| e.name.as_str()),
            Some("stand")
        );

        let trot = &cfg.controller_pairs[1];
        assert!(trot.emergency_controller.is_none());
        assert_eq!(trot.controller.full_parameter_path(), None);
    }

    #[test]
    fn unwraps_legacy_pair_key() {
        let yaml = r#"
controller_manager:
  failproof_controller: "FreezeController"
  time_step: 0.01
  controller_pairs:
    - controller_pair:
        controller:
          plugin_name: "WalkPlugin"
          name: "walk"
"#;
        let cfg = ManagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.controller_pairs.len(), 1);
        assert_eq!(cfg.controller_pairs[0].controller.name, "walk");
    }

    #[test]
    fn malformed_pair_is_skipped_not_fatal() {
        let yaml = r#"
controller_manager:
  failproof_controller: "FreezeController"
  time_step: 0.01
  controller_pairs:
    - controller:
        plugin_name: "WalkPlugin"
        name: "walk"
    - controller: "not a mapping"
    - controller:
        plugin_name: ""
        name: "anon"
"#;
        let cfg = ManagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.controller_pairs.len(), 1);
    }

    #[test]
    fn missing_failproof_is_an_error() {
        let yaml = r#"
controller_manager:
  time_step: 0.01
"#;
        let err = ManagerConfig::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.as_label(), "setup_config");
    }

    #[test]
    fn nonpositive_time_step_is_an_error() {
        let yaml = r#"
controller_manager:
  failproof_controller: "FreezeController"
  time_step: 0.0
"#;
        let err = ManagerConfig::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.as_label(), "setup_config");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let cfg = ManagerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(cfg.controller_pairs.len(), 2);
    }
}
