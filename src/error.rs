//! # Error types used by the manager runtime and controllers.
//!
//! This module defines three error enums:
//!
//! - [`SetupError`] errors raised while assembling the manager (plugin
//!   resolution, configuration, failproof bring-up).
//! - [`ControllerError`] errors raised by individual controller operations.
//! - [`ManagerError`] errors raised by the running manager's request surface.
//!
//! All types provide `as_label()` helpers for logs/metrics.
//! Switch outcomes are not errors; they are reported through
//! [`SwitchStatus`](crate::manager::SwitchStatus).

use thiserror::Error;

/// # Errors produced while setting up the controller manager.
///
/// Only [`SetupError::FailproofMissing`] is fatal: without a final fallback
/// the manager must not run a single tick. Every other setup failure is
/// reported, the offending controller is skipped or downgraded, and setup
/// continues.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SetupError {
    /// The failproof controller plugin could not be resolved or brought up.
    #[error("failproof controller '{name}' unavailable: {reason}")]
    FailproofMissing {
        /// Requested failproof plugin class name.
        name: String,
        /// What went wrong (not registered, construction failed, ...).
        reason: String,
    },

    /// A nominal or emergency controller plugin failed to load.
    #[error("plugin '{name}' failed to load: {reason}")]
    PluginLoad {
        /// Plugin class name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A plugin declared state/command type names that do not match the
    /// registry's configured names.
    #[error(
        "plugin '{name}' declares types ({state}, {command}), registry expects ({expected_state}, {expected_command})"
    )]
    TypeMismatch {
        /// Plugin class name.
        name: String,
        /// Declared robot state type name.
        state: String,
        /// Declared actuator command type name.
        command: String,
        /// Expected robot state type name.
        expected_state: String,
        /// Expected actuator command type name.
        expected_command: String,
    },

    /// The parameter file or an individual key is invalid.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl SetupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SetupError::FailproofMissing { .. } => "setup_failproof_missing",
            SetupError::PluginLoad { .. } => "setup_plugin_load",
            SetupError::TypeMismatch { .. } => "setup_type_mismatch",
            SetupError::Config { .. } => "setup_config",
        }
    }

    /// Indicates whether the error must abort the process before any tick runs.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SetupError::FailproofMissing { .. })
    }
}

/// # Errors produced by controller operations.
///
/// Controllers must fold their internal failures into these variants; nothing
/// unstructured crosses the capability interface. The manager reclassifies
/// them at its boundary: an [`Initialize`](ControllerError::Initialize)
/// failure escalates along the fallback chain, an
/// [`Advance`](ControllerError::Advance) failure triggers a failure
/// emergency stop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Initialisation failed; the controller is not runnable.
    #[error("initialization failed: {reason}")]
    Initialize { reason: String },

    /// A control step failed; the produced command must not be trusted.
    #[error("advance failed: {reason}")]
    Advance { reason: String },

    /// Reset to a clean post-initialisation state failed.
    #[error("reset failed: {reason}")]
    Reset { reason: String },

    /// Releasing transient resources failed.
    #[error("stop failed: {reason}")]
    Stop { reason: String },
}

impl ControllerError {
    /// Shorthand for an [`Initialize`](ControllerError::Initialize) error.
    pub fn init(reason: impl Into<String>) -> Self {
        ControllerError::Initialize {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Advance`](ControllerError::Advance) error.
    pub fn advance(reason: impl Into<String>) -> Self {
        ControllerError::Advance {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::Initialize { .. } => "controller_initialize",
            ControllerError::Advance { .. } => "controller_advance",
            ControllerError::Reset { .. } => "controller_reset",
            ControllerError::Stop { .. } => "controller_stop",
        }
    }
}

/// # Errors produced by the running manager's request surface.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerError {
    /// `clear_emergency_stop` was called while no emergency stop is latched.
    #[error("emergency stop is not latched")]
    NotLatched,

    /// The manager behind a surface handle has been dropped.
    #[error("controller manager is no longer running")]
    Detached,
}

impl ManagerError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::NotLatched => "manager_not_latched",
            ManagerError::Detached => "manager_detached",
        }
    }
}
