//! # Plugin registry: controller class name → factory.
//!
//! The registry is populated by a plugin-loader collaborator at process
//! start and treated as read-only by the manager afterwards. One registry
//! serves all three roles; transport-awareness is a capability bit on the
//! declaration rather than a separate loader, so transport-aware controllers
//! simply receive a [`SurfaceHandle`](crate::SurfaceHandle) in
//! their construction context.
//!
//! ## Declaration
//! A plugin declares `{ role, class_name, factory, state_type_name,
//! command_type_name, needs_transport }`. Registration rejects declarations
//! whose state/command type names do not match the registry's configured
//! names, so a plugin compiled against the wrong robot model never reaches a
//! factory call.
//!
//! ## Example
//! ```rust
//! use gaitvisor::{FreezeController, PluginDeclaration, PluginRegistry};
//!
//! #[derive(Default)]
//! struct State;
//! #[derive(Default)]
//! struct Command;
//!
//! let registry: PluginRegistry<State, Command> = PluginRegistry::new();
//! registry
//!     .register(PluginDeclaration::failproof("FreezeController", |ctx| {
//!         Box::new(FreezeController::new("freeze", ctx.command))
//!     }))
//!     .unwrap();
//! assert!(registry.contains(gaitvisor::ControllerRole::Failproof, "FreezeController"));
//! ```

use std::any::type_name;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cell::{CommandCell, StateCell};
use crate::controllers::{Controller, ControllerRole};
use crate::error::SetupError;
use crate::surface::SurfaceHandle;

/// Everything a plugin factory gets to work with.
///
/// Carries the shared cells the controller binds to, the transport surface
/// for transport-aware plugins, and the real-robot flag.
pub struct PluginContext<S, C> {
    /// Robot state cell, read during `advance`.
    pub state: StateCell<S>,
    /// Actuator command cell, written during `advance`.
    pub command: CommandCell<C>,
    /// Surface handle; `Some` iff the plugin declared `needs_transport`.
    pub surface: Option<SurfaceHandle<S, C>>,
    /// True when commands reach physical hardware.
    pub is_real_robot: bool,
}

impl<S, C> Clone for PluginContext<S, C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            command: self.command.clone(),
            surface: self.surface.clone(),
            is_real_robot: self.is_real_robot,
        }
    }
}

/// Factory producing a freshly constructed, unmanaged controller instance.
pub type PluginFactory<S, C> =
    Arc<dyn Fn(PluginContext<S, C>) -> Box<dyn Controller<S, C>> + Send + Sync>;

/// A plugin's registration record.
///
/// Built via the role constructors ([`failproof`](PluginDeclaration::failproof),
/// [`nominal`](PluginDeclaration::nominal), [`emergency`](PluginDeclaration::emergency)),
/// which fill the declared type names from the factory's generic parameters.
/// Plugins compiled elsewhere can override them with
/// [`declared_types`](PluginDeclaration::declared_types).
pub struct PluginDeclaration<S, C> {
    role: ControllerRole,
    class_name: String,
    state_type_name: String,
    command_type_name: String,
    needs_transport: bool,
    factory: PluginFactory<S, C>,
}

impl<S, C> PluginDeclaration<S, C> {
    fn new<F>(role: ControllerRole, class_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext<S, C>) -> Box<dyn Controller<S, C>> + Send + Sync + 'static,
    {
        Self {
            role,
            class_name: class_name.into(),
            state_type_name: type_name::<S>().to_string(),
            command_type_name: type_name::<C>().to_string(),
            needs_transport: false,
            factory: Arc::new(factory),
        }
    }

    /// Declares a failproof controller class.
    pub fn failproof<F>(class_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext<S, C>) -> Box<dyn Controller<S, C>> + Send + Sync + 'static,
    {
        Self::new(ControllerRole::Failproof, class_name, factory)
    }

    /// Declares a nominal controller class.
    pub fn nominal<F>(class_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext<S, C>) -> Box<dyn Controller<S, C>> + Send + Sync + 'static,
    {
        Self::new(ControllerRole::Nominal, class_name, factory)
    }

    /// Declares an emergency controller class.
    pub fn emergency<F>(class_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext<S, C>) -> Box<dyn Controller<S, C>> + Send + Sync + 'static,
    {
        Self::new(ControllerRole::Emergency, class_name, factory)
    }

    /// Marks the plugin as transport-aware: its factory receives a
    /// [`SurfaceHandle`] in the construction context.
    pub fn with_transport(mut self) -> Self {
        self.needs_transport = true;
        self
    }

    /// Overrides the declared state/command type names.
    pub fn declared_types(
        mut self,
        state: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        self.state_type_name = state.into();
        self.command_type_name = command.into();
        self
    }
}

struct Registered<S, C> {
    factory: PluginFactory<S, C>,
    needs_transport: bool,
}

/// Registry of controller plugin classes, keyed by role and class name.
pub struct PluginRegistry<S, C> {
    expected_state: String,
    expected_command: String,
    entries: DashMap<(ControllerRole, String), Registered<S, C>>,
}

impl<S, C> PluginRegistry<S, C> {
    /// Creates a registry expecting the crate-local type names of `S`/`C`.
    pub fn new() -> Self {
        Self::with_type_names(type_name::<S>(), type_name::<C>())
    }

    /// Creates a registry expecting explicit scoped type names
    /// (e.g. `"anymal_model::State"`).
    pub fn with_type_names(state: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            expected_state: state.into(),
            expected_command: command.into(),
            entries: DashMap::new(),
        }
    }

    /// Registers a plugin declaration.
    ///
    /// Rejects declarations with mismatched state/command type names,
    /// duplicate `(role, class)` keys, and transport-aware failproof plugins
    /// (the final fallback must not depend on a transport being up).
    pub fn register(&self, decl: PluginDeclaration<S, C>) -> Result<(), SetupError> {
        if decl.state_type_name != self.expected_state
            || decl.command_type_name != self.expected_command
        {
            return Err(SetupError::TypeMismatch {
                name: decl.class_name,
                state: decl.state_type_name,
                command: decl.command_type_name,
                expected_state: self.expected_state.clone(),
                expected_command: self.expected_command.clone(),
            });
        }
        if decl.role == ControllerRole::Failproof && decl.needs_transport {
            return Err(SetupError::PluginLoad {
                name: decl.class_name,
                reason: "failproof plugins cannot be transport-aware".to_string(),
            });
        }

        let key = (decl.role, decl.class_name.clone());
        if self.entries.contains_key(&key) {
            return Err(SetupError::PluginLoad {
                name: decl.class_name,
                reason: format!("{} class already registered", decl.role.as_label()),
            });
        }
        self.entries.insert(
            key,
            Registered {
                factory: decl.factory,
                needs_transport: decl.needs_transport,
            },
        );
        Ok(())
    }

    /// Constructs a fresh instance of the given class.
    ///
    /// `ctx.surface` is stripped for transport-agnostic plugins, so a factory
    /// only ever observes the surface it declared a need for.
    pub fn resolve(
        &self,
        role: ControllerRole,
        class_name: &str,
        mut ctx: PluginContext<S, C>,
    ) -> Result<Box<dyn Controller<S, C>>, SetupError> {
        let key = (role, class_name.to_string());
        let (factory, needs_transport) = {
            let entry = self.entries.get(&key).ok_or_else(|| SetupError::PluginLoad {
                name: class_name.to_string(),
                reason: format!("no {} plugin registered under this class", role.as_label()),
            })?;
            (Arc::clone(&entry.factory), entry.needs_transport)
        };
        if !needs_transport {
            ctx.surface = None;
        }
        Ok(factory(ctx))
    }

    /// True if a `(role, class)` pair is registered.
    pub fn contains(&self, role: ControllerRole, class_name: &str) -> bool {
        self.entries
            .contains_key(&(role, class_name.to_string()))
    }

    /// Whether the class declared a transport need; `None` when unregistered.
    pub fn needs_transport(&self, role: ControllerRole, class_name: &str) -> Option<bool> {
        self.entries
            .get(&(role, class_name.to_string()))
            .map(|e| e.needs_transport)
    }

    /// Sorted class names registered under `role`.
    pub fn classes(&self, role: ControllerRole) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == role)
            .map(|e| e.key().1.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

impl<S, C> Default for PluginRegistry<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::FreezeController;

    type Registry = PluginRegistry<u32, f64>;

    fn freeze_decl() -> PluginDeclaration<u32, f64> {
        PluginDeclaration::failproof("FreezeController", |ctx| {
            Box::new(FreezeController::new("freeze", ctx.command))
        })
    }

    fn ctx() -> PluginContext<u32, f64> {
        PluginContext {
            state: StateCell::new(0),
            command: CommandCell::new(0.0),
            surface: None,
            is_real_robot: false,
        }
    }

    #[test]
    fn register_and_resolve() {
        let registry = Registry::new();
        registry.register(freeze_decl()).unwrap();

        let controller = registry
            .resolve(ControllerRole::Failproof, "FreezeController", ctx())
            .unwrap();
        assert_eq!(controller.name(), "freeze");
    }

    #[test]
    fn duplicate_class_rejected() {
        let registry = Registry::new();
        registry.register(freeze_decl()).unwrap();
        let err = registry.register(freeze_decl()).unwrap_err();
        assert_eq!(err.as_label(), "setup_plugin_load");
    }

    #[test]
    fn mismatched_type_names_rejected() {
        let registry = Registry::with_type_names("anymal::State", "anymal::Command");
        let err = registry.register(freeze_decl()).unwrap_err();
        assert_eq!(err.as_label(), "setup_type_mismatch");
    }

    #[test]
    fn transport_aware_failproof_rejected() {
        let registry = Registry::new();
        let err = registry
            .register(freeze_decl().with_transport())
            .unwrap_err();
        assert_eq!(err.as_label(), "setup_plugin_load");
    }

    #[test]
    fn unknown_class_is_not_found() {
        let registry = Registry::new();
        let err = registry
            .resolve(ControllerRole::Nominal, "Bound", ctx())
            .unwrap_err();
        assert!(matches!(err, SetupError::PluginLoad { name, .. } if name == "Bound"));
    }

    #[test]
    fn classes_are_sorted_per_role() {
        let registry = Registry::new();
        registry
            .register(PluginDeclaration::nominal("Walk", |ctx| {
                Box::new(FreezeController::new("walk", ctx.command))
            }))
            .unwrap();
        registry
            .register(PluginDeclaration::nominal("Bound", |ctx| {
                Box::new(FreezeController::new("bound", ctx.command))
            }))
            .unwrap();
        assert_eq!(registry.classes(ControllerRole::Nominal), vec!["Bound", "Walk"]);
        assert!(registry.classes(ControllerRole::Emergency).is_empty());
    }
}
