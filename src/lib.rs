//! # gaitvisor
//!
//! **Gaitvisor** is the controller-manager core of a legged-robot locomotion
//! stack.
//!
//! At every control tick it selects exactly one active locomotion
//! controller, advances it, and enforces a well-defined fallback chain when
//! a controller fails or the operator issues an emergency stop. Actuator
//! commands are always produced by *some* valid controller, never by a
//! stale or crashed one.
//!
//! ## Features
//!
//! | Area               | Description                                                         | Key types / traits                                |
//! |--------------------|---------------------------------------------------------------------|---------------------------------------------------|
//! | **Capability API** | Uniform contract every controller satisfies.                        | [`Controller`], [`ControllerRole`]                |
//! | **Fallback chain** | Nominal → paired emergency → failproof escalation.                  | [`FreezeController`], [`EmergencyStopKind`]       |
//! | **Plugins**        | Class-name → factory registry with type-name checking.              | [`PluginRegistry`], [`PluginDeclaration`]         |
//! | **Shared cells**   | Reader/writer cells for robot state and actuator command.           | [`StateCell`], [`CommandCell`]                    |
//! | **Surface**        | Switch/query/estop requests and latched broadcasts.                 | [`SurfaceHandle`], [`SwitchStatus`]               |
//! | **Observability**  | Sequenced lifecycle events with non-blocking fan-out.               | [`Event`], [`Subscribe`]                          |
//! | **Errors**         | Typed errors for setup, controllers and the manager.                | [`SetupError`], [`ControllerError`]               |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ```no_run
//! use gaitvisor::{
//!     CommandCell, FreezeController, ManagerBuilder, ManagerConfig, PluginDeclaration,
//!     PluginRegistry, StateCell,
//! };
//!
//! #[derive(Default)]
//! struct RobotState;
//! #[derive(Default)]
//! struct ActuatorCommand;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry: PluginRegistry<RobotState, ActuatorCommand> = PluginRegistry::new();
//!     registry.register(PluginDeclaration::failproof("FreezeController", |ctx| {
//!         Box::new(FreezeController::new("freeze", ctx.command))
//!     }))?;
//!
//!     let config = ManagerConfig::from_yaml_str(
//!         "controller_manager:\n  failproof_controller: \"FreezeController\"\n  time_step: 0.0025\n",
//!     )?;
//!
//!     let state = StateCell::new(RobotState);
//!     let command = CommandCell::new(ActuatorCommand);
//!     let manager = ManagerBuilder::new(config, state, command)
//!         .build(&registry)
//!         .await?;
//!
//!     // Periodic ticks now advance the failproof controller until the
//!     // operator switches to a nominal one.
//!     manager.start().await;
//!     let surface = manager.surface();
//!     assert_eq!(surface.active_controller().await?, "FreezeController");
//!
//!     manager.cleanup().await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod cell;
mod config;
mod controllers;
mod error;
mod events;
mod manager;
mod registry;
mod subscribers;
mod surface;

// ---- Public re-exports ----

pub use cell::{CommandCell, SharedCell, StateCell};
pub use config::{ControllerEntry, ControllerPairEntry, ManagerConfig};
pub use controllers::{
    Controller, ControllerHandle, ControllerRole, FreezeController, HandleRef, LifecycleStatus,
};
pub use error::{ControllerError, ManagerError, SetupError};
pub use events::{Bus, Event, EventKind};
pub use manager::{
    ControllerManager, EmergencyStopKind, ManagerBuilder, ManagerOptions, ManagerPhase,
    ManagerState, SwitchStatus, TickStats,
};
pub use registry::{PluginContext, PluginDeclaration, PluginFactory, PluginRegistry};
pub use subscribers::{Subscribe, SubscriberSet};
pub use surface::{SurfaceHandle, TriggerResponse};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
