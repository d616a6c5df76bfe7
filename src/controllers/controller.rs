//! # Controller capability interface.
//!
//! Defines the uniform contract the manager drives every controller through,
//! regardless of role. The manager never sees controller internals; it calls
//! this interface on exactly one instance per tick.
//!
//! ## Lifecycle
//! ```text
//! factory() ──► set_parameter_path() ──► initialize(dt) ──► advance()*
//!                                             ▲                │
//!                                             │   reset()      │ stop()
//!                                             └────────────────┘
//! ```
//!
//! ## Rules
//! - `initialize` is idempotent once the controller is initialised; it may
//!   fail for nominal/emergency controllers and **must not** fail for the
//!   failproof controller.
//! - `advance` reads state under a shared lock and writes the command under
//!   an exclusive lock. It should finish within the tick budget; the manager
//!   measures but does not enforce.
//! - `stop` must succeed; it releases transient resources only.
//! - `pre_stop` runs on the outgoing controller immediately before the
//!   active-pointer swap. Keep it short; the swap waits on it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ControllerError;

/// Role of a controller in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerRole {
    /// Regular locomotion controller, selected by operator switches.
    Nominal,
    /// Per-nominal fallback, entered on the paired nominal's failure.
    Emergency,
    /// Final fallback. Guaranteed to initialise and advance successfully.
    Failproof,
}

impl ControllerRole {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerRole::Nominal => "nominal",
            ControllerRole::Emergency => "emergency",
            ControllerRole::Failproof => "failproof",
        }
    }
}

/// Capability interface of a locomotion controller.
///
/// Generic over the robot state type `S` and the actuator command type `C`;
/// implementations receive their [`StateCell`](crate::StateCell) and
/// [`CommandCell`](crate::CommandCell) from the plugin factory and keep
/// them for the lifetime of the instance.
///
/// Implementations for the failproof role additionally carry the contract
/// that `initialize` and `advance` never return an error.
#[async_trait]
pub trait Controller<S, C>: Send + 'static {
    /// Returns the controller's declared name.
    fn name(&self) -> &str;

    /// Declares where the controller may load tuning data from.
    ///
    /// The actual load happens during [`initialize`](Controller::initialize).
    /// Controllers without parameters ignore the path.
    fn set_parameter_path(&mut self, _path: &Path) {}

    /// Prepares the controller for running at fixed tick `dt`.
    async fn initialize(&mut self, dt: Duration) -> Result<(), ControllerError>;

    /// Computes one control step.
    async fn advance(&mut self) -> Result<(), ControllerError>;

    /// Returns to a clean post-initialise state without destroying the
    /// instance. Called when re-entering a previously stopped controller and
    /// immediately after the controller becomes active.
    async fn reset(&mut self) -> Result<(), ControllerError> {
        Ok(())
    }

    /// Releases transient resources. Must succeed.
    async fn stop(&mut self) -> Result<(), ControllerError> {
        Ok(())
    }

    /// Synchronous-style hook invoked on the outgoing controller immediately
    /// before the active-pointer swap.
    async fn pre_stop(&mut self) {}
}

impl<S: 'static, C: 'static> std::fmt::Debug for dyn Controller<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("name", &self.name()).finish()
    }
}
