//! Manager core: lifecycle, switching, and the failure-escalation chain.
//!
//! ## Files & responsibilities
//! - **core.rs**: [`ControllerManager`] and [`ManagerBuilder`]; owns the
//!   controller handles, the active-controller slot, the switching state
//!   machine and the emergency-stop protocol; publishes lifecycle events
//!   and latched broadcasts.
//! - **machine.rs**: state-machine vocabulary ([`ManagerPhase`],
//!   [`ManagerState`], [`SwitchStatus`], [`EmergencyStopKind`]).
//! - **worker.rs**: the periodic tick task and [`TickStats`].
//!
//! ## Wiring (module-level flow)
//! ```text
//! ManagerConfig + PluginRegistry + cells
//!   └─ ManagerBuilder::build()
//!        ├─ resolve failproof (fatal when missing), initialise, make active
//!        ├─ resolve controller pairs (skip / downgrade on plugin errors)
//!        └─ spawn fan-out listener (Bus → SubscriberSet)
//!
//! ControllerManager::start()
//!   └─ spawn tick worker: every dt
//!        ├─ snapshot active (short lock)
//!        ├─ active.advance()
//!        └─ on error → failure emergency stop
//!
//! switch_controller(name)
//!   ├─ admission under the status lock (phase, latch, registry lookup)
//!   ├─ initialise target (concurrent with ticks on the old controller)
//!   └─ commit: pre-stop old → atomic swap → reset new → stop old
//!              → ControllerChanged
//!
//! emergency_stop(kind)
//!   ├─ no-op while latched (idempotent)
//!   ├─ fallback = paired emergency else failproof; failproof if its
//!   │  initialisation fails (failproof itself cannot fail)
//!   └─ pre-stop → swap → stop → latch → emergency_state(false),
//!      ControllerChanged
//! ```
//!
//! ## Notes
//! - Event ordering is maintained via a global monotonic sequence number.
//! - All notifications are delivered after the manager's locks are released,
//!   so observers may re-enter the manager (no recursive lock needed).

mod core;
mod machine;
mod worker;

pub use self::core::{ControllerManager, ManagerBuilder, ManagerOptions};
pub use machine::{EmergencyStopKind, ManagerPhase, ManagerState, SwitchStatus};
pub use worker::TickStats;
