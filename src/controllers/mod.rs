//! # Controller abstractions for supervised locomotion.
//!
//! - **[`Controller`]** — capability trait every controller (nominal,
//!   emergency, failproof) must satisfy
//! - **[`ControllerRole`]** — tagged role deciding a controller's place in
//!   the fallback chain
//! - **[`ControllerHandle`]** — owns one controller instance plus its
//!   lifecycle status; all manager access goes through the handle
//! - **[`FreezeController`]** — built-in failproof fallback writing a safe
//!   default command
//!
//! ## Rules
//! - Controllers read the robot state under a shared lock and write the
//!   actuator command under an exclusive lock; the cells are injected at
//!   construction through the plugin factory.
//! - Failures must be folded into [`ControllerError`](crate::ControllerError);
//!   nothing unstructured crosses this interface.

mod controller;
mod freeze;
mod handle;

pub use controller::{Controller, ControllerRole};
pub use freeze::FreezeController;
pub use handle::{ControllerHandle, HandleRef, LifecycleStatus};
