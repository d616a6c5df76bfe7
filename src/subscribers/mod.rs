//! # Event subscribers for the manager runtime.
//!
//! This module provides the [`Subscribe`] trait and the non-blocking
//! [`SubscriberSet`] fan-out used to deliver runtime events to observers
//! (logging, telemetry, operator UIs).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ControllerManager ── publish(Event) ──► Bus ──► fan-out listener
//!                                                       │
//!                                                       ▼
//!                                                 SubscriberSet
//!                                              ┌──────┴──────┬─────────┐
//!                                              ▼             ▼         ▼
//!                                          LogWriter      Metrics    ...
//! ```
//!
//! Delivery happens on dedicated worker tasks **after** the manager has
//! released all of its locks, so a subscriber may call back into the manager
//! (e.g. request an emergency stop from a failure handler) without
//! deadlocking.

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
