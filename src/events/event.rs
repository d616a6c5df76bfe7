//! # Runtime events emitted by the controller manager.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Switch events**: controller hand-overs and rejected switch requests
//! - **Emergency events**: stops, escalations and clears
//! - **Subscriber events**: fan-out plumbing (overflow, panic isolation)
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! controller names, error messages and the emergency-stop classification.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Swap notifications are published in the order the swaps
//! occur, so a receiver that drains the bus observes the true hand-over
//! order even across async channel boundaries.
//!
//! ## Event flow examples
//!
//! ### Successful switch
//! ```text
//! switch_controller("walk")
//!   → [initialise target]
//!   → [pre-stop hook, atomic swap]
//!   → ControllerChanged { from: "freeze", controller: "walk" }
//! ```
//!
//! ### Advance failure
//! ```text
//! tick N: walk.advance() fails
//!   → AdvanceFailed { controller: "walk" }
//!   → EmergencyStopped { controller: "stand", estop: Failure }
//!   → ControllerChanged { from: "walk", controller: "stand" }
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::manager::EmergencyStopKind;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Switch events ===
    /// The active controller changed; `controller` names the new active one.
    ControllerChanged,
    /// A switch request was rejected (latched estop, switch in progress,
    /// superseded by an emergency stop). `error` carries the reason label.
    SwitchRejected,
    /// A controller failed to initialise while being activated.
    ControllerInitFailed,

    // === Emergency events ===
    /// The active controller's advance failed; a failure emergency stop
    /// follows immediately.
    AdvanceFailed,
    /// An emergency stop completed; `controller` names the fallback now
    /// active, `estop` carries the classification.
    EmergencyStopped,
    /// The latched emergency stop was cleared; switches are allowed again.
    EmergencyStopCleared,
}

/// Runtime event with optional metadata.
///
/// Carries information about controller hand-overs, failures and
/// emergency-stop edges.
///
/// ## Fields
/// - `seq`: Unique sequence number for ordering (monotonically increasing)
/// - `at`: Wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: Event classification
/// - `controller`, `from`, `error`, `estop`: Optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Name of the controller the event is about, if applicable.
    pub controller: Option<String>,
    /// Name of the previously active controller, for hand-over events.
    pub from: Option<String>,
    /// Error message or rejection reason, if the event represents a failure.
    pub error: Option<String>,
    /// Emergency-stop classification, for emergency events.
    pub estop: Option<EmergencyStopKind>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            controller: None,
            from: None,
            error: None,
            estop: None,
        }
    }

    /// Attaches a controller name.
    pub fn with_controller(mut self, name: impl Into<String>) -> Self {
        self.controller = Some(name.into());
        self
    }

    /// Attaches the previously active controller name.
    pub fn with_from(mut self, name: impl Into<String>) -> Self {
        self.from = Some(name.into());
        self
    }

    /// Attaches an error message or rejection reason.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches the emergency-stop classification.
    pub fn with_estop(mut self, kind: EmergencyStopKind) -> Self {
        self.estop = Some(kind);
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    ///
    /// Emitted when a subscriber panics during event processing.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_controller(subscriber)
            .with_error(info)
    }
}
