//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] — the extension point for plugging custom event
//! handlers into the manager runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Bounded queue** (configurable capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics caught, reported as `SubscriberPanicked` event)
//!
//! ## Rules
//! - Slow subscribers only affect themselves (queue overflow → event drop)
//! - Panics are **isolated** (do not crash the manager or other subscribers)
//! - Subscribers **do not block** the manager or the tick worker
//! - Queue capacity is **per-subscriber** (not global)
//!
//! ## Overflow behavior
//! When a subscriber's queue is full:
//! 1. The event is **dropped** for this subscriber only
//! 2. A `SubscriberOverflow` event is published (for observability)
//! 3. Other subscribers are **unaffected**

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// Receives events from the manager via a dedicated worker task with a
/// bounded queue.
///
/// ### Implementation requirements
/// - **Async-friendly**: avoid blocking operations, use async I/O
/// - **Error handling**: handle errors internally, do not panic
/// - A subscriber may call back into the manager through a
///   [`SurfaceHandle`](crate::SurfaceHandle); delivery happens outside the
///   manager's critical sections.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, events in FIFO order. Panics are
    /// caught and reported as `SubscriberPanicked`.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name for logging and metrics.
    ///
    /// Used in `SubscriberOverflow` and `SubscriberPanicked` events. Keep it
    /// short and descriptive (e.g. "log", "telemetry", "operator-ui").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
