//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the controller manager,
//! the tick worker and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ControllerManager` (switches, emergency stops, clears,
//!   rejections), the tick worker (advance failures), `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumers**: the manager's fan-out listener (delivers to the
//!   `SubscriberSet`) and any external receiver obtained through
//!   [`SurfaceHandle::events`](crate::SurfaceHandle::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
