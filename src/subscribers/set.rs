//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to multiple subscribers
//! **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit_arc` never waits on a subscriber; events are handed to bounded
//!   per-subscriber queues.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and reported (isolation).
//! - `shutdown` closes every queue, lets the workers drain what is already
//!   queued, and waits for them to exit. It is idempotent and callable
//!   through a shared reference, so the manager can tear the set down
//!   during cleanup.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (events are dropped for that
//!   subscriber).
//!
//! ## Diagram
//! ```text
//!    emit_arc(Arc<Event>)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};

use crate::events::{Bus, Event};

use super::Subscribe;

/// Per-subscriber channel with metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    /// Senders into the per-subscriber queues; emptied on shutdown.
    channels: RwLock<Vec<SubscriberChannel>>,
    /// Worker task handles; drained and awaited on shutdown.
    workers: Mutex<Vec<JoinHandle<()>>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Overflow and panic reports are published back on `bus` so they remain
    /// observable by the surviving subscribers.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let worker_bus = bus.clone();
            let s = Arc::clone(&sub);

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await
                    {
                        worker_bus
                            .publish(Event::subscriber_panicked(s.name(), format!("{panic_err:?}")));
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels: RwLock::new(channels),
            workers: Mutex::new(workers),
            bus,
        }
    }

    /// Fan-out one event to all subscribers (non-blocking).
    ///
    /// If a subscriber's queue is **full** or **closed**, the event is dropped
    /// for it and a `SubscriberOverflow` event is published.
    pub async fn emit_arc(&self, ev: Arc<Event>) {
        let channels = self.channels.read().await;
        for channel in channels.iter() {
            match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if ev.kind != crate::events::EventKind::SubscriberOverflow {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "queue_full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if ev.kind != crate::events::EventKind::SubscriberOverflow {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "worker_closed"));
                    }
                }
            }
        }
    }

    /// Graceful shutdown: close all queues, let workers drain what is
    /// already queued, and await their completion. Idempotent.
    pub async fn shutdown(&self) {
        let channels = std::mem::take(&mut *self.channels.write().await);
        drop(channels);
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for h in workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers (or the set has been shut down).
    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }

    /// Number of subscribers.
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }
}
