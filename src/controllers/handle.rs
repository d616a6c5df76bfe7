//! # Controller handle: one owned instance plus lifecycle status.
//!
//! [`ControllerHandle`] wraps a boxed [`Controller`] behind its own mutex.
//! The manager, the tick worker and switch requests all serialise on that
//! mutex, which gives the two guarantees the switching machinery relies on:
//!
//! - an in-flight `advance` and a concurrent `pre_stop`/`stop`/`reset`
//!   never overlap on the same instance,
//! - a switch initialising its target runs under the *target's* mutex and
//!   therefore in parallel with ticks still advancing the old controller.
//!
//! ## Status transitions
//! ```text
//! Constructed ──initialize──► Initialized ──activate──► Running
//!      ▲                          ▲    │                  │
//!      │ (re-init after failure)  │    └──── stop ──► Stopped
//!      └───────── Failed ◄── advance error              │
//!                    │                                  │
//!                    └────────── initialize ◄── reset ──┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::controllers::{Controller, ControllerRole};
use crate::error::ControllerError;

/// Shared reference to a controller handle.
pub type HandleRef<S, C> = Arc<ControllerHandle<S, C>>;

/// Lifecycle status of a managed controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Constructed by the plugin factory, not yet initialised.
    Constructed,
    /// Ready to become active.
    Initialized,
    /// Currently the active controller.
    Running,
    /// Deactivated; transient resources released.
    Stopped,
    /// Last operation failed; re-initialisation required before reuse.
    Failed,
}

/// Mutable part of a handle: the instance and its status, under one lock.
pub(crate) struct HandleInner<S, C> {
    pub(crate) controller: Box<dyn Controller<S, C>>,
    pub(crate) status: LifecycleStatus,
}

/// Owns one controller instance on behalf of the manager.
pub struct ControllerHandle<S, C> {
    name: String,
    role: ControllerRole,
    inner: Mutex<HandleInner<S, C>>,
}

impl<S, C> ControllerHandle<S, C>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Wraps a freshly constructed controller.
    pub(crate) fn new(
        name: impl Into<String>,
        role: ControllerRole,
        controller: Box<dyn Controller<S, C>>,
    ) -> HandleRef<S, C> {
        Arc::new(Self {
            name: name.into(),
            role,
            inner: Mutex::new(HandleInner {
                controller,
                status: LifecycleStatus::Constructed,
            }),
        })
    }

    /// Name the controller is addressed by in switch requests.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role in the fallback chain.
    pub fn role(&self) -> ControllerRole {
        self.role
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> LifecycleStatus {
        self.inner.lock().await.status
    }

    /// Locks the instance. Manager-internal; used by the switch and estop
    /// paths that need to hold the instance across the active-pointer swap.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, HandleInner<S, C>> {
        self.inner.lock().await
    }

    /// Brings the controller to `Initialized`, lazily and idempotently.
    ///
    /// - `Initialized`/`Running`: no-op.
    /// - `Stopped`: re-enters via `reset` (clean post-initialise state).
    /// - `Constructed`/`Failed`: runs `initialize(dt)`.
    pub(crate) async fn ensure_initialized(&self, dt: Duration) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        match inner.status {
            LifecycleStatus::Initialized | LifecycleStatus::Running => Ok(()),
            LifecycleStatus::Stopped => match inner.controller.reset().await {
                Ok(()) => {
                    inner.status = LifecycleStatus::Initialized;
                    Ok(())
                }
                Err(e) => {
                    inner.status = LifecycleStatus::Failed;
                    Err(e)
                }
            },
            LifecycleStatus::Constructed | LifecycleStatus::Failed => {
                match inner.controller.initialize(dt).await {
                    Ok(()) => {
                        inner.status = LifecycleStatus::Initialized;
                        Ok(())
                    }
                    Err(e) => {
                        inner.status = LifecycleStatus::Failed;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Marks the controller active: resets to a clean state and enters
    /// `Running`. Called after the active-pointer swap.
    pub(crate) async fn activate(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        let res = inner.controller.reset().await;
        inner.status = LifecycleStatus::Running;
        res
    }

    /// Advances the controller by one tick.
    pub(crate) async fn advance(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        let res = inner.controller.advance().await;
        if res.is_err() {
            inner.status = LifecycleStatus::Failed;
        }
        res
    }

    /// Deactivates the controller and releases transient resources.
    ///
    /// A failed controller stays `Failed` so the next activation goes
    /// through a full `initialize`.
    pub(crate) async fn stop(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        let res = inner.controller.stop().await;
        if inner.status != LifecycleStatus::Failed {
            inner.status = LifecycleStatus::Stopped;
        }
        res
    }
}
