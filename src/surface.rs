//! # External surface adapter.
//!
//! [`SurfaceHandle`] exposes the manager's request/response operations and
//! broadcast notifications to the outer node (and to transport-aware
//! controller plugins). It holds a weak back-reference, so a handle kept by
//! a plugin can never keep a torn-down manager alive.
//!
//! ## Requests
//! - `switch_controller(name)` → `{Switched, Running, NotFound, Error}`
//! - `emergency_stop()` → trigger-style response (idempotent while latched)
//! - `clear_emergency_stop()` → trigger-style response (`Error` if not latched)
//! - `get_available_controllers()`, `get_active_controller()`
//!
//! ## Broadcasts (retained/latched)
//! Each broadcast is a `tokio::sync::watch` channel: the last value is
//! re-delivered to new subscribers, which is exactly the latched-topic
//! semantics the outer node republishes.
//!
//! | Channel | Payload | Meaning |
//! |---|---|---|
//! | `controller_changed` | `String` | name of the active controller |
//! | `emergency_state` | `bool` | `is_ok`; falling edge = estop taken |
//! | `manager_state` | [`ManagerState`] | role class of the active controller |
//! | `cleared_emergency_state` | `bool` | `false` while an estop is latched |
//!
//! Sequenced lifecycle [`Event`]s are additionally available through
//! [`SurfaceHandle::events`] for observers that need exact ordering.

use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch};

use crate::error::ManagerError;
use crate::events::Event;
use crate::manager::{ControllerManager, EmergencyStopKind, ManagerState, SwitchStatus};

/// Trigger-style response: success flag plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
}

impl TriggerResponse {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Latched broadcast channels owned by the manager.
///
/// All sends use `send_replace`/`send_if_modified`, so publishing succeeds
/// with or without subscribers and `emergency_state` produces at most one
/// falling edge per latch cycle.
pub(crate) struct Broadcasts {
    controller_changed: watch::Sender<String>,
    emergency_state: watch::Sender<bool>,
    manager_state: watch::Sender<ManagerState>,
    cleared_emergency_state: watch::Sender<bool>,
}

impl Broadcasts {
    pub(crate) fn new(active: &str, state: ManagerState) -> Self {
        Self {
            controller_changed: watch::channel(active.to_string()).0,
            emergency_state: watch::channel(true).0,
            manager_state: watch::channel(state).0,
            cleared_emergency_state: watch::channel(true).0,
        }
    }

    pub(crate) fn announce_controller(&self, name: &str) {
        self.controller_changed.send_replace(name.to_string());
    }

    pub(crate) fn announce_manager_state(&self, state: ManagerState) {
        self.manager_state.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// Publishes the `is_ok` flag; returns true when this send was an edge.
    pub(crate) fn announce_emergency(&self, is_ok: bool) -> bool {
        self.emergency_state.send_if_modified(|current| {
            if *current != is_ok {
                *current = is_ok;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn announce_cleared(&self, cleared: bool) {
        self.cleared_emergency_state.send_replace(cleared);
    }

    fn subscribe_controller_changed(&self) -> watch::Receiver<String> {
        self.controller_changed.subscribe()
    }

    fn subscribe_emergency_state(&self) -> watch::Receiver<bool> {
        self.emergency_state.subscribe()
    }

    fn subscribe_manager_state(&self) -> watch::Receiver<ManagerState> {
        self.manager_state.subscribe()
    }

    fn subscribe_cleared_emergency_state(&self) -> watch::Receiver<bool> {
        self.cleared_emergency_state.subscribe()
    }
}

/// Cloneable handle to the manager's external surface.
pub struct SurfaceHandle<S, C> {
    manager: Weak<ControllerManager<S, C>>,
}

impl<S, C> Clone for SurfaceHandle<S, C> {
    fn clone(&self) -> Self {
        Self {
            manager: Weak::clone(&self.manager),
        }
    }
}

impl<S, C> SurfaceHandle<S, C>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub(crate) fn new(manager: &Arc<ControllerManager<S, C>>) -> Self {
        Self {
            manager: Arc::downgrade(manager),
        }
    }

    fn upgrade(&self) -> Result<Arc<ControllerManager<S, C>>, ManagerError> {
        self.manager.upgrade().ok_or(ManagerError::Detached)
    }

    /// Requests a switch to the named controller.
    ///
    /// Returns only after the target has been initialised and made active
    /// (`Switched`), or with the rejection outcome.
    pub async fn switch_controller(&self, name: &str) -> SwitchStatus {
        match self.upgrade() {
            Ok(manager) => manager.switch_controller(name).await,
            Err(_) => SwitchStatus::Error,
        }
    }

    /// Triggers an operator emergency stop.
    ///
    /// Idempotent: re-entering while latched is a no-op success.
    pub async fn emergency_stop(&self) -> TriggerResponse {
        match self.upgrade() {
            Ok(manager) => {
                manager.emergency_stop(EmergencyStopKind::Operator).await;
                TriggerResponse::ok("emergency stop engaged")
            }
            Err(e) => TriggerResponse::fail(e.to_string()),
        }
    }

    /// Clears a latched emergency stop.
    pub async fn clear_emergency_stop(&self) -> TriggerResponse {
        match self.upgrade() {
            Ok(manager) => match manager.clear_emergency_stop().await {
                Ok(()) => TriggerResponse::ok("emergency stop cleared"),
                Err(e) => TriggerResponse::fail(e.to_string()),
            },
            Err(e) => TriggerResponse::fail(e.to_string()),
        }
    }

    /// Clears the latch and switches to the named controller in one request.
    pub async fn switch_controller_after_emergency_stop(&self, name: &str) -> SwitchStatus {
        match self.upgrade() {
            Ok(manager) => manager.switch_controller_after_emergency_stop(name).await,
            Err(_) => SwitchStatus::Error,
        }
    }

    /// Names of all switchable controllers, in setup order.
    pub async fn available_controllers(&self) -> Result<Vec<String>, ManagerError> {
        Ok(self.upgrade()?.available_controllers().await)
    }

    /// Name of the currently active controller.
    pub async fn active_controller(&self) -> Result<String, ManagerError> {
        Ok(self.upgrade()?.active_controller().await)
    }

    /// Subscribes to the latched active-controller broadcast.
    pub fn subscribe_controller_changed(&self) -> Result<watch::Receiver<String>, ManagerError> {
        Ok(self.upgrade()?.broadcasts().subscribe_controller_changed())
    }

    /// Subscribes to the latched `is_ok` emergency-state broadcast.
    pub fn subscribe_emergency_state(&self) -> Result<watch::Receiver<bool>, ManagerError> {
        Ok(self.upgrade()?.broadcasts().subscribe_emergency_state())
    }

    /// Subscribes to the latched manager-state broadcast.
    pub fn subscribe_manager_state(
        &self,
    ) -> Result<watch::Receiver<ManagerState>, ManagerError> {
        Ok(self.upgrade()?.broadcasts().subscribe_manager_state())
    }

    /// Subscribes to the latched cleared-emergency-state broadcast.
    pub fn subscribe_cleared_emergency_state(
        &self,
    ) -> Result<watch::Receiver<bool>, ManagerError> {
        Ok(self
            .upgrade()?
            .broadcasts()
            .subscribe_cleared_emergency_state())
    }

    /// Subscribes to the sequenced lifecycle event stream.
    pub fn events(&self) -> Result<broadcast::Receiver<Event>, ManagerError> {
        Ok(self.upgrade()?.subscribe_events())
    }
}
