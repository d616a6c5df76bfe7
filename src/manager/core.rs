//! # ControllerManager: the safety-critical arbiter of the locomotion stack.
//!
//! At every control tick exactly one controller is active; the manager
//! advances it, and drives the defined fallback chain when it fails or the
//! operator issues an emergency stop:
//!
//! ```text
//! nominal ──fail──► paired emergency ──fail──► failproof
//! ```
//!
//! ## Rules
//! - The active slot is read under a **short lock**; a tick either sees the
//!   old or the new controller cleanly, never a half-swapped state.
//! - A switch returns `Switched` only after the target is initialised and
//!   active; the very next tick advances it.
//! - `emergency_stop` returns only after the active pointer points at the
//!   fallback; re-entering while latched is a no-op success.
//! - While latched, switch requests to non-failproof controllers are
//!   rejected until the latch is explicitly cleared.
//! - Notifications are published after every manager lock is released, so
//!   observers may call back into the manager.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cell::{CommandCell, StateCell};
use crate::config::{ControllerEntry, ControllerPairEntry, ManagerConfig};
use crate::controllers::{Controller, ControllerHandle, ControllerRole, HandleRef};
use crate::error::{ManagerError, SetupError};
use crate::events::{Bus, Event, EventKind};
use crate::registry::{PluginContext, PluginRegistry};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::surface::{Broadcasts, SurfaceHandle};

use super::machine::{EmergencyStopKind, ManagerPhase, ManagerState, StatusBlock, SwitchStatus};
use super::worker::{spawn_tick_worker, TickStats};

/// Options carried by the manager for its lifetime.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Fixed control tick period.
    pub time_step: Duration,
    /// True when commands reach physical hardware.
    pub is_real_robot: bool,
}

/// A nominal controller's place in the fallback chain.
struct PairRecord {
    nominal: String,
    emergency: Option<String>,
}

/// The controller manager core.
///
/// Constructed through [`ManagerBuilder`]; all further interaction goes
/// through its async methods or a [`SurfaceHandle`].
pub struct ControllerManager<S, C> {
    options: ManagerOptions,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    /// All switchable controllers by name: failproof, nominals, emergencies.
    handles: DashMap<String, HandleRef<S, C>>,
    /// Fallback pairing, in setup order.
    pairs: RwLock<Vec<PairRecord>>,
    /// Controller names in setup order, for `available_controllers`.
    order: RwLock<Vec<String>>,
    failproof: HandleRef<S, C>,
    /// The active-controller slot. Held only long enough to clone or swap.
    active: Mutex<HandleRef<S, C>>,
    status: Mutex<StatusBlock>,
    broadcasts: Broadcasts,
    stats: Mutex<TickStats>,
    worker_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S, C> std::fmt::Debug for ControllerManager<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerManager").finish_non_exhaustive()
    }
}

impl<S, C> ControllerManager<S, C>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Manager options (tick period, real-robot flag).
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Fixed control tick period.
    pub fn time_step(&self) -> Duration {
        self.options.time_step
    }

    /// True when commands reach physical hardware.
    pub fn is_real_robot(&self) -> bool {
        self.options.is_real_robot
    }

    /// Returns a cloneable handle to the external surface.
    pub fn surface(self: &Arc<Self>) -> SurfaceHandle<S, C> {
        SurfaceHandle::new(self)
    }

    /// Snapshot of the active controller handle.
    pub async fn active(&self) -> HandleRef<S, C> {
        self.active.lock().await.clone()
    }

    /// Name of the currently active controller.
    pub async fn active_controller(&self) -> String {
        self.active().await.name().to_string()
    }

    /// Names of all switchable controllers, in setup order.
    pub async fn available_controllers(&self) -> Vec<String> {
        self.order.read().await.clone()
    }

    /// True while an emergency stop is latched.
    pub async fn is_estop_latched(&self) -> bool {
        self.status.lock().await.estop_latched
    }

    /// Coarse manager state, derived from the active controller's role.
    pub async fn manager_state(&self) -> ManagerState {
        Self::state_for(self.active().await.role())
    }

    /// Snapshot of the tick timing statistics.
    pub async fn tick_stats(&self) -> TickStats {
        self.stats.lock().await.clone()
    }

    /// Subscribes to the sequenced lifecycle event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn broadcasts(&self) -> &Broadcasts {
        &self.broadcasts
    }

    /// Spawns the periodic tick worker. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        *worker = Some(spawn_tick_worker(
            Arc::clone(self),
            self.worker_token.clone(),
        ));
        info!(dt = ?self.options.time_step, "tick worker started");
    }

    /// Advances the active controller by one tick.
    ///
    /// Called by the tick worker; public so a test bench or an external
    /// scheduler can drive the manager without wall-clock timing.
    pub async fn advance_tick(&self) {
        let handle = self.active().await;
        let started = Instant::now();
        let result = handle.advance().await;
        let elapsed = started.elapsed();

        let overrun = self
            .stats
            .lock()
            .await
            .record(elapsed, self.options.time_step);
        if overrun {
            debug!(
                controller = handle.name(),
                ?elapsed,
                budget = ?self.options.time_step,
                "tick exceeded budget"
            );
        }

        if let Err(e) = result {
            if handle.role() == ControllerRole::Failproof {
                // Nothing left to escalate to.
                error!(
                    controller = handle.name(),
                    error = %e,
                    "failproof controller reported a failure; continuing"
                );
                return;
            }
            warn!(
                controller = handle.name(),
                error = %e,
                "advance failed, taking failure emergency stop"
            );
            self.bus.publish(
                Event::now(EventKind::AdvanceFailed)
                    .with_controller(handle.name())
                    .with_error(e.to_string()),
            );
            self.emergency_stop(EmergencyStopKind::Failure).await;
        }
    }

    /// Drives the switching state machine towards the named controller.
    pub async fn switch_controller(&self, name: &str) -> SwitchStatus {
        // Admission, under the status lock.
        let (target, epoch) = {
            let mut status = self.status.lock().await;
            if matches!(
                status.phase,
                ManagerPhase::Switching | ManagerPhase::EmergencyStopping
            ) {
                drop(status);
                return self.reject(name, "switch_in_progress");
            }
            let active = self.active.lock().await.clone();
            if active.name() == name {
                return SwitchStatus::Running;
            }
            let Some(target) = self.handles.get(name).map(|h| h.clone()) else {
                return SwitchStatus::NotFound;
            };
            if status.estop_latched && target.role() != ControllerRole::Failproof {
                drop(status);
                return self.reject(name, "estop_latched");
            }
            status.phase = ManagerPhase::Switching;
            status.switch_epoch += 1;
            (target, status.switch_epoch)
        };

        // Initialise the target. Ticks keep advancing the old controller in
        // parallel until the swap below.
        match target.ensure_initialized(self.options.time_step).await {
            Ok(()) => self.commit_switch(name, target, epoch).await,
            Err(e) => {
                warn!(controller = name, error = %e, "target initialisation failed, escalating");
                self.bus.publish(
                    Event::now(EventKind::ControllerInitFailed)
                        .with_controller(name)
                        .with_error(e.to_string()),
                );
                self.escalate_after_init_failure(name, epoch).await;
                SwitchStatus::Error
            }
        }
    }

    /// Commits an initialised switch target: pre-stop the old controller,
    /// swap the active pointer, reset the new one, stop the old one.
    async fn commit_switch(
        &self,
        name: &str,
        target: HandleRef<S, C>,
        epoch: u64,
    ) -> SwitchStatus {
        // The status lock is held across the swap so an emergency stop
        // cannot interleave with it. A stop that ran during initialisation
        // has moved the phase off this admission's epoch.
        let mut status = self.status.lock().await;
        if !status.owns_switch(epoch) {
            drop(status);
            return self.reject(name, "superseded_by_emergency_stop");
        }

        let old = self.active.lock().await.clone();
        {
            // Holding the old controller's mutex here waits out an in-flight
            // advance and keeps further ticks off it until the swap is done.
            let mut old_inner = old.lock().await;
            old_inner.controller.pre_stop().await;
            *self.active.lock().await = target.clone();
        }
        status.phase = ManagerPhase::Idle;
        drop(status);

        if let Err(e) = target.activate().await {
            warn!(controller = target.name(), error = %e, "reset on activation failed");
        }
        // The failproof handle stays initialised for its whole lifetime so an
        // emergency stop never has to re-ready it on the critical path.
        if old.role() != ControllerRole::Failproof {
            if let Err(e) = old.stop().await {
                warn!(controller = old.name(), error = %e, "stop failed");
            }
        }

        self.broadcasts.announce_controller(target.name());
        self.broadcasts
            .announce_manager_state(Self::state_for(target.role()));
        self.bus.publish(
            Event::now(EventKind::ControllerChanged)
                .with_controller(target.name())
                .with_from(old.name()),
        );
        info!(from = old.name(), controller = target.name(), "controller switched");
        SwitchStatus::Switched
    }

    /// Escalates a failed switch-target initialisation along the target's
    /// fallback chain: paired emergency if it has one, failproof otherwise.
    async fn escalate_after_init_failure(&self, target_name: &str, epoch: u64) {
        let proceed = {
            let mut status = self.status.lock().await;
            if status.estop_latched || status.phase == ManagerPhase::EmergencyStopping {
                // An emergency stop beat us to it, or we are already latched
                // on a fallback; release our own switching phase.
                if status.owns_switch(epoch) {
                    status.phase = ManagerPhase::Idle;
                }
                false
            } else {
                status.phase = ManagerPhase::EmergencyStopping;
                true
            }
        };
        if !proceed {
            return;
        }
        let cur = self.active().await;
        let next = self.fallback_for(target_name).await;
        self.execute_emergency_stop(EmergencyStopKind::Failure, cur, next)
            .await;
    }

    /// Executes the emergency-stop protocol.
    ///
    /// Idempotent: returns `true` without side effects when already latched
    /// or when a stop is already in flight.
    pub async fn emergency_stop(&self, kind: EmergencyStopKind) -> bool {
        {
            let mut status = self.status.lock().await;
            if status.estop_latched || status.phase == ManagerPhase::EmergencyStopping {
                debug!("emergency stop re-entered while latched; no-op");
                return true;
            }
            status.phase = ManagerPhase::EmergencyStopping;
        }
        let cur = self.active().await;
        let next = self.fallback_for(cur.name()).await;
        self.execute_emergency_stop(kind, cur, next).await;
        true
    }

    async fn execute_emergency_stop(
        &self,
        kind: EmergencyStopKind,
        cur: HandleRef<S, C>,
        mut next: HandleRef<S, C>,
    ) {
        // Ensure the fallback is initialised; failproof is the backstop.
        if let Err(e) = next.ensure_initialized(self.options.time_step).await {
            warn!(
                controller = next.name(),
                error = %e,
                "fallback initialisation failed, falling back to failproof"
            );
            self.bus.publish(
                Event::now(EventKind::ControllerInitFailed)
                    .with_controller(next.name())
                    .with_error(e.to_string()),
            );
            next = Arc::clone(&self.failproof);
            if let Err(e) = next.ensure_initialized(self.options.time_step).await {
                // Contract breach: failproof initialisation must not fail.
                error!(error = %e, "failproof controller failed to initialise");
            }
        }

        let changed = cur.name() != next.name();
        {
            let mut cur_inner = cur.lock().await;
            cur_inner.controller.pre_stop().await;
            *self.active.lock().await = next.clone();
        }
        if let Err(e) = next.activate().await {
            warn!(controller = next.name(), error = %e, "reset on activation failed");
        }
        // The failproof handle is never stopped outside cleanup.
        if changed && cur.role() != ControllerRole::Failproof {
            if let Err(e) = cur.stop().await {
                warn!(controller = cur.name(), error = %e, "stop failed");
            }
        }
        {
            let mut status = self.status.lock().await;
            status.estop_latched = true;
            status.phase = ManagerPhase::Idle;
        }

        // Notify observers; all manager locks are released by now. The
        // falling edge precedes the controller-changed notification.
        self.broadcasts.announce_emergency(false);
        self.broadcasts.announce_cleared(false);
        self.broadcasts
            .announce_manager_state(Self::state_for(next.role()));
        self.bus.publish(
            Event::now(EventKind::EmergencyStopped)
                .with_controller(next.name())
                .with_from(cur.name())
                .with_estop(kind),
        );
        if changed {
            self.broadcasts.announce_controller(next.name());
            self.bus.publish(
                Event::now(EventKind::ControllerChanged)
                    .with_controller(next.name())
                    .with_from(cur.name()),
            );
        }
        warn!(
            kind = kind.as_label(),
            from = cur.name(),
            controller = next.name(),
            "emergency stop engaged"
        );
    }

    /// Clears a latched emergency stop; switches are allowed again.
    pub async fn clear_emergency_stop(&self) -> Result<(), ManagerError> {
        {
            let mut status = self.status.lock().await;
            if !status.estop_latched {
                return Err(ManagerError::NotLatched);
            }
            status.estop_latched = false;
            status.phase = ManagerPhase::Cleared;
        }
        self.broadcasts.announce_emergency(true);
        self.broadcasts.announce_cleared(true);
        self.bus.publish(Event::now(EventKind::EmergencyStopCleared));
        info!("emergency stop cleared");
        {
            let mut status = self.status.lock().await;
            if status.phase == ManagerPhase::Cleared {
                status.phase = ManagerPhase::Idle;
            }
        }
        Ok(())
    }

    /// Clears the latch (if set) and switches to the named controller.
    pub async fn switch_controller_after_emergency_stop(&self, name: &str) -> SwitchStatus {
        if let Err(e) = self.clear_emergency_stop().await {
            debug!(error = %e, "clear before switch");
        }
        self.switch_controller(name).await
    }

    /// Stops the tick worker, every controller and the subscriber workers.
    /// The manager is inert afterwards.
    pub async fn cleanup(&self) {
        self.worker_token.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
        let handles: Vec<HandleRef<S, C>> =
            self.handles.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            if let Err(e) = handle.stop().await {
                warn!(controller = handle.name(), error = %e, "stop during cleanup failed");
            }
        }
        self.subs.shutdown().await;
        info!("controller manager cleaned up");
    }

    /// First fallback for the named controller: its paired emergency
    /// controller when it has one, the failproof controller otherwise.
    async fn fallback_for(&self, name: &str) -> HandleRef<S, C> {
        let pairs = self.pairs.read().await;
        for pair in pairs.iter() {
            if pair.nominal == name {
                if let Some(emergency) = &pair.emergency {
                    if let Some(handle) = self.handles.get(emergency) {
                        return handle.clone();
                    }
                }
                break;
            }
        }
        Arc::clone(&self.failproof)
    }

    fn state_for(role: ControllerRole) -> ManagerState {
        match role {
            ControllerRole::Nominal => ManagerState::Ok,
            ControllerRole::Emergency => ManagerState::Emergency,
            ControllerRole::Failproof => ManagerState::Failure,
        }
    }

    fn reject(&self, name: &str, reason: &'static str) -> SwitchStatus {
        debug!(controller = name, reason, "switch rejected");
        self.bus.publish(
            Event::now(EventKind::SwitchRejected)
                .with_controller(name)
                .with_error(reason),
        );
        SwitchStatus::Error
    }

    /// Spawns the background task fanning bus events out to subscribers.
    fn spawn_fanout_listener(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let subs = Arc::clone(&self.subs);
        let token = self.worker_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit_arc(Arc::new(ev)).await,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
    }
}

/// Builder assembling a [`ControllerManager`] from configuration, a plugin
/// registry and the shared cells.
pub struct ManagerBuilder<S, C> {
    config: ManagerConfig,
    state: StateCell<S>,
    command: CommandCell<C>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    bus_capacity: usize,
}

impl<S, C> ManagerBuilder<S, C>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Creates a builder for the given configuration and shared cells.
    pub fn new(config: ManagerConfig, state: StateCell<S>, command: CommandCell<C>) -> Self {
        Self {
            config,
            state,
            command,
            subscribers: Vec::new(),
            bus_capacity: 1024,
        }
    }

    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Overrides the event bus capacity.
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity.max(1);
        self
    }

    /// Resolves all controllers and returns a ready manager.
    ///
    /// The failproof controller is resolved, initialised and made active
    /// before this returns; a failure there is fatal
    /// ([`SetupError::FailproofMissing`], the caller must terminate before
    /// any tick runs). Every other plugin problem is a warning: the pair is
    /// skipped, or its emergency half is downgraded to the failproof
    /// fallback.
    pub async fn build(
        self,
        registry: &PluginRegistry<S, C>,
    ) -> Result<Arc<ControllerManager<S, C>>, SetupError> {
        let options = ManagerOptions {
            time_step: self.config.time_step,
            is_real_robot: self.config.is_real_robot,
        };
        let bus = Bus::new(self.bus_capacity);
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        // Failproof controller first; nothing may run without it.
        let failproof_class = self.config.failproof_controller.clone();
        let failproof_ctx = PluginContext {
            state: self.state.clone(),
            command: self.command.clone(),
            surface: None,
            is_real_robot: options.is_real_robot,
        };
        let controller = registry
            .resolve(ControllerRole::Failproof, &failproof_class, failproof_ctx)
            .map_err(|e| SetupError::FailproofMissing {
                name: failproof_class.clone(),
                reason: e.to_string(),
            })?;
        let failproof =
            ControllerHandle::new(failproof_class.clone(), ControllerRole::Failproof, controller);

        let manager = Arc::new(ControllerManager {
            options: options.clone(),
            bus,
            subs,
            handles: DashMap::new(),
            pairs: RwLock::new(Vec::new()),
            order: RwLock::new(Vec::new()),
            failproof: failproof.clone(),
            active: Mutex::new(failproof.clone()),
            status: Mutex::new(StatusBlock::new()),
            broadcasts: Broadcasts::new(failproof.name(), ManagerState::Failure),
            stats: Mutex::new(TickStats::new()),
            worker_token: CancellationToken::new(),
            worker: Mutex::new(None),
        });
        manager
            .handles
            .insert(failproof.name().to_string(), failproof.clone());
        manager.order.write().await.push(failproof.name().to_string());

        for pair in &self.config.controller_pairs {
            Self::setup_controller_pair(&manager, registry, pair, &self.state, &self.command)
                .await;
        }

        // The failproof controller is initialised and running from the
        // moment setup completes.
        failproof
            .ensure_initialized(options.time_step)
            .await
            .map_err(|e| SetupError::FailproofMissing {
                name: failproof_class,
                reason: format!("initialisation failed: {e}"),
            })?;
        if let Err(e) = failproof.activate().await {
            error!(error = %e, "failproof reset failed after setup");
        }

        manager.spawn_fanout_listener();
        info!(
            controllers = manager.order.read().await.len(),
            dt = ?options.time_step,
            is_real_robot = options.is_real_robot,
            "controller manager setup complete"
        );
        Ok(manager)
    }

    /// Adds one controller pair. Returns `true` iff the nominal controller
    /// was added; every exit path is explicit.
    async fn setup_controller_pair(
        manager: &Arc<ControllerManager<S, C>>,
        registry: &PluginRegistry<S, C>,
        pair: &ControllerPairEntry,
        state: &StateCell<S>,
        command: &CommandCell<C>,
    ) -> bool {
        let entry = &pair.controller;
        if manager.handles.contains_key(&entry.name) {
            warn!(controller = %entry.name, "duplicate controller name, skipping pair");
            return false;
        }

        let ctx = |entry: &ControllerEntry| PluginContext {
            state: state.clone(),
            command: command.clone(),
            surface: entry.is_ros.then(|| SurfaceHandle::new(manager)),
            is_real_robot: manager.options.is_real_robot,
        };

        let nominal = match registry.resolve(ControllerRole::Nominal, &entry.plugin_name, ctx(entry))
        {
            Ok(controller) => controller,
            Err(e) => {
                warn!(
                    controller = %entry.name,
                    plugin = %entry.plugin_name,
                    error = %e,
                    "nominal plugin failed to load, skipping pair"
                );
                return false;
            }
        };
        if registry.needs_transport(ControllerRole::Nominal, &entry.plugin_name) == Some(true)
            && !entry.is_ros
        {
            warn!(
                controller = %entry.name,
                "plugin declares a transport need but the entry is not marked is_ros"
            );
        }
        let nominal_handle = Self::wrap(entry, ControllerRole::Nominal, nominal);

        let emergency_handle = match &pair.emergency_controller {
            None => None,
            Some(em) if em.name == entry.name || manager.handles.contains_key(&em.name) => {
                warn!(
                    controller = %em.name,
                    "duplicate emergency controller name, downgrading pair to failproof fallback"
                );
                None
            }
            Some(em) => {
                match registry.resolve(ControllerRole::Emergency, &em.plugin_name, ctx(em)) {
                    Ok(controller) => Some(Self::wrap(em, ControllerRole::Emergency, controller)),
                    Err(e) => {
                        warn!(
                            controller = %em.name,
                            plugin = %em.plugin_name,
                            error = %e,
                            "emergency plugin failed to load, downgrading pair to failproof fallback"
                        );
                        None
                    }
                }
            }
        };

        let mut order = manager.order.write().await;
        manager
            .handles
            .insert(nominal_handle.name().to_string(), nominal_handle.clone());
        order.push(nominal_handle.name().to_string());
        if let Some(emergency) = &emergency_handle {
            manager
                .handles
                .insert(emergency.name().to_string(), emergency.clone());
            order.push(emergency.name().to_string());
        }
        drop(order);

        manager.pairs.write().await.push(PairRecord {
            nominal: nominal_handle.name().to_string(),
            emergency: emergency_handle.as_ref().map(|h| h.name().to_string()),
        });
        true
    }

    /// Injects the parameter path and wraps the instance in a handle.
    fn wrap(
        entry: &ControllerEntry,
        role: ControllerRole,
        mut controller: Box<dyn Controller<S, C>>,
    ) -> HandleRef<S, C> {
        if let Some(path) = entry.full_parameter_path() {
            controller.set_parameter_path(&path);
        }
        ControllerHandle::new(entry.name.clone(), role, controller)
    }
}
