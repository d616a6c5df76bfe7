//! End-to-end scenarios for the controller manager: setup, switching,
//! failure escalation, emergency-stop latching and the broadcast surface.
//!
//! Ticks are driven manually through `advance_tick` so every scenario is
//! deterministic; the periodic worker gets its own wall-clock test at the
//! end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use gaitvisor::{
    CommandCell, Controller, ControllerError, ControllerManager, Event, EventKind,
    FreezeController, ManagerBuilder, ManagerConfig, ManagerState, PluginContext,
    PluginDeclaration, PluginRegistry, StateCell, SwitchStatus,
};

#[derive(Debug, Default)]
struct RobotState {
    #[allow(dead_code)]
    contact: [bool; 4],
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ActuatorCommand {
    torque: f64,
    source: String,
}

type Journal = Arc<StdMutex<Vec<String>>>;

/// Knobs and counters shared between a test and its scripted controller.
struct Script {
    journal: Journal,
    advances: AtomicU64,
    /// Number of upcoming `initialize` calls that should fail.
    init_failures: AtomicU64,
    /// Fail the Nth advance (1-based); 0 means never.
    fail_advance_at: AtomicU64,
    /// When set, `initialize` blocks until the gate is notified.
    init_gate: StdMutex<Option<Arc<Notify>>>,
}

impl Script {
    fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            advances: AtomicU64::new(0),
            init_failures: AtomicU64::new(0),
            fail_advance_at: AtomicU64::new(0),
            init_gate: StdMutex::new(None),
        })
    }

    fn advances(&self) -> u64 {
        self.advances.load(Ordering::SeqCst)
    }

    fn fail_next_initialize(&self) {
        self.init_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn fail_advance_at(&self, n: u64) {
        self.fail_advance_at.store(n, Ordering::SeqCst);
    }

    fn gate_initialize(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.init_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

/// Test controller driven by a [`Script`]; stamps the command cell with its
/// name so command liveness is observable.
struct ScriptedController {
    name: &'static str,
    state: StateCell<RobotState>,
    command: CommandCell<ActuatorCommand>,
    script: Arc<Script>,
}

impl ScriptedController {
    fn boxed(
        name: &'static str,
        ctx: &PluginContext<RobotState, ActuatorCommand>,
        script: Arc<Script>,
    ) -> Box<dyn Controller<RobotState, ActuatorCommand>> {
        Box::new(Self {
            name,
            state: ctx.state.clone(),
            command: ctx.command.clone(),
            script,
        })
    }
}

#[async_trait]
impl Controller<RobotState, ActuatorCommand> for ScriptedController {
    fn name(&self) -> &str {
        self.name
    }

    async fn initialize(&mut self, _dt: Duration) -> Result<(), ControllerError> {
        let gate = self.script.init_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.script.record(format!("{}.initialize", self.name));
        let pending = self.script.init_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.script
                .init_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(ControllerError::init("scripted failure"));
        }
        Ok(())
    }

    async fn advance(&mut self) -> Result<(), ControllerError> {
        let _state = self.state.read_shared().await;
        let n = self.script.advances.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.script.fail_advance_at.load(Ordering::SeqCst);
        if fail_at != 0 && n == fail_at {
            return Err(ControllerError::advance("scripted failure"));
        }
        let mut command = self.command.write_exclusive().await;
        command.torque = n as f64;
        command.source = self.name.to_string();
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ControllerError> {
        self.script.record(format!("{}.reset", self.name));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ControllerError> {
        self.script.record(format!("{}.stop", self.name));
        Ok(())
    }

    async fn pre_stop(&mut self) {
        self.script.record(format!("{}.pre_stop", self.name));
    }
}

const CONFIG: &str = r#"
controller_manager:
  failproof_controller: "FP"
  time_step: 0.004
  controller_pairs:
    - controller:
        plugin_name: "WalkPlugin"
        name: "WALK"
      emergency_controller:
        plugin_name: "StandPlugin"
        name: "STAND"
    - controller:
        plugin_name: "TrotPlugin"
        name: "TROT"
"#;

struct Fixture {
    manager: Arc<ControllerManager<RobotState, ActuatorCommand>>,
    command: CommandCell<ActuatorCommand>,
    journal: Journal,
    walk: Arc<Script>,
    stand: Arc<Script>,
    trot: Arc<Script>,
}

async fn fixture() -> Fixture {
    let journal: Journal = Arc::new(StdMutex::new(Vec::new()));
    let walk = Script::new(journal.clone());
    let stand = Script::new(journal.clone());
    let trot = Script::new(journal.clone());

    let registry: PluginRegistry<RobotState, ActuatorCommand> = PluginRegistry::new();
    registry
        .register(PluginDeclaration::failproof("FP", |ctx| {
            Box::new(FreezeController::new("FP", ctx.command))
        }))
        .unwrap();
    let script = walk.clone();
    registry
        .register(PluginDeclaration::nominal("WalkPlugin", move |ctx| {
            ScriptedController::boxed("WALK", &ctx, script.clone())
        }))
        .unwrap();
    let script = stand.clone();
    registry
        .register(PluginDeclaration::emergency("StandPlugin", move |ctx| {
            ScriptedController::boxed("STAND", &ctx, script.clone())
        }))
        .unwrap();
    let script = trot.clone();
    registry
        .register(PluginDeclaration::nominal("TrotPlugin", move |ctx| {
            ScriptedController::boxed("TROT", &ctx, script.clone())
        }))
        .unwrap();

    let config = ManagerConfig::from_yaml_str(CONFIG).unwrap();
    let state = StateCell::new(RobotState::default());
    let command = CommandCell::new(ActuatorCommand::default());
    let manager = ManagerBuilder::new(config, state, command.clone())
        .build(&registry)
        .await
        .unwrap();

    Fixture {
        manager,
        command,
        journal,
        walk,
        stand,
        trot,
    }
}

async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

#[tokio::test]
async fn setup_exposes_available_and_active_controllers() {
    let fx = fixture().await;
    assert_eq!(
        fx.manager.available_controllers().await,
        vec!["FP", "WALK", "STAND", "TROT"]
    );
    assert_eq!(fx.manager.active_controller().await, "FP");
    assert_eq!(fx.manager.manager_state().await, ManagerState::Failure);
    assert!(!fx.manager.is_estop_latched().await);

    let surface = fx.manager.surface();
    assert_eq!(
        surface.available_controllers().await.unwrap(),
        vec!["FP", "WALK", "STAND", "TROT"]
    );
    assert_eq!(surface.active_controller().await.unwrap(), "FP");
    assert!(*surface.subscribe_emergency_state().unwrap().borrow());
}

#[tokio::test]
async fn switched_controller_advances_on_the_next_tick() {
    let fx = fixture().await;
    assert_eq!(fx.manager.switch_controller("WALK").await, SwitchStatus::Switched);
    assert_eq!(fx.manager.active_controller().await, "WALK");
    assert_eq!(fx.manager.manager_state().await, ManagerState::Ok);

    fx.manager.advance_tick().await;
    assert_eq!(fx.walk.advances(), 1);
    assert_eq!(fx.command.read_shared().await.source, "WALK");

    // Switching to the active controller reports Running and changes nothing.
    assert_eq!(fx.manager.switch_controller("WALK").await, SwitchStatus::Running);
    assert_eq!(
        *fx.manager
            .surface()
            .subscribe_controller_changed()
            .unwrap()
            .borrow(),
        "WALK"
    );
}

#[tokio::test]
async fn advance_failure_escalates_to_the_paired_emergency_controller() {
    let fx = fixture().await;
    let mut events = fx.manager.subscribe_events();
    let surface = fx.manager.surface();
    let emergency_rx = surface.subscribe_emergency_state().unwrap();

    assert_eq!(fx.manager.switch_controller("WALK").await, SwitchStatus::Switched);
    let changed = next_event(&mut events).await;
    assert_eq!(changed.kind, EventKind::ControllerChanged);

    fx.walk.fail_advance_at(3);
    fx.manager.advance_tick().await;
    fx.manager.advance_tick().await;
    fx.manager.advance_tick().await; // fails, escalates

    assert_eq!(fx.manager.active_controller().await, "STAND");
    assert_eq!(fx.manager.manager_state().await, ManagerState::Emergency);
    assert!(fx.manager.is_estop_latched().await);
    assert!(!*emergency_rx.borrow());

    // Observer ordering: failure, falling edge, then the hand-over.
    let failed = next_event(&mut events).await;
    assert_eq!(failed.kind, EventKind::AdvanceFailed);
    assert_eq!(failed.controller.as_deref(), Some("WALK"));
    let stopped = next_event(&mut events).await;
    assert_eq!(stopped.kind, EventKind::EmergencyStopped);
    assert_eq!(stopped.controller.as_deref(), Some("STAND"));
    let changed = next_event(&mut events).await;
    assert_eq!(changed.kind, EventKind::ControllerChanged);
    assert_eq!(changed.controller.as_deref(), Some("STAND"));

    // Command liveness: the fallback owns the command cell on the next tick.
    fx.manager.advance_tick().await;
    assert_eq!(fx.command.read_shared().await.source, "STAND");
    assert_eq!(fx.stand.advances(), 1);
}

#[tokio::test]
async fn latched_estop_blocks_switches_until_cleared() {
    let fx = fixture().await;
    let surface = fx.manager.surface();
    let cleared_rx = surface.subscribe_cleared_emergency_state().unwrap();

    assert_eq!(surface.switch_controller("WALK").await, SwitchStatus::Switched);
    assert!(surface.emergency_stop().await.success);
    assert_eq!(fx.manager.active_controller().await, "STAND");
    assert!(!*cleared_rx.borrow());

    assert_eq!(surface.switch_controller("WALK").await, SwitchStatus::Error);
    // The failproof controller stays reachable while latched.
    assert_eq!(surface.switch_controller("FP").await, SwitchStatus::Switched);

    assert!(surface.clear_emergency_stop().await.success);
    assert!(*cleared_rx.borrow());
    assert!(!fx.manager.is_estop_latched().await);
    assert_eq!(surface.switch_controller("WALK").await, SwitchStatus::Switched);
    assert_eq!(fx.manager.active_controller().await, "WALK");
}

#[tokio::test]
async fn clear_without_latch_reports_an_error() {
    let fx = fixture().await;
    let surface = fx.manager.surface();
    let response = surface.clear_emergency_stop().await;
    assert!(!response.success);
}

#[tokio::test]
async fn unknown_controller_reports_not_found() {
    let fx = fixture().await;
    assert_eq!(fx.manager.switch_controller("BOUND").await, SwitchStatus::NotFound);
    assert_eq!(fx.manager.active_controller().await, "FP");
}

#[tokio::test]
async fn repeated_estops_produce_a_single_falling_edge() {
    let fx = fixture().await;
    let surface = fx.manager.surface();
    let mut emergency_rx = surface.subscribe_emergency_state().unwrap();
    let mut events = fx.manager.subscribe_events();

    assert_eq!(surface.switch_controller("WALK").await, SwitchStatus::Switched);
    let _ = next_event(&mut events).await; // ControllerChanged(WALK)

    assert!(surface.emergency_stop().await.success);
    assert!(surface.emergency_stop().await.success);
    assert!(surface.emergency_stop().await.success);

    assert_eq!(fx.manager.active_controller().await, "STAND");

    let mut estop_events = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::EmergencyStopped {
            estop_events += 1;
        }
    }
    assert_eq!(estop_events, 1);

    // Exactly one watch edge, down to false.
    assert!(emergency_rx.has_changed().unwrap());
    assert!(!*emergency_rx.borrow_and_update());
    assert!(!emergency_rx.has_changed().unwrap());
}

#[tokio::test]
async fn failed_target_initialisation_escalates_to_its_fallback() {
    let fx = fixture().await;
    fx.walk.fail_next_initialize();

    assert_eq!(fx.manager.switch_controller("WALK").await, SwitchStatus::Error);
    // The failed target's paired emergency controller takes over.
    assert_eq!(fx.manager.active_controller().await, "STAND");
    assert!(fx.manager.is_estop_latched().await);

    // After a clear the same controller can be brought up normally.
    assert_eq!(
        fx.manager.switch_controller_after_emergency_stop("WALK").await,
        SwitchStatus::Switched
    );
    assert_eq!(fx.manager.active_controller().await, "WALK");
    assert!(!fx.manager.is_estop_latched().await);
}

#[tokio::test]
async fn estop_without_paired_emergency_lands_on_failproof() {
    let fx = fixture().await;
    assert_eq!(fx.manager.switch_controller("TROT").await, SwitchStatus::Switched);

    assert!(fx.manager.surface().emergency_stop().await.success);
    assert_eq!(fx.manager.active_controller().await, "FP");
    assert_eq!(fx.manager.manager_state().await, ManagerState::Failure);

    // The freeze fallback resets the command cell to the safe default.
    fx.manager.advance_tick().await;
    assert_eq!(*fx.command.read_shared().await, ActuatorCommand::default());
    let _ = fx.trot.advances();
}

#[tokio::test]
async fn two_estops_reach_the_failproof_controller() {
    let fx = fixture().await;
    let surface = fx.manager.surface();
    assert_eq!(surface.switch_controller("WALK").await, SwitchStatus::Switched);

    assert!(surface.emergency_stop().await.success);
    assert_eq!(fx.manager.active_controller().await, "STAND");

    assert!(surface.clear_emergency_stop().await.success);
    assert!(surface.emergency_stop().await.success);
    assert_eq!(fx.manager.active_controller().await, "FP");
}

#[tokio::test]
async fn second_switch_during_initialisation_is_rejected() {
    let fx = fixture().await;
    let gate = fx.walk.gate_initialize();

    let manager = fx.manager.clone();
    let first = tokio::spawn(async move { manager.switch_controller("WALK").await });

    // Let the first switch park inside the target's initialize.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.manager.switch_controller("TROT").await, SwitchStatus::Error);

    // Ticks keep advancing the old controller while the switch is parked.
    fx.manager.advance_tick().await;
    assert_eq!(*fx.command.read_shared().await, ActuatorCommand::default());

    gate.notify_one();
    assert_eq!(first.await.unwrap(), SwitchStatus::Switched);
    assert_eq!(fx.manager.active_controller().await, "WALK");
}

#[tokio::test]
async fn hand_over_runs_pre_stop_before_the_new_controller_resets() {
    let fx = fixture().await;
    assert_eq!(fx.manager.switch_controller("WALK").await, SwitchStatus::Switched);
    fx.manager.advance_tick().await;
    assert_eq!(fx.manager.switch_controller("STAND").await, SwitchStatus::Switched);

    let journal = fx.journal.lock().unwrap().clone();
    let position = |entry: &str| {
        journal
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing journal entry {entry}: {journal:?}"))
    };

    // The target initialises before the swap, the outgoing controller gets
    // its pre-stop hook, the new one resets, the old one stops.
    assert!(position("STAND.initialize") < position("WALK.pre_stop"));
    assert!(position("WALK.pre_stop") < position("STAND.reset"));
    assert!(position("WALK.pre_stop") < position("WALK.stop"));

    fx.manager.advance_tick().await;
    assert_eq!(fx.command.read_shared().await.source, "STAND");
}

#[tokio::test]
async fn tick_worker_drives_the_active_controller() {
    let fx = fixture().await;
    fx.manager.start().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let stats = fx.manager.tick_stats().await;
    assert!(stats.tick_count > 0, "worker produced no ticks");

    fx.manager.cleanup().await;
    let after_cleanup = fx.manager.tick_stats().await.tick_count;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fx.manager.tick_stats().await.tick_count, after_cleanup);
}

#[tokio::test]
async fn missing_failproof_plugin_is_fatal() {
    let registry: PluginRegistry<RobotState, ActuatorCommand> = PluginRegistry::new();
    let config = ManagerConfig::from_yaml_str(CONFIG).unwrap();
    let err = ManagerBuilder::new(
        config,
        StateCell::new(RobotState::default()),
        CommandCell::new(ActuatorCommand::default()),
    )
    .build(&registry)
    .await
    .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn unresolvable_pair_members_downgrade_instead_of_aborting() {
    // Only the failproof and the stand plugins exist; the walk pair is
    // skipped, the trot pair survives without an emergency half.
    let registry: PluginRegistry<RobotState, ActuatorCommand> = PluginRegistry::new();
    registry
        .register(PluginDeclaration::failproof("FP", |ctx| {
            Box::new(FreezeController::new("FP", ctx.command))
        }))
        .unwrap();
    let journal: Journal = Arc::new(StdMutex::new(Vec::new()));
    let trot = Script::new(journal);
    let script = trot.clone();
    registry
        .register(PluginDeclaration::nominal("TrotPlugin", move |ctx| {
            ScriptedController::boxed("TROT", &ctx, script.clone())
        }))
        .unwrap();

    let yaml = r#"
controller_manager:
  failproof_controller: "FP"
  time_step: 0.004
  controller_pairs:
    - controller:
        plugin_name: "WalkPlugin"
        name: "WALK"
    - controller:
        plugin_name: "TrotPlugin"
        name: "TROT"
      emergency_controller:
        plugin_name: "MissingPlugin"
        name: "CROUCH"
"#;
    let config = ManagerConfig::from_yaml_str(yaml).unwrap();
    let manager = ManagerBuilder::new(
        config,
        StateCell::new(RobotState::default()),
        CommandCell::new(ActuatorCommand::default()),
    )
    .build(&registry)
    .await
    .unwrap();

    assert_eq!(manager.available_controllers().await, vec!["FP", "TROT"]);

    // With the emergency half downgraded, TROT falls back to failproof.
    assert_eq!(manager.switch_controller("TROT").await, SwitchStatus::Switched);
    assert!(manager.surface().emergency_stop().await.success);
    assert_eq!(manager.active_controller().await, "FP");
}
