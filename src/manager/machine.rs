//! Switching state machine vocabulary.
//!
//! The machine itself lives in [`ControllerManager`](super::ControllerManager);
//! this module holds its control variables and the enums exposed on the
//! request surface.

/// Phase of the switching state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerPhase {
    /// No transition in progress.
    Idle,
    /// A switch target is being initialised; further switches are rejected.
    Switching,
    /// An emergency stop is being executed.
    EmergencyStopping,
    /// Transient phase while a cleared emergency stop is being announced.
    Cleared,
}

/// Coarse manager state, broadcast with latched semantics.
///
/// Derived from the role of the active controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// A nominal controller is active.
    Ok,
    /// A paired emergency controller is active.
    Emergency,
    /// The failproof controller is active.
    Failure,
}

impl ManagerState {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerState::Ok => "ok",
            ManagerState::Emergency => "emergency",
            ManagerState::Failure => "failure",
        }
    }
}

/// Outcome of a switch request, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStatus {
    /// The request was rejected (latched estop, switch in progress,
    /// superseded, or target initialisation failed).
    Error,
    /// No controller is registered under the requested name.
    NotFound,
    /// The requested controller is already active.
    Running,
    /// The switch completed; the next tick advances the new controller.
    Switched,
}

impl SwitchStatus {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            SwitchStatus::Error => "error",
            SwitchStatus::NotFound => "not_found",
            SwitchStatus::Running => "running",
            SwitchStatus::Switched => "switched",
        }
    }
}

/// Why an emergency stop was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyStopKind {
    /// Requested by the operator through the surface.
    Operator,
    /// Synthesised by the manager after a controller failure.
    Failure,
}

impl EmergencyStopKind {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            EmergencyStopKind::Operator => "operator",
            EmergencyStopKind::Failure => "failure",
        }
    }
}

/// Control variables of the switching state machine, guarded by one lock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusBlock {
    pub(crate) phase: ManagerPhase,
    /// While latched, switch requests to non-failproof controllers are
    /// rejected until explicitly cleared.
    pub(crate) estop_latched: bool,
    /// Incremented per admitted switch; a commit only lands when the phase
    /// still belongs to the admission that opened it.
    pub(crate) switch_epoch: u64,
}

impl StatusBlock {
    pub(crate) fn new() -> Self {
        Self {
            phase: ManagerPhase::Idle,
            estop_latched: false,
            switch_epoch: 0,
        }
    }

    /// True while `phase == Switching` and owned by the given epoch.
    pub(crate) fn owns_switch(&self, epoch: u64) -> bool {
        self.phase == ManagerPhase::Switching && self.switch_epoch == epoch
    }
}
