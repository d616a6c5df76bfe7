//! # Tick worker: periodic driver of the active controller.
//!
//! A spawned task calls [`ControllerManager::advance_tick`] at the fixed
//! tick period. The worker itself never takes the state/command cell locks;
//! the controller does. Missed ticks are skipped rather than bursted so a
//! slow controller cannot build up a backlog of stale ticks.
//!
//! Tick durations are measured against the budget but never enforced; an
//! overrun is counted and logged, nothing more.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::core::ControllerManager;

/// Per-tick timing statistics, updated by the manager on every tick.
#[derive(Debug, Clone)]
pub struct TickStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Duration of the last tick.
    pub last: Duration,
    /// Longest tick observed.
    pub max: Duration,
    /// Ticks that exceeded the budget.
    pub overruns: u64,
}

impl TickStats {
    pub(crate) fn new() -> Self {
        Self {
            tick_count: 0,
            last: Duration::ZERO,
            max: Duration::ZERO,
            overruns: 0,
        }
    }

    /// Records one tick; returns true if the budget was exceeded.
    pub(crate) fn record(&mut self, elapsed: Duration, budget: Duration) -> bool {
        self.tick_count += 1;
        self.last = elapsed;
        if elapsed > self.max {
            self.max = elapsed;
        }
        let overrun = elapsed > budget;
        if overrun {
            self.overruns += 1;
        }
        overrun
    }
}

/// Spawns the periodic tick task.
pub(crate) fn spawn_tick_worker<S, C>(
    manager: Arc<ControllerManager<S, C>>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(manager.time_step());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            manager.advance_tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_max_and_overruns() {
        let budget = Duration::from_millis(10);
        let mut stats = TickStats::new();

        assert!(!stats.record(Duration::from_millis(4), budget));
        assert!(stats.record(Duration::from_millis(12), budget));
        assert!(!stats.record(Duration::from_millis(6), budget));

        assert_eq!(stats.tick_count, 3);
        assert_eq!(stats.last, Duration::from_millis(6));
        assert_eq!(stats.max, Duration::from_millis(12));
        assert_eq!(stats.overruns, 1);
    }
}
