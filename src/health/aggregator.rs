use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::types::{HealthStatus, ProbeOutcome, TargetId};

pub const DEFAULT_THRESHOLD: u32 = 3;
pub const DEFAULT_WINDOW_CAPACITY: usize = 120;

/// Bounded ring of recent probe outcomes for one target. Oldest samples are
/// evicted once capacity is reached.
#[derive(Debug, Clone)]
struct ProbeWindow {
    samples: VecDeque<ProbeOutcome>,
    capacity: usize,
}

impl ProbeWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, outcome: ProbeOutcome) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(outcome);
    }

    fn snapshot(&self) -> Vec<ProbeOutcome> {
        self.samples.iter().cloned().collect()
    }
}

#[derive(Debug)]
struct TargetHealth {
    window: ProbeWindow,
    status: HealthStatus,
    success_streak: u32,
    failure_streak: u32,
}

impl TargetHealth {
    fn new(capacity: usize) -> Self {
        Self {
            window: ProbeWindow::new(capacity),
            status: HealthStatus::Up,
            success_streak: 0,
            failure_streak: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub target_id: TargetId,
    pub from: HealthStatus,
    pub to: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeStats {
    pub target_id: TargetId,
    pub samples: usize,
    pub successes: usize,
    pub uptime_pct: f64,
    pub status: HealthStatus,
}

fn step_down(status: HealthStatus) -> HealthStatus {
    match status {
        HealthStatus::Up => HealthStatus::Degraded,
        HealthStatus::Degraded | HealthStatus::Down => HealthStatus::Down,
    }
}

fn step_up(status: HealthStatus) -> HealthStatus {
    match status {
        HealthStatus::Down => HealthStatus::Degraded,
        HealthStatus::Degraded | HealthStatus::Up => HealthStatus::Up,
    }
}

/// Derives per-target health from raw probe outcomes with hysteresis: a
/// level change requires `threshold` consecutive outcomes of the new class,
/// and recovery climbs one level at a time, so a single flaky probe can
/// never flip status.
pub struct UptimeAggregator {
    targets: RwLock<HashMap<TargetId, TargetHealth>>,
    threshold: u32,
    capacity: usize,
}

impl UptimeAggregator {
    pub fn new(threshold: u32, capacity: usize) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            threshold: threshold.max(1),
            capacity: capacity.max(1),
        }
    }

    /// Record one probe outcome, returning the status change it caused, if
    /// any.
    pub fn record(&self, outcome: ProbeOutcome) -> Option<StatusChange> {
        let mut targets = self.targets.write().unwrap();
        let entry = targets
            .entry(outcome.target_id)
            .or_insert_with(|| TargetHealth::new(self.capacity));

        let target_id = outcome.target_id;
        let success = outcome.success;
        entry.window.push(outcome);

        if success {
            entry.failure_streak = 0;
            entry.success_streak += 1;
            if entry.success_streak >= self.threshold && entry.status != HealthStatus::Up {
                let from = entry.status;
                entry.status = step_up(entry.status);
                entry.success_streak = 0;
                return Some(StatusChange {
                    target_id,
                    from,
                    to: entry.status,
                });
            }
        } else {
            entry.success_streak = 0;
            entry.failure_streak += 1;
            if entry.failure_streak >= self.threshold && entry.status != HealthStatus::Down {
                let from = entry.status;
                entry.status = step_down(entry.status);
                entry.failure_streak = 0;
                return Some(StatusChange {
                    target_id,
                    from,
                    to: entry.status,
                });
            }
        }

        None
    }

    /// Current status for a target; `Up` until evidence says otherwise.
    pub fn status(&self, target_id: &TargetId) -> HealthStatus {
        let targets = self.targets.read().unwrap();
        targets
            .get(target_id)
            .map(|t| t.status)
            .unwrap_or(HealthStatus::Up)
    }

    /// Uptime statistics over the retained window, optionally narrowed to
    /// the most recent `window` duration. Reads work on a snapshot so
    /// concurrent appends never interleave with the computation.
    pub fn uptime(&self, target_id: &TargetId, window: Option<Duration>) -> Option<UptimeStats> {
        let (samples, status) = {
            let targets = self.targets.read().unwrap();
            let entry = targets.get(target_id)?;
            (entry.window.snapshot(), entry.status)
        };

        let cutoff = window.map(|w| Utc::now() - w);
        let in_window: Vec<_> = samples
            .iter()
            .filter(|s| cutoff.map(|c| s.timestamp >= c).unwrap_or(true))
            .collect();

        let total = in_window.len();
        let successes = in_window.iter().filter(|s| s.success).count();
        let uptime_pct = if total == 0 {
            100.0
        } else {
            successes as f64 / total as f64 * 100.0
        };

        Some(UptimeStats {
            target_id: *target_id,
            samples: total,
            successes,
            uptime_pct,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> UptimeAggregator {
        UptimeAggregator::new(3, 10)
    }

    fn feed(agg: &UptimeAggregator, target: TargetId, outcomes: &[bool]) -> Vec<StatusChange> {
        outcomes
            .iter()
            .filter_map(|&ok| {
                let outcome = if ok {
                    ProbeOutcome::success(target, 10)
                } else {
                    ProbeOutcome::failure(target, 10, "connection refused")
                };
                agg.record(outcome)
            })
            .collect()
    }

    #[test]
    fn test_unknown_target_defaults_to_up() {
        let agg = aggregator();
        assert_eq!(agg.status(&TargetId::new_v4()), HealthStatus::Up);
    }

    #[test]
    fn test_three_consecutive_failures_degrade() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        let changes = feed(&agg, target, &[false, false, false]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, HealthStatus::Up);
        assert_eq!(changes[0].to, HealthStatus::Degraded);
        assert_eq!(agg.status(&target), HealthStatus::Degraded);
    }

    #[test]
    fn test_six_consecutive_failures_reach_down() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        let changes = feed(&agg, target, &[false; 6]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].to, HealthStatus::Down);
    }

    #[test]
    fn test_alternating_outcomes_never_flip_status() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        let changes = feed(
            &agg,
            target,
            &[false, true, false, true, false, true, false, true],
        );
        assert!(changes.is_empty());
        assert_eq!(agg.status(&target), HealthStatus::Up);
    }

    #[test]
    fn test_recovery_climbs_one_level_at_a_time() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        feed(&agg, target, &[false; 6]);
        assert_eq!(agg.status(&target), HealthStatus::Down);

        // Three successes only reach degraded, never straight to up.
        let changes = feed(&agg, target, &[true, true, true]);
        assert_eq!(changes.len(), 1);
        assert_eq!(agg.status(&target), HealthStatus::Degraded);

        feed(&agg, target, &[true, true, true]);
        assert_eq!(agg.status(&target), HealthStatus::Up);
    }

    #[test]
    fn test_single_success_does_not_clear_down() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        feed(&agg, target, &[false; 6]);
        let changes = feed(&agg, target, &[true]);
        assert!(changes.is_empty());
        assert_eq!(agg.status(&target), HealthStatus::Down);
    }

    #[test]
    fn test_window_eviction() {
        let agg = UptimeAggregator::new(3, 4);
        let target = TargetId::new_v4();

        feed(&agg, target, &[false, false, true, true, true, true]);
        let stats = agg.uptime(&target, None).unwrap();
        // Capacity 4: the two early failures were evicted.
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.successes, 4);
        assert_eq!(stats.uptime_pct, 100.0);
    }

    #[test]
    fn test_uptime_percentage() {
        let agg = aggregator();
        let target = TargetId::new_v4();

        feed(&agg, target, &[true, true, false, true]);
        let stats = agg.uptime(&target, None).unwrap();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.successes, 3);
        assert!((stats.uptime_pct - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uptime_unknown_target() {
        let agg = aggregator();
        assert!(agg.uptime(&TargetId::new_v4(), None).is_none());
    }
}
