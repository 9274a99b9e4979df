// src/commit/metrics.rs
//
// Recorder observability. Counts samples, prompts and commit outcomes so a
// degraded commit is distinguishable from a failed one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RecorderMetrics {
    pub points_sampled: Arc<AtomicU64>,
    pub observations_recorded: Arc<AtomicU64>,
    pub zone_entries: Arc<AtomicU64>,
    pub commits_clean: Arc<AtomicU64>,
    pub commits_degraded: Arc<AtomicU64>,
    pub commits_failed: Arc<AtomicU64>,
    pub points_lost: Arc<AtomicU64>,
    pub observations_lost: Arc<AtomicU64>,
    pub geometry_failures: Arc<AtomicU64>,
    pub commit_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl RecorderMetrics {
    pub fn new() -> Self {
        Self {
            points_sampled: Arc::new(AtomicU64::new(0)),
            observations_recorded: Arc::new(AtomicU64::new(0)),
            zone_entries: Arc::new(AtomicU64::new(0)),
            commits_clean: Arc::new(AtomicU64::new(0)),
            commits_degraded: Arc::new(AtomicU64::new(0)),
            commits_failed: Arc::new(AtomicU64::new(0)),
            points_lost: Arc::new(AtomicU64::new(0)),
            observations_lost: Arc::new(AtomicU64::new(0)),
            geometry_failures: Arc::new(AtomicU64::new(0)),
            commit_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            points_sampled: self.points_sampled.load(Ordering::Relaxed),
            observations_recorded: self.observations_recorded.load(Ordering::Relaxed),
            zone_entries: self.zone_entries.load(Ordering::Relaxed),
            commits_clean: self.commits_clean.load(Ordering::Relaxed),
            commits_degraded: self.commits_degraded.load(Ordering::Relaxed),
            commits_failed: self.commits_failed.load(Ordering::Relaxed),
            points_lost: self.points_lost.load(Ordering::Relaxed),
            observations_lost: self.observations_lost.load(Ordering::Relaxed),
            geometry_failures: self.geometry_failures.load(Ordering::Relaxed),
            last_commit_us: self.commit_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RecorderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub points_sampled: u64,
    pub observations_recorded: u64,
    pub zone_entries: u64,
    pub commits_clean: u64,
    pub commits_degraded: u64,
    pub commits_failed: u64,
    pub points_lost: u64,
    pub observations_lost: u64,
    pub geometry_failures: u64,
    pub last_commit_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = RecorderMetrics::new();
        let clone = metrics.clone();
        clone.inc(&clone.points_sampled);
        metrics.add(&metrics.points_lost, 3);

        let summary = metrics.summary();
        assert_eq!(summary.points_sampled, 1);
        assert_eq!(summary.points_lost, 3);
        assert_eq!(summary.commits_failed, 0);
    }
}
