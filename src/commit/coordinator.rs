// src/commit/coordinator.rs
//
// Ordered, partially-failable persistence of a finalized trajectory.
//
//   1. header            → trajectory id   (fatal on failure)
//   2. points            → best effort, concurrent, per point
//   3. observations      → best effort, concurrent, per observation
//   4. line geometry     → needs ≥ 2 vertices, else only ended_at
//   5. danger index      → fire and forget
//
// The commit succeeds once step 1 produced an id and steps 2-4 were
// attempted. Losses in 2-4 make the commit degraded, not failed.

use super::metrics::RecorderMetrics;
use crate::error::{CommitError, StorageError};
use crate::storage::TrajectoryStore;
use crate::types::{LocalId, Trajectory, TrajectoryHeader, TrajectoryId};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryOutcome {
    /// Line geometry and ended_at written
    LineString,
    /// Fewer than 2 points: only ended_at written
    EndOnly,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub trajectory_id: TrajectoryId,
    pub points_persisted: usize,
    pub points_failed: Vec<LocalId>,
    pub observations_persisted: usize,
    pub observations_failed: Vec<LocalId>,
    pub geometry: GeometryOutcome,
}

impl CommitReport {
    /// Some point, observation or the geometry update was lost.
    pub fn is_degraded(&self) -> bool {
        !self.points_failed.is_empty()
            || !self.observations_failed.is_empty()
            || self.geometry == GeometryOutcome::Failed
    }
}

pub struct CommitCoordinator {
    store: Arc<dyn TrajectoryStore>,
    user_id: String,
    metrics: RecorderMetrics,
}

impl CommitCoordinator {
    pub fn new(
        store: Arc<dyn TrajectoryStore>,
        user_id: impl Into<String>,
        metrics: RecorderMetrics,
    ) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn TrajectoryStore> {
        &self.store
    }

    pub async fn commit(&self, trajectory: &Trajectory) -> Result<CommitReport, CommitError> {
        let started = Instant::now();
        let ended_at = trajectory.ended_at.unwrap_or_else(Utc::now);

        // ── Step 1: header ──
        let header = TrajectoryHeader {
            started_at: trajectory.started_at,
            ended_at: Some(ended_at),
            user_id: self.user_id.clone(),
        };
        let id = match self.store.create_trajectory(&header).await {
            Ok(id) => id,
            Err(e) => {
                error!("❌ Trajectory header creation failed, commit aborted: {}", e);
                self.metrics.inc(&self.metrics.commits_failed);
                return Err(CommitError::HeaderCreation(e));
            }
        };
        debug!("Header created: {}", id);

        // Local ids dedupe anything appended twice before commit
        let mut seen = HashSet::new();
        let points: Vec<_> = trajectory
            .points
            .iter()
            .filter(|p| seen.insert(p.local_id))
            .collect();
        let observations: Vec<_> = trajectory
            .observations
            .iter()
            .filter(|o| seen.insert(o.local_id))
            .collect();

        // ── Step 2: points ──
        let point_results = join_all(
            points
                .iter()
                .map(|p| self.store.add_trajectory_point(id, p)),
        )
        .await;
        let points_failed = collect_failures(
            "point",
            id,
            points.iter().map(|p| p.local_id).zip(point_results),
        );

        // ── Step 3: observations ──
        let observation_results = join_all(
            observations
                .iter()
                .map(|o| self.store.add_hazard_observation(id, o)),
        )
        .await;
        let observations_failed = collect_failures(
            "observation",
            id,
            observations
                .iter()
                .map(|o| o.local_id)
                .zip(observation_results),
        );

        // ── Step 4: geometry / end ──
        let geometry = if points.len() >= 2 {
            let line: Vec<_> = points.iter().map(|p| p.coordinate()).collect();
            match self
                .store
                .update_trajectory_geometry(id, &line, ended_at)
                .await
            {
                Ok(()) => GeometryOutcome::LineString,
                Err(e) => {
                    warn!("Geometry update for {} failed: {}", id, e);
                    GeometryOutcome::Failed
                }
            }
        } else {
            debug!(
                "{} has {} point(s); skipping line geometry",
                id,
                points.len()
            );
            match self.store.update_trajectory_end(id, ended_at).await {
                Ok(()) => GeometryOutcome::EndOnly,
                Err(e) => {
                    warn!("End time update for {} failed: {}", id, e);
                    GeometryOutcome::Failed
                }
            }
        };

        // ── Step 5: danger index ──
        self.spawn_danger_index(id);

        let report = CommitReport {
            trajectory_id: id,
            points_persisted: points.len() - points_failed.len(),
            points_failed,
            observations_persisted: observations.len() - observations_failed.len(),
            observations_failed,
            geometry,
        };
        self.record(&report, started);
        Ok(report)
    }

    fn spawn_danger_index(&self, id: TrajectoryId) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.compute_and_cache_danger_index(id).await {
                Ok(()) => debug!("Danger index computed for {}", id),
                Err(e) => warn!("Danger index computation for {} failed: {}", id, e),
            }
        });
    }

    fn record(&self, report: &CommitReport, started: Instant) {
        self.metrics.set_timing(
            &self.metrics.commit_time_us,
            started.elapsed().as_micros() as u64,
        );
        self.metrics
            .add(&self.metrics.points_lost, report.points_failed.len() as u64);
        self.metrics.add(
            &self.metrics.observations_lost,
            report.observations_failed.len() as u64,
        );
        if report.geometry == GeometryOutcome::Failed {
            self.metrics.inc(&self.metrics.geometry_failures);
        }

        if report.is_degraded() {
            self.metrics.inc(&self.metrics.commits_degraded);
            warn!(
                "⚠️  {} committed DEGRADED: points {}/{} lost, observations {}/{} lost, geometry {:?}",
                report.trajectory_id,
                report.points_failed.len(),
                report.points_persisted + report.points_failed.len(),
                report.observations_failed.len(),
                report.observations_persisted + report.observations_failed.len(),
                report.geometry,
            );
        } else {
            self.metrics.inc(&self.metrics.commits_clean);
            info!(
                "✅ {} committed: {} point(s), {} observation(s), geometry {:?}",
                report.trajectory_id,
                report.points_persisted,
                report.observations_persisted,
                report.geometry,
            );
        }
    }
}

fn collect_failures(
    kind: &str,
    id: TrajectoryId,
    results: impl Iterator<Item = (LocalId, Result<(), StorageError>)>,
) -> Vec<LocalId> {
    results
        .filter_map(|(local_id, result)| match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to persist {} {:?} of {}: {}", kind, local_id, id, e);
                Some(local_id)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::types::{HazardObservation, TrajectoryPoint};
    use chrono::{DateTime, Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    fn trajectory(points: usize, severities: &[u8]) -> Trajectory {
        let mut t = Trajectory::new(t0());
        for i in 0..points {
            t.points.push(TrajectoryPoint {
                latitude: 47.0 + i as f64 * 0.001,
                longitude: 8.5,
                captured_at: t0() + Duration::seconds(i as i64 * 8),
                local_id: LocalId(i as u64),
            });
        }
        for (i, severity) in severities.iter().enumerate() {
            t.observations.push(HazardObservation {
                latitude: 47.0,
                longitude: 8.5,
                captured_at: t0(),
                local_id: LocalId(100 + i as u64),
                description: "blind corner".to_string(),
                severity: *severity,
            });
        }
        t.ended_at = Some(t0() + Duration::minutes(10));
        t
    }

    fn coordinator(store: &Arc<InMemoryStore>) -> (CommitCoordinator, RecorderMetrics) {
        let metrics = RecorderMetrics::new();
        let store: Arc<dyn TrajectoryStore> = store.clone();
        (
            CommitCoordinator::new(store, "surveyor-1", metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_single_point_skips_geometry() {
        let store = Arc::new(InMemoryStore::new());
        let (coordinator, _) = coordinator(&store);

        let report = coordinator.commit(&trajectory(1, &[])).await.unwrap();
        assert_eq!(report.geometry, GeometryOutcome::EndOnly);
        assert!(!report.is_degraded());

        let stored = store.get_trajectory_detail(report.trajectory_id).await.unwrap();
        assert_eq!(stored.id, Some(report.trajectory_id));
        assert_eq!(stored.ended_at, Some(t0() + Duration::minutes(10)));
        assert!(store.geometry_of(report.trajectory_id).is_none());
    }

    #[tokio::test]
    async fn test_empty_trajectory_is_committable() {
        let store = Arc::new(InMemoryStore::new());
        let (coordinator, _) = coordinator(&store);

        let report = coordinator.commit(&trajectory(0, &[])).await.unwrap();
        assert_eq!(report.points_persisted, 0);
        assert_eq!(report.geometry, GeometryOutcome::EndOnly);
    }

    #[tokio::test]
    async fn test_point_failure_degrades_but_succeeds() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_point(LocalId(1));
        let (coordinator, metrics) = coordinator(&store);

        let report = coordinator.commit(&trajectory(3, &[2])).await.unwrap();
        assert!(report.is_degraded());
        assert_eq!(report.points_persisted, 2);
        assert_eq!(report.points_failed, vec![LocalId(1)]);
        assert_eq!(report.geometry, GeometryOutcome::LineString);

        let stored = store.get_trajectory_detail(report.trajectory_id).await.unwrap();
        let ids: Vec<LocalId> = stored.points.iter().map(|p| p.local_id).collect();
        assert_eq!(ids, vec![LocalId(0), LocalId(2)]);
        assert_eq!(stored.observations.len(), 1);

        let summary = metrics.summary();
        assert_eq!(summary.commits_degraded, 1);
        assert_eq!(summary.points_lost, 1);
        assert_eq!(summary.commits_failed, 0);
    }

    #[tokio::test]
    async fn test_header_failure_is_fatal() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_header_creation(true);
        let (coordinator, metrics) = coordinator(&store);

        let result = coordinator.commit(&trajectory(3, &[1])).await;
        assert!(matches!(result, Err(CommitError::HeaderCreation(_))));
        assert_eq!(store.trajectory_count(), 0);
        assert_eq!(metrics.summary().commits_failed, 1);
    }

    #[tokio::test]
    async fn test_geometry_line_in_capture_order() {
        let store = Arc::new(InMemoryStore::new());
        let (coordinator, metrics) = coordinator(&store);

        let report = coordinator.commit(&trajectory(4, &[])).await.unwrap();
        let line = store.geometry_of(report.trajectory_id).unwrap();
        assert_eq!(line.len(), 4);
        assert!(line.windows(2).all(|w| w[0].latitude < w[1].latitude));
        assert_eq!(metrics.summary().commits_clean, 1);
    }

    #[tokio::test]
    async fn test_geometry_failure_degrades() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_geometry(true);
        let (coordinator, _) = coordinator(&store);

        let report = coordinator.commit(&trajectory(2, &[])).await.unwrap();
        assert_eq!(report.geometry, GeometryOutcome::Failed);
        assert!(report.is_degraded());
    }

    #[tokio::test]
    async fn test_danger_index_triggered_after_commit() {
        let store = Arc::new(InMemoryStore::new());
        let (coordinator, _) = coordinator(&store);

        let report = coordinator.commit(&trajectory(2, &[1, 2, 3, 4])).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let index = store.get_danger_index(report.trajectory_id).await.unwrap();
        assert_eq!(index, Some(2.5));
    }

    #[tokio::test]
    async fn test_duplicate_local_ids_persisted_once() {
        let store = Arc::new(InMemoryStore::new());
        let (coordinator, _) = coordinator(&store);

        let mut t = trajectory(2, &[]);
        let duplicate = t.points[0].clone();
        t.points.push(duplicate);

        let report = coordinator.commit(&t).await.unwrap();
        assert_eq!(report.points_persisted, 2);
    }
}
