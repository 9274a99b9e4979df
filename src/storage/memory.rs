// src/storage/memory.rs
//
// In-process store. Used by the `memory` backend and by tests, with
// switches to make individual steps fail.

use super::TrajectoryStore;
use crate::analytics::danger_index::{compute_average, compute_index};
use crate::error::StorageError;
use crate::types::{
    HazardObservation, HeatPoint, LatLng, LocalId, PopulationAverage, Trajectory,
    TrajectoryHeader, TrajectoryId, TrajectoryPoint,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredTrajectory {
    header: TrajectoryHeader,
    points: Vec<TrajectoryPoint>,
    observations: Vec<HazardObservation>,
    geometry: Option<Vec<LatLng>>,
    danger_index: Option<f64>,
}

impl StoredTrajectory {
    fn to_trajectory(&self, id: TrajectoryId) -> Trajectory {
        let mut points = self.points.clone();
        points.sort_by_key(|p| (p.captured_at, p.local_id));
        Trajectory {
            id: Some(id),
            started_at: self.header.started_at,
            ended_at: self.header.ended_at,
            points,
            observations: self.observations.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    header: bool,
    geometry: bool,
    points: HashSet<LocalId>,
    observations: HashSet<LocalId>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    trajectories: BTreeMap<TrajectoryId, StoredTrajectory>,
    heat_points: Vec<HeatPoint>,
    failures: FailurePlan,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_header_creation(&self, fail: bool) {
        self.lock().failures.header = fail;
    }

    pub fn fail_geometry(&self, fail: bool) {
        self.lock().failures.geometry = fail;
    }

    pub fn fail_point(&self, local_id: LocalId) {
        self.lock().failures.points.insert(local_id);
    }

    pub fn fail_observation(&self, local_id: LocalId) {
        self.lock().failures.observations.insert(local_id);
    }

    pub fn add_heat_points(&self, points: impl IntoIterator<Item = HeatPoint>) {
        self.lock().heat_points.extend(points);
    }

    pub fn trajectory_count(&self) -> usize {
        self.lock().trajectories.len()
    }

    pub fn geometry_of(&self, id: TrajectoryId) -> Option<Vec<LatLng>> {
        self.lock()
            .trajectories
            .get(&id)
            .and_then(|t| t.geometry.clone())
    }

    fn with_trajectory<R>(
        &self,
        id: TrajectoryId,
        f: impl FnOnce(&mut StoredTrajectory) -> R,
    ) -> Result<R, StorageError> {
        let mut inner = self.lock();
        let stored = inner
            .trajectories
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;
        Ok(f(stored))
    }
}

#[async_trait]
impl TrajectoryStore for InMemoryStore {
    async fn create_trajectory(
        &self,
        header: &TrajectoryHeader,
    ) -> Result<TrajectoryId, StorageError> {
        let mut inner = self.lock();
        if inner.failures.header {
            return Err(StorageError::Rejected("header insert refused".to_string()));
        }
        inner.next_id += 1;
        let id = TrajectoryId(inner.next_id);
        inner.trajectories.insert(
            id,
            StoredTrajectory {
                header: header.clone(),
                points: Vec::new(),
                observations: Vec::new(),
                geometry: None,
                danger_index: None,
            },
        );
        Ok(id)
    }

    async fn add_trajectory_point(
        &self,
        id: TrajectoryId,
        point: &TrajectoryPoint,
    ) -> Result<(), StorageError> {
        if self.lock().failures.points.contains(&point.local_id) {
            return Err(StorageError::Timeout);
        }
        self.with_trajectory(id, |t| t.points.push(point.clone()))
    }

    async fn add_hazard_observation(
        &self,
        id: TrajectoryId,
        observation: &HazardObservation,
    ) -> Result<(), StorageError> {
        if self
            .lock()
            .failures
            .observations
            .contains(&observation.local_id)
        {
            return Err(StorageError::Timeout);
        }
        self.with_trajectory(id, |t| t.observations.push(observation.clone()))
    }

    async fn update_trajectory_geometry(
        &self,
        id: TrajectoryId,
        line: &[LatLng],
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.lock().failures.geometry {
            return Err(StorageError::Rejected("geometry update refused".to_string()));
        }
        if line.len() < 2 {
            return Err(StorageError::Rejected(
                "a line needs at least 2 vertices".to_string(),
            ));
        }
        self.with_trajectory(id, |t| {
            t.geometry = Some(line.to_vec());
            t.header.ended_at = Some(ended_at);
        })
    }

    async fn update_trajectory_end(
        &self,
        id: TrajectoryId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.with_trajectory(id, |t| t.header.ended_at = Some(ended_at))
    }

    async fn list_user_trajectories(
        &self,
        user_id: &str,
    ) -> Result<Vec<Trajectory>, StorageError> {
        Ok(self
            .lock()
            .trajectories
            .iter()
            .filter(|(_, t)| t.header.user_id == user_id)
            .map(|(id, t)| t.to_trajectory(*id))
            .collect())
    }

    async fn get_trajectory_detail(&self, id: TrajectoryId) -> Result<Trajectory, StorageError> {
        self.with_trajectory(id, |t| t.to_trajectory(id))
    }

    async fn compute_and_cache_danger_index(&self, id: TrajectoryId) -> Result<(), StorageError> {
        self.with_trajectory(id, |t| {
            t.danger_index = compute_index(&t.observations);
        })
    }

    async fn get_danger_index(&self, id: TrajectoryId) -> Result<Option<f64>, StorageError> {
        self.with_trajectory(id, |t| t.danger_index)
    }

    async fn get_population_average(&self) -> Result<PopulationAverage, StorageError> {
        let indices: Vec<Option<f64>> = self
            .lock()
            .trajectories
            .values()
            .map(|t| t.danger_index)
            .collect();
        Ok(compute_average(&indices))
    }

    async fn heatmap_points(&self) -> Result<Vec<HeatPoint>, StorageError> {
        let inner = self.lock();
        let mut points = inner.heat_points.clone();
        // Committed observations feed the heatmap like past reports
        points.extend(inner.trajectories.values().flat_map(|t| {
            t.observations.iter().map(|o| HeatPoint {
                lat: o.latitude,
                lon: o.longitude,
                weight: o.severity as f64,
            })
        }));
        Ok(points)
    }
}
