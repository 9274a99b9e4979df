// src/storage/mod.rs
//
// Typed request/response contract of the persistent store. The engine only
// depends on these operations; wire encoding lives in the implementations.

pub mod http;
pub mod memory;

use crate::error::StorageError;
use crate::types::{
    HazardObservation, HeatPoint, LatLng, PopulationAverage, Trajectory, TrajectoryHeader,
    TrajectoryId, TrajectoryPoint,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use http::HttpStore;
pub use memory::InMemoryStore;

#[async_trait]
pub trait TrajectoryStore: Send + Sync {
    async fn create_trajectory(&self, header: &TrajectoryHeader)
        -> Result<TrajectoryId, StorageError>;

    async fn add_trajectory_point(
        &self,
        id: TrajectoryId,
        point: &TrajectoryPoint,
    ) -> Result<(), StorageError>;

    async fn add_hazard_observation(
        &self,
        id: TrajectoryId,
        observation: &HazardObservation,
    ) -> Result<(), StorageError>;

    /// Write the line geometry together with the end time.
    async fn update_trajectory_geometry(
        &self,
        id: TrajectoryId,
        line: &[LatLng],
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn update_trajectory_end(
        &self,
        id: TrajectoryId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn list_user_trajectories(&self, user_id: &str)
        -> Result<Vec<Trajectory>, StorageError>;

    async fn get_trajectory_detail(&self, id: TrajectoryId) -> Result<Trajectory, StorageError>;

    async fn compute_and_cache_danger_index(&self, id: TrajectoryId) -> Result<(), StorageError>;

    /// `None` when the trajectory has no observations.
    async fn get_danger_index(&self, id: TrajectoryId) -> Result<Option<f64>, StorageError>;

    async fn get_population_average(&self) -> Result<PopulationAverage, StorageError>;

    async fn heatmap_points(&self) -> Result<Vec<HeatPoint>, StorageError>;
}
