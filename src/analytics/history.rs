// src/analytics/history.rs
//
// History view: a user's committed trajectories that pass the coverage
// filter, each with its danger index next to the population average.

use super::coverage::CoverageFilter;
use crate::error::StorageError;
use crate::storage::TrajectoryStore;
use crate::types::{DangerIndexRecord, PopulationAverage, TrajectoryId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub trajectory_id: TrajectoryId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub point_count: usize,
    pub observation_count: usize,
    /// `None` when no perimeter is loaded
    pub coverage_percent: Option<f64>,
    /// `None` when the trajectory has no observations
    pub danger_index: Option<DangerIndexRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub entries: Vec<HistoryEntry>,
    pub excluded: usize,
    pub population: PopulationAverage,
}

impl HistoryEntry {
    /// Index relative to the population average; `None` if either is absent.
    pub fn relative_to(&self, population: &PopulationAverage) -> Option<f64> {
        let index = self.danger_index?.value;
        let average = population.average?;
        Some(index - average)
    }
}

pub async fn build_history(
    store: &dyn TrajectoryStore,
    user_id: &str,
    filter: &CoverageFilter,
) -> Result<HistoryReport, StorageError> {
    let trajectories = store.list_user_trajectories(user_id).await?;
    let total = trajectories.len();
    let mut entries = Vec::new();

    for trajectory in trajectories {
        let Some(id) = trajectory.id else {
            warn!("Skipping stored trajectory without id");
            continue;
        };
        if !filter.admits(&trajectory) {
            debug!(
                "{} excluded: coverage {:?} below {:.0}%",
                id,
                filter.coverage(&trajectory),
                filter.threshold_percent()
            );
            continue;
        }

        let danger_index = store
            .get_danger_index(id)
            .await?
            .map(|value| DangerIndexRecord {
                trajectory_id: id,
                value,
            });

        entries.push(HistoryEntry {
            trajectory_id: id,
            started_at: trajectory.started_at,
            ended_at: trajectory.ended_at,
            point_count: trajectory.points.len(),
            observation_count: trajectory.observations.len(),
            coverage_percent: filter.coverage(&trajectory),
            danger_index,
        });
    }

    let population = store.get_population_average().await?;
    info!(
        "History for {}: {} of {} trajectories admitted",
        user_id,
        entries.len(),
        total
    );

    Ok(HistoryReport {
        excluded: total - entries.len(),
        entries,
        population,
    })
}
