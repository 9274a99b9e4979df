// src/analytics/danger_index.rs

use crate::types::{HazardObservation, PopulationAverage};

/// Mean severity (0..=4) of a trajectory's observations.
///
/// Returns `None` for a trajectory without observations so it does not
/// bias the population average towards zero.
pub fn compute_index(observations: &[HazardObservation]) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    let total: f64 = observations.iter().map(|o| o.severity as f64).sum();
    Some(total / observations.len() as f64)
}

/// Arithmetic mean over the trajectories that have an index.
pub fn compute_average(indices: &[Option<f64>]) -> PopulationAverage {
    let defined: Vec<f64> = indices.iter().flatten().copied().collect();
    let count = defined.len();
    let average = if count == 0 {
        None
    } else {
        Some(defined.iter().sum::<f64>() / count as f64)
    };
    PopulationAverage { count, average }
}
