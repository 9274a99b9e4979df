// src/analytics/coverage.rs
//
// Share of a trajectory's points inside the project perimeter. History
// views only surface trajectories at or above the configured threshold.

use crate::geofence::Perimeter;
use crate::types::{Trajectory, TrajectoryPoint};

/// Observed admission threshold of the history view, in percent.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 90.0;

/// Percentage (0..=100) of `points` inside `perimeter`. Zero points → 0.
pub fn percent_inside(points: &[TrajectoryPoint], perimeter: &Perimeter) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let inside = points
        .iter()
        .filter(|p| perimeter.contains(p.coordinate()))
        .count();
    inside as f64 * 100.0 / points.len() as f64
}

pub struct CoverageFilter {
    perimeter: Option<Perimeter>,
    threshold_percent: f64,
}

impl CoverageFilter {
    pub fn new(perimeter: Option<Perimeter>, threshold_percent: f64) -> Self {
        Self {
            perimeter,
            threshold_percent,
        }
    }

    /// `None` when no perimeter is loaded.
    pub fn coverage(&self, trajectory: &Trajectory) -> Option<f64> {
        self.perimeter
            .as_ref()
            .map(|p| percent_inside(&trajectory.points, p))
    }

    /// Without a perimeter the filter does not apply and every trajectory
    /// is admitted. An empty trajectory is never admitted.
    pub fn admits(&self, trajectory: &Trajectory) -> bool {
        if trajectory.points.is_empty() {
            return false;
        }
        match self.coverage(trajectory) {
            Some(percent) => percent >= self.threshold_percent,
            None => true,
        }
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::predicate::tests::square;
    use crate::types::LocalId;
    use chrono::Utc;

    fn points(inside: usize, outside: usize) -> Vec<TrajectoryPoint> {
        let now = Utc::now();
        (0..inside + outside)
            .map(|i| TrajectoryPoint {
                latitude: if i < inside { 47.5 } else { 49.0 },
                longitude: 8.5,
                captured_at: now,
                local_id: LocalId(i as u64),
            })
            .collect()
    }

    fn perimeter() -> Perimeter {
        Perimeter::new(square(8.0, 47.0, 1.0))
    }

    fn trajectory(inside: usize, outside: usize) -> Trajectory {
        let mut t = Trajectory::new(Utc::now());
        t.points = points(inside, outside);
        t
    }

    #[test]
    fn test_nine_of_ten_is_ninety_percent() {
        assert_eq!(percent_inside(&points(9, 1), &perimeter()), 90.0);
    }

    #[test]
    fn test_no_points_is_zero() {
        assert_eq!(percent_inside(&[], &perimeter()), 0.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let filter = CoverageFilter::new(Some(perimeter()), DEFAULT_THRESHOLD_PERCENT);
        assert!(filter.admits(&trajectory(9, 1)));
        assert!(!filter.admits(&trajectory(8, 2)));
        assert!(!filter.admits(&trajectory(0, 0)));
    }

    #[test]
    fn test_missing_perimeter_admits_non_empty() {
        let filter = CoverageFilter::new(None, DEFAULT_THRESHOLD_PERCENT);
        assert!(filter.admits(&trajectory(0, 3)));
        assert!(filter.coverage(&trajectory(0, 3)).is_none());
        assert!(!filter.admits(&trajectory(0, 0)));
    }
}
