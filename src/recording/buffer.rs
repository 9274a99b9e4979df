// src/recording/buffer.rs
//
// Local accumulation of the in-progress trajectory. Last integrity gate
// before commit: observations are validated here, not only by the shell.
//
// No size bound is imposed. A very long recording grows memory linearly.

use crate::error::ValidationError;
use crate::types::{HazardObservation, LocalId, ObservationDraft, Trajectory, TrajectoryPoint};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

pub const MIN_SEVERITY: i64 = 0;
pub const MAX_SEVERITY: i64 = 4;

pub struct TrajectoryBuffer {
    trajectory: Trajectory,
    seen: HashSet<LocalId>,
    next_local_id: u64,
}

impl TrajectoryBuffer {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            trajectory: Trajectory::new(started_at),
            seen: HashSet::new(),
            next_local_id: 0,
        }
    }

    /// Fresh process-local token for a point or observation of this buffer.
    pub fn next_local_id(&mut self) -> LocalId {
        let id = LocalId(self.next_local_id);
        self.next_local_id += 1;
        id
    }

    /// Append in capture order. Returns false for a duplicate local id.
    pub fn append_point(&mut self, point: TrajectoryPoint) -> bool {
        if !self.seen.insert(point.local_id) {
            debug!("Dropping duplicate point {:?}", point.local_id);
            return false;
        }
        self.trajectory.points.push(point);
        true
    }

    /// Validate and append. A duplicate local id is rejected, not re-stored.
    pub fn append_observation(
        &mut self,
        draft: ObservationDraft,
    ) -> Result<HazardObservation, ValidationError> {
        let description = draft.description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&draft.severity) {
            return Err(ValidationError::SeverityOutOfRange(draft.severity));
        }

        let observation = HazardObservation {
            latitude: draft.location.latitude,
            longitude: draft.location.longitude,
            captured_at: draft.captured_at,
            local_id: draft.local_id,
            description: description.to_string(),
            severity: draft.severity.clamp(MIN_SEVERITY, MAX_SEVERITY) as u8,
        };

        if !self.seen.insert(observation.local_id) {
            debug!("Dropping duplicate observation {:?}", observation.local_id);
            return Err(ValidationError::DuplicateLocalId(observation.local_id));
        }
        self.trajectory.observations.push(observation.clone());
        Ok(observation)
    }

    pub fn finalize(&mut self, ended_at: DateTime<Utc>) {
        self.trajectory.ended_at = Some(ended_at);
    }

    /// Reopen a finalized buffer when recording continues.
    pub fn reopen(&mut self) {
        self.trajectory.ended_at = None;
    }

    pub fn snapshot(&self) -> Trajectory {
        self.trajectory.clone()
    }

    pub fn clear(&mut self) {
        self.trajectory.points.clear();
        self.trajectory.observations.clear();
        self.trajectory.ended_at = None;
        self.seen.clear();
    }

    pub fn point_count(&self) -> usize {
        self.trajectory.points.len()
    }

    pub fn observation_count(&self) -> usize {
        self.trajectory.observations.len()
    }

    pub fn last_point(&self) -> Option<&TrajectoryPoint> {
        self.trajectory.points.last()
    }
}
