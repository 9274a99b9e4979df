// src/recording/session.rs
//
// Trajectory recording state machine.
//
//   Idle ──start──► Recording ──stop──► Stopped ──discard──► Idle
//                       ▲                  │ ──commit ok──► Idle
//                       └────continue──────┘ (commit failure stays Stopped)
//
// Raw positions move the cursor and drive zone membership. Only the
// snapshot timer and the session boundaries (initial fix on start, last
// known position on stop) durably sample a point, so stored volume is
// bounded by the timer, not by sensor cadence.

use super::buffer::TrajectoryBuffer;
use super::event_bus::{EventBus, SessionEvent};
use crate::commit::{CommitCoordinator, CommitReport, RecorderMetrics};
use crate::error::{SensorError, SessionError};
use crate::geofence::{BufferMembershipState, BufferMembershipTracker, ZoneSet, ZoneTransition};
use crate::types::{HazardObservation, LatLng, ObservationDraft, Position, Trajectory, TrajectoryPoint};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    /// Recording ended; waiting for discard, commit or continue
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Recording => "RECORDING",
            Self::Stopped => "STOPPED",
        }
    }
}

pub struct RecordingSession {
    session_id: Uuid,
    state: SessionState,
    tracker: BufferMembershipTracker,
    buffer: Option<TrajectoryBuffer>,
    last_position: Option<Position>,
    events: EventBus,
    metrics: RecorderMetrics,
}

impl RecordingSession {
    pub fn new(zones: Arc<ZoneSet>, event_capacity: usize, metrics: RecorderMetrics) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Idle,
            tracker: BufferMembershipTracker::new(zones),
            buffer: None,
            last_position: None,
            events: EventBus::new(event_capacity),
            metrics,
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.state.as_str(),
        }
    }

    /// Begin a new trajectory. `initial_fix` is the one-shot position taken
    /// at start; when present it becomes the first durable point.
    pub fn start(
        &mut self,
        now: DateTime<Utc>,
        initial_fix: Option<Position>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start"));
        }

        self.session_id = Uuid::new_v4();
        self.tracker.reset();
        self.last_position = initial_fix;
        self.buffer = Some(TrajectoryBuffer::new(now));
        self.state = SessionState::Recording;

        if let Some(fix) = initial_fix {
            self.sample(fix.coordinate(), fix.captured_at);
        }

        info!(
            "🟢 Recording {} started at {} ({} zone(s) armed)",
            self.session_id,
            now,
            self.tracker.zone_count()
        );
        self.events.status("Tracking started …");
        Ok(())
    }

    /// Raw sensor update. Dropped unless recording.
    pub fn on_position(&mut self, position: Position) -> ZoneTransition {
        if self.state != SessionState::Recording {
            debug!(
                "Ignoring position delivered while {}",
                self.state.as_str()
            );
            return ZoneTransition::Unchanged;
        }

        let at = position.coordinate();
        self.last_position = Some(position);
        self.events.publish(SessionEvent::CursorMoved {
            at,
            accuracy: position.accuracy,
        });
        self.events.status(format!(
            "Last position: {} (±{} m)",
            at,
            position.accuracy.round()
        ));

        let transition = self.tracker.evaluate(at);
        match transition {
            ZoneTransition::Entered(zone_index) => {
                info!("⚠️  Entered hazard zone {} at {}", zone_index, at);
                self.metrics.inc(&self.metrics.zone_entries);
                self.events
                    .publish(SessionEvent::PromptRequested { zone_index, at });
            }
            ZoneTransition::Left => {
                debug!("Left hazard zone at {}", at);
                self.events.publish(SessionEvent::PromptDismissed);
            }
            ZoneTransition::Unchanged => {}
        }
        transition
    }

    /// Periodic sampler. Appends a point from the last known position, if any.
    pub fn on_snapshot_tick(&mut self, now: DateTime<Utc>) -> Option<TrajectoryPoint> {
        if self.state != SessionState::Recording {
            return None;
        }
        let position = self.last_position?;
        self.sample(position.coordinate(), now)
    }

    fn sample(&mut self, at: LatLng, captured_at: DateTime<Utc>) -> Option<TrajectoryPoint> {
        let buffer = self.buffer.as_mut()?;
        let point = TrajectoryPoint {
            latitude: at.latitude,
            longitude: at.longitude,
            captured_at,
            local_id: buffer.next_local_id(),
        };
        if !buffer.append_point(point.clone()) {
            return None;
        }
        debug!("📍 Sampled point {} ({} total)", at, buffer.point_count());
        self.metrics.inc(&self.metrics.points_sampled);
        self.events.publish(SessionEvent::PointSampled(point.clone()));
        Some(point)
    }

    /// End recording. The buffer is kept until discard or a successful commit.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            return Err(self.invalid("stop"));
        }

        if let Some(last) = self.last_position {
            self.sample(last.coordinate(), now);
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.finalize(now);
            info!(
                "🔴 Recording {} stopped: {} point(s), {} observation(s)",
                self.session_id,
                buffer.point_count(),
                buffer.observation_count()
            );
        }
        self.state = SessionState::Stopped;
        self.events
            .status("Tracking stopped. The recorded trajectory stays visible.");
        Ok(())
    }

    /// Resume the same trajectory. Buffer and zone state are kept.
    pub fn continue_recording(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Stopped {
            return Err(self.invalid("continue"));
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.reopen();
        }
        self.state = SessionState::Recording;
        info!("🟢 Recording {} resumed", self.session_id);
        self.events.status("Tracking resumed …");
        Ok(())
    }

    pub fn discard(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Stopped {
            return Err(self.invalid("discard"));
        }
        if let Some(mut buffer) = self.buffer.take() {
            info!(
                "🗑️  Recording {} discarded ({} point(s) dropped)",
                self.session_id,
                buffer.point_count()
            );
            buffer.clear();
        }
        self.state = SessionState::Idle;
        self.events.status("Trajectory discarded.");
        Ok(())
    }

    /// Hand the finalized trajectory to the coordinator. The buffer is only
    /// released on success; a fatal commit failure leaves the session Stopped.
    pub async fn commit(
        &mut self,
        coordinator: &CommitCoordinator,
    ) -> Result<CommitReport, SessionError> {
        if self.state != SessionState::Stopped {
            return Err(self.invalid("commit"));
        }
        let snapshot = match self.buffer.as_ref() {
            Some(buffer) => buffer.snapshot(),
            None => return Err(SessionError::NoActiveTrajectory),
        };

        match coordinator.commit(&snapshot).await {
            Ok(report) => {
                self.buffer = None;
                self.state = SessionState::Idle;
                self.events.status(format!(
                    "Trajectory saved as {}",
                    report.trajectory_id
                ));
                self.events
                    .publish(SessionEvent::CommitSucceeded(report.clone()));
                Ok(report)
            }
            Err(e) => {
                error!(
                    "❌ Commit of recording {} failed, buffer kept: {}",
                    self.session_id, e
                );
                self.events.publish(SessionEvent::CommitFailed {
                    reason: e.to_string(),
                });
                self.events
                    .status("Saving failed. Retry or discard the trajectory.");
                Err(e.into())
            }
        }
    }

    /// Record an operator hazard observation at the last known position, or
    /// at `fallback` when no position has been seen yet.
    pub fn append_observation(
        &mut self,
        description: &str,
        severity: i64,
        fallback: LatLng,
        now: DateTime<Utc>,
    ) -> Result<HazardObservation, SessionError> {
        if self.state != SessionState::Recording {
            self.events.status("No active trajectory.");
            return Err(SessionError::NoActiveTrajectory);
        }
        let buffer = self
            .buffer
            .as_mut()
            .ok_or(SessionError::NoActiveTrajectory)?;

        let location = self
            .last_position
            .map(|p| p.coordinate())
            .unwrap_or(fallback);
        let draft = ObservationDraft {
            location,
            captured_at: now,
            local_id: buffer.next_local_id(),
            description: description.to_string(),
            severity,
        };

        match buffer.append_observation(draft) {
            Ok(observation) => {
                info!(
                    "📝 Hazard observation at {} (level {}): {}",
                    location, observation.severity, observation.description
                );
                self.metrics.inc(&self.metrics.observations_recorded);
                self.events.status(format!(
                    "Hazard saved (level {})",
                    observation.severity
                ));
                self.events
                    .publish(SessionEvent::ObservationRecorded(observation.clone()));
                Ok(observation)
            }
            Err(e) => {
                debug!("Rejected observation: {}", e);
                self.events.status(match e {
                    crate::error::ValidationError::EmptyDescription => {
                        "Please enter a description.".to_string()
                    }
                    crate::error::ValidationError::SeverityOutOfRange(_) => {
                        "Please enter a level between 0 and 4.".to_string()
                    }
                    crate::error::ValidationError::DuplicateLocalId(_) => {
                        "Hazard already saved.".to_string()
                    }
                });
                Err(e.into())
            }
        }
    }

    /// Sensor loss ends tracking. A recording in progress is stopped so its
    /// buffer survives for commit or discard.
    pub fn sensor_failed(&mut self, error: SensorError, now: DateTime<Utc>) {
        warn!("🛰️  Sensor failure during {}: {}", self.state.as_str(), error);
        if self.state == SessionState::Recording {
            // stop() cannot fail from Recording
            let _ = self.stop(now);
        }
        self.events.status(format!("GPS error: {}", error));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last_position
    }

    pub fn membership(&self) -> BufferMembershipState {
        self.tracker.state()
    }

    /// Read-only copy of the in-progress or stopped trajectory.
    pub fn snapshot(&self) -> Option<Trajectory> {
        self.buffer.as_ref().map(|b| b.snapshot())
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::predicate::tests::square;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::TrajectoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    fn pos(lat: f64, lon: f64, secs: i64) -> Position {
        Position {
            latitude: lat,
            longitude: lon,
            accuracy: 5.0,
            captured_at: t0() + Duration::seconds(secs),
        }
    }

    fn session() -> RecordingSession {
        let zones = ZoneSet::new(vec![square(8.50, 47.30, 0.01)]);
        RecordingSession::new(Arc::new(zones), 64, RecorderMetrics::new())
    }

    fn coordinator(store: Arc<InMemoryStore>) -> CommitCoordinator {
        CommitCoordinator::new(store, "surveyor-1", RecorderMetrics::new())
    }

    #[test]
    fn test_sampling_boundaries_and_timer() {
        let mut s = session();
        s.start(t0(), Some(pos(47.0, 8.0, 0))).unwrap();

        s.on_position(pos(47.001, 8.0, 2));
        s.on_position(pos(47.002, 8.0, 4));
        s.on_position(pos(47.003, 8.0, 6));
        s.on_snapshot_tick(t0() + Duration::seconds(8));
        s.on_snapshot_tick(t0() + Duration::seconds(16));
        s.stop(t0() + Duration::seconds(20)).unwrap();

        let trajectory = s.snapshot().unwrap();
        let lats: Vec<f64> = trajectory.points.iter().map(|p| p.latitude).collect();
        assert_eq!(lats, vec![47.0, 47.003, 47.003, 47.003]);
        assert_eq!(trajectory.points[0].captured_at, t0());
        assert_eq!(
            trajectory.points[3].captured_at,
            t0() + Duration::seconds(20)
        );
        assert_eq!(trajectory.ended_at, Some(t0() + Duration::seconds(20)));
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn test_dense_feed_is_bounded_by_timer() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        for i in 0..100 {
            s.on_position(pos(47.0 + i as f64 * 1e-5, 8.0, i / 10));
        }
        s.on_snapshot_tick(t0() + Duration::seconds(8));
        s.stop(t0() + Duration::seconds(10)).unwrap();
        assert_eq!(s.snapshot().unwrap().points.len(), 2);
    }

    #[test]
    fn test_tick_without_position_samples_nothing() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        assert!(s.on_snapshot_tick(t0() + Duration::seconds(8)).is_none());
        s.stop(t0() + Duration::seconds(9)).unwrap();
        assert!(s.snapshot().unwrap().points.is_empty());
    }

    #[test]
    fn test_positions_after_stop_are_dropped() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        s.on_position(pos(47.0, 8.0, 1));
        s.stop(t0() + Duration::seconds(2)).unwrap();
        s.on_position(pos(48.0, 9.0, 3));
        assert_eq!(s.last_position().unwrap().latitude, 47.0);
        assert!(s.on_snapshot_tick(t0() + Duration::seconds(8)).is_none());
    }

    #[test]
    fn test_zone_prompt_events() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        s.drain_events();

        assert_eq!(
            s.on_position(pos(47.305, 8.505, 1)),
            ZoneTransition::Entered(0)
        );
        assert_eq!(
            s.on_position(pos(47.306, 8.506, 2)),
            ZoneTransition::Unchanged
        );
        assert_eq!(s.on_position(pos(47.2, 8.4, 3)), ZoneTransition::Left);

        let events = s.drain_events();
        let prompts = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PromptRequested { zone_index: 0, .. }))
            .count();
        let dismissals = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PromptDismissed))
            .count();
        assert_eq!(prompts, 1);
        assert_eq!(dismissals, 1);
    }

    #[test]
    fn test_new_recording_resets_zone_state() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        s.on_position(pos(47.305, 8.505, 1));
        s.stop(t0() + Duration::seconds(2)).unwrap();
        s.discard().unwrap();

        s.start(t0() + Duration::seconds(3), None).unwrap();
        assert_eq!(s.membership().current_zone_index, None);
        assert_eq!(
            s.on_position(pos(47.305, 8.505, 4)),
            ZoneTransition::Entered(0)
        );
    }

    #[test]
    fn test_continue_keeps_buffer_and_zone() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        s.on_position(pos(47.305, 8.505, 1));
        s.stop(t0() + Duration::seconds(2)).unwrap();
        s.continue_recording().unwrap();

        assert_eq!(s.state(), SessionState::Recording);
        assert_eq!(s.membership().current_zone_index, Some(0));
        let trajectory = s.snapshot().unwrap();
        assert_eq!(trajectory.points.len(), 1);
        assert!(trajectory.ended_at.is_none());
        assert_eq!(
            s.on_position(pos(47.306, 8.506, 3)),
            ZoneTransition::Unchanged
        );
    }

    #[test]
    fn test_observation_gating() {
        let mut s = session();
        let fallback = LatLng::new(47.3769, 8.5417);
        assert!(matches!(
            s.append_observation("pothole", 2, fallback, t0()),
            Err(SessionError::NoActiveTrajectory)
        ));

        s.start(t0(), None).unwrap();
        let obs = s.append_observation("pothole", 2, fallback, t0()).unwrap();
        assert_eq!(obs.coordinate(), fallback);

        s.on_position(pos(47.1, 8.1, 5));
        let obs = s
            .append_observation("tram rails", 3, fallback, t0() + Duration::seconds(6))
            .unwrap();
        assert_eq!(obs.coordinate(), LatLng::new(47.1, 8.1));

        assert!(matches!(
            s.append_observation("", 3, fallback, t0()),
            Err(SessionError::Validation(_))
        ));

        s.stop(t0() + Duration::seconds(7)).unwrap();
        assert!(matches!(
            s.append_observation("late", 1, fallback, t0()),
            Err(SessionError::NoActiveTrajectory)
        ));
        assert_eq!(s.snapshot().unwrap().observations.len(), 2);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut s = session();
        assert!(s.stop(t0()).is_err());
        assert!(s.discard().is_err());
        assert!(s.continue_recording().is_err());
        s.start(t0(), None).unwrap();
        assert!(s.start(t0(), None).is_err());
        assert!(s.discard().is_err());
    }

    #[test]
    fn test_sensor_failure_stops_and_keeps_buffer() {
        let mut s = session();
        s.start(t0(), None).unwrap();
        s.on_position(pos(47.0, 8.0, 1));
        s.sensor_failed(SensorError::TimedOut, t0() + Duration::seconds(2));

        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(s.snapshot().unwrap().points.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_success_returns_to_idle() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = coordinator(store.clone());
        let mut s = session();

        s.start(t0(), Some(pos(47.0, 8.0, 0))).unwrap();
        s.on_position(pos(47.01, 8.0, 3));
        s.append_observation("crossing", 3, LatLng::new(0.0, 0.0), t0())
            .unwrap();
        s.stop(t0() + Duration::seconds(5)).unwrap();

        let report = s.commit(&coordinator).await.unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.snapshot().is_none());

        let stored = store.get_trajectory_detail(report.trajectory_id).await.unwrap();
        assert_eq!(stored.points.len(), 2);
        assert_eq!(stored.observations.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_stays_stopped() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_header_creation(true);
        let coordinator = coordinator(store.clone());
        let mut s = session();

        s.start(t0(), Some(pos(47.0, 8.0, 0))).unwrap();
        s.stop(t0() + Duration::seconds(5)).unwrap();

        assert!(matches!(
            s.commit(&coordinator).await,
            Err(SessionError::Commit(_))
        ));
        assert_eq!(s.state(), SessionState::Stopped);
        // initial fix plus the final point sampled on stop
        assert_eq!(s.snapshot().unwrap().points.len(), 2);

        store.fail_header_creation(false);
        assert!(s.commit(&coordinator).await.is_ok());
        assert_eq!(s.state(), SessionState::Idle);
    }
}
