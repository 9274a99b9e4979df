// src/recording/event_bus.rs
//
// Decoupled event channel from the session to the shell. The session
// publishes prompt and status events instead of touching presentation state.

use crate::commit::CommitReport;
use crate::types::{HazardObservation, LatLng, TrajectoryPoint};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Open one hazard-capture prompt for this zone visit.
    PromptRequested { zone_index: usize, at: LatLng },

    /// Dismiss the open prompt without operator input.
    PromptDismissed,

    /// Cursor update for every raw position, sampled or not.
    CursorMoved { at: LatLng, accuracy: f64 },

    PointSampled(TrajectoryPoint),

    ObservationRecorded(HazardObservation),

    CommitSucceeded(CommitReport),

    CommitFailed { reason: String },

    Status(String),
}

pub struct EventBus {
    events: VecDeque<SessionEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: SessionEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn status(&mut self, message: impl Into<String>) {
        self.publish(SessionEvent::Status(message.into()));
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        bus.status("one");
        bus.status("two");
        bus.status("three");
        assert_eq!(bus.pending_count(), 2);

        let drained = bus.drain();
        assert!(matches!(&drained[0], SessionEvent::Status(s) if s == "two"));
        assert!(matches!(&drained[1], SessionEvent::Status(s) if s == "three"));
        assert_eq!(bus.pending_count(), 0);
    }
}
