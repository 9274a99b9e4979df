// src/geofence/membership.rs
//
// Turns a stream of positions into zone entry/exit transitions.
//
// A direct zone-to-zone move (A → B without an outside reading in between)
// emits only Entered(B). No separate Left is emitted for A.

use super::predicate::ZoneSet;
use crate::types::LatLng;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferMembershipState {
    pub current_zone_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTransition {
    /// Open one hazard prompt for this zone visit
    Entered(usize),
    /// Dismiss any open prompt without operator input
    Left,
    Unchanged,
}

pub struct BufferMembershipTracker {
    zones: Arc<ZoneSet>,
    state: BufferMembershipState,
}

impl BufferMembershipTracker {
    pub fn new(zones: Arc<ZoneSet>) -> Self {
        Self {
            zones,
            state: BufferMembershipState::default(),
        }
    }

    pub fn evaluate(&mut self, point: LatLng) -> ZoneTransition {
        let new_zone = self.zones.contains(point);

        match (new_zone, self.state.current_zone_index) {
            (None, Some(previous)) => {
                debug!("Left hazard zone {}", previous);
                self.state.current_zone_index = None;
                ZoneTransition::Left
            }
            (Some(zone), current) if Some(zone) != current => {
                debug!("Entered hazard zone {} (from {:?})", zone, current);
                self.state.current_zone_index = Some(zone);
                ZoneTransition::Entered(zone)
            }
            _ => ZoneTransition::Unchanged,
        }
    }

    /// Must be called at the start of every recording, otherwise a stale
    /// zone suppresses the first prompt of the new trajectory.
    pub fn reset(&mut self) {
        self.state = BufferMembershipState::default();
    }

    pub fn state(&self) -> BufferMembershipState {
        self.state
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}
