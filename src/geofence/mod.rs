// src/geofence/mod.rs
//
// Hazard zone geometry:
//   sources    → GeoJSON zones / perimeter
//   predicate  → first polygon containing a point
//   membership → Entered / Left / Unchanged per position

pub mod membership;
pub mod predicate;
pub mod sources;

pub use membership::{BufferMembershipState, BufferMembershipTracker, ZoneTransition};
pub use predicate::{first_containing, HazardBufferZone, Perimeter, ZoneSet};
pub use sources::{load_perimeter_or_none, load_zones_or_empty};
