// src/lib.rs
//
// Geofenced trajectory recording engine.
//
//   sensor    → position fixes and subscriptions
//   geofence  → hazard zones, perimeter, zone entry/exit
//   recording → buffer, session state machine, live recorder
//   commit    → multi-step persistence with partial-failure reporting
//   storage   → store contract (in-memory and HTTP backends)
//   analytics → coverage filter, danger index, heatmap, history
//   replay    → track-log replay in simulated time

pub mod analytics;
pub mod commit;
pub mod config;
pub mod error;
pub mod geofence;
pub mod recording;
pub mod replay;
pub mod sensor;
pub mod storage;
pub mod types;

pub use types::Config;
