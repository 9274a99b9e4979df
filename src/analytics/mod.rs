// src/analytics/mod.rs
//
// Read-side computations over persisted trajectories:
//   coverage     → share of points inside the project perimeter
//   danger_index → mean observation severity and population average
//   heatmap      → past hazard reports prepared for display
//   history      → admitted trajectories with their danger context

pub mod coverage;
pub mod danger_index;
pub mod heatmap;
pub mod history;

pub use coverage::{percent_inside, CoverageFilter};
pub use danger_index::{compute_average, compute_index};
pub use heatmap::{prepare_heatmap, HeatSample};
pub use history::{build_history, HistoryEntry, HistoryReport};
