// src/commit/mod.rs

pub mod coordinator;
pub mod metrics;

pub use coordinator::{CommitCoordinator, CommitReport, GeometryOutcome};
pub use metrics::{MetricsSummary, RecorderMetrics};
