// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub sources: SourcesConfig,
    pub analytics: AnalyticsConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Owner stamped on every trajectory header
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Period of the durable point sampler, independent of sensor cadence
    pub snapshot_interval_secs: u64,
    pub event_bus_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// GeoJSON FeatureCollection of hazard buffer polygons (path or URL)
    pub zones: Option<String>,
    /// GeoJSON FeatureCollection whose first feature is the project perimeter
    pub perimeter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub coverage_threshold_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub input_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// COORDINATES & POSITIONS
// ============================================================================

/// WGS84 coordinate. Converted to `geo` with x = longitude, y = latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// A single fix from the positioning sensor. Copied on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    pub captured_at: DateTime<Utc>,
}

impl Position {
    pub fn coordinate(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Process-local token used to dedupe points and observations before commit.
/// Never a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u64);

/// Identifier assigned by storage when the trajectory header is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrajectoryId(pub i64);

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trajectory.{}", self.0)
    }
}

// ============================================================================
// TRAJECTORY RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub local_id: LocalId,
}

impl TrajectoryPoint {
    pub fn coordinate(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Operator input for a hazard observation before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDraft {
    pub location: LatLng,
    pub captured_at: DateTime<Utc>,
    pub local_id: LocalId,
    pub description: String,
    pub severity: i64,
}

/// A validated hazard observation: non-empty description, severity in 0..=4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardObservation {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub local_id: LocalId,
    pub description: String,
    pub severity: u8,
}

impl HazardObservation {
    pub fn coordinate(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Absent until committed
    pub id: Option<TrajectoryId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub points: Vec<TrajectoryPoint>,
    pub observations: Vec<HazardObservation>,
}

impl Trajectory {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            started_at,
            ended_at: None,
            points: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// Ordered coordinate sequence of the points, for line geometry.
    pub fn line(&self) -> Vec<LatLng> {
        self.points.iter().map(|p| p.coordinate()).collect()
    }
}

/// Header record sent when a trajectory is first persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryHeader {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub user_id: String,
}

// ============================================================================
// ANALYTICS VIEWS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DangerIndexRecord {
    pub trajectory_id: TrajectoryId,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationAverage {
    pub count: usize,
    /// Absent when `count == 0`
    pub average: Option<f64>,
}

/// A past hazard report used for the heatmap; `weight` is its severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
}
