// src/analytics/heatmap.rs
//
// Past hazard reports prepared for a heat layer: zero-weight reports are
// dropped, reports outside the perimeter are dropped when one is loaded,
// and severities 1..=4 become intensities in (0, 1].

use crate::geofence::Perimeter;
use crate::types::{HeatPoint, LatLng};
use serde::Serialize;
use tracing::debug;

pub const MAX_WEIGHT: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatSample {
    pub lat: f64,
    pub lon: f64,
    pub intensity: f64,
}

pub fn prepare_heatmap(points: &[HeatPoint], perimeter: Option<&Perimeter>) -> Vec<HeatSample> {
    let samples: Vec<HeatSample> = points
        .iter()
        .filter(|p| p.weight > 0.0)
        .filter(|p| perimeter.map_or(true, |area| area.contains(LatLng::new(p.lat, p.lon))))
        .map(|p| HeatSample {
            lat: p.lat,
            lon: p.lon,
            intensity: p.weight / MAX_WEIGHT,
        })
        .collect();

    debug!("Heatmap filtered: {} of {}", samples.len(), points.len());
    samples
}
