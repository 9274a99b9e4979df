// src/geofence/sources.rs
//
// Loads hazard buffer zones and the project perimeter from GeoJSON.
// A source is either a filesystem path or an http(s) URL. Coordinates are
// WGS84 in [lon, lat] order. Feature order defines the zone index.

use super::predicate::{Perimeter, ZoneSet};
use crate::error::SourceError;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
    #[serde(other)]
    Unsupported,
}

fn ring(coords: &[[f64; 2]]) -> LineString<f64> {
    LineString::new(coords.iter().map(|c| Coord { x: c[0], y: c[1] }).collect())
}

fn polygon(rings: &[Vec<[f64; 2]>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        ring(exterior),
        interiors.iter().map(|r| ring(r)).collect(),
    ))
}

impl Geometry {
    fn into_multi_polygon(self) -> Option<MultiPolygon<f64>> {
        match self {
            Geometry::Polygon { coordinates } => {
                polygon(&coordinates).map(|p| MultiPolygon::new(vec![p]))
            }
            Geometry::MultiPolygon { coordinates } => {
                let polys: Vec<Polygon<f64>> =
                    coordinates.iter().filter_map(|rings| polygon(rings)).collect();
                if polys.is_empty() {
                    None
                } else {
                    Some(MultiPolygon::new(polys))
                }
            }
            Geometry::Unsupported => None,
        }
    }
}

/// Parse every polygonal feature, in order. Non-polygonal features are skipped.
pub fn parse_polygons(geojson: &str) -> Result<Vec<MultiPolygon<f64>>, SourceError> {
    let collection: FeatureCollection = serde_json::from_str(geojson)?;
    let total = collection.features.len();

    let polygons: Vec<MultiPolygon<f64>> = collection
        .features
        .into_iter()
        .filter_map(|f| f.geometry)
        .filter_map(Geometry::into_multi_polygon)
        .collect();

    if polygons.len() < total {
        warn!(
            "Skipped {} feature(s) without polygon geometry",
            total - polygons.len()
        );
    }
    Ok(polygons)
}

async fn read_source(source: &str, timeout: Duration) -> Result<String, SourceError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let http = |e| SourceError::Http {
            url: source.to_string(),
            source: e,
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(http)?;
        let response = client
            .get(source)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http)?;
        response.text().await.map_err(http)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| SourceError::Io {
                path: source.to_string(),
                source: e,
            })
    }
}

pub async fn load_zones(source: &str, timeout: Duration) -> Result<ZoneSet, SourceError> {
    let body = read_source(source, timeout).await?;
    let polygons = parse_polygons(&body)?;
    info!("✅ {} hazard buffer zone(s) loaded", polygons.len());
    Ok(ZoneSet::new(polygons))
}

pub async fn load_perimeter(source: &str, timeout: Duration) -> Result<Perimeter, SourceError> {
    let body = read_source(source, timeout).await?;
    let first = parse_polygons(&body)?
        .into_iter()
        .next()
        .ok_or(SourceError::Empty)?;
    info!("Perimeter loaded from {}", source);
    Ok(Perimeter::new(first))
}

/// Zone load that degrades to an empty set: prompts never trigger.
pub async fn load_zones_or_empty(source: Option<&str>, timeout: Duration) -> ZoneSet {
    let Some(source) = source else {
        warn!("No hazard zone source configured; geofence prompts disabled");
        return ZoneSet::empty();
    };
    match load_zones(source, timeout).await {
        Ok(zones) => zones,
        Err(e) => {
            warn!("❌ Failed to load hazard zones: {}", e);
            ZoneSet::empty()
        }
    }
}

/// Perimeter load that degrades to absent: coverage filtering is skipped.
pub async fn load_perimeter_or_none(source: Option<&str>, timeout: Duration) -> Option<Perimeter> {
    let source = source?;
    match load_perimeter(source, timeout).await {
        Ok(perimeter) => Some(perimeter),
        Err(e) => {
            warn!("❌ Failed to load perimeter: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LatLng;
    use std::io::Write;

    const ZONES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates": [[[8.0,47.0],[8.1,47.0],[8.1,47.1],[8.0,47.1],[8.0,47.0]]]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Point", "coordinates": [8.5, 47.5]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[9.0,47.0],[9.1,47.0],[9.1,47.1],[9.0,47.1],[9.0,47.0]]],
                [[[9.5,47.0],[9.6,47.0],[9.6,47.1],[9.5,47.1],[9.5,47.0]]]
             ]}}
        ]
    }"#;

    #[test]
    fn test_parse_skips_non_polygons() {
        let polys = parse_polygons(ZONES).unwrap();
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[1].0.len(), 2);
    }

    #[test]
    fn test_zone_indices_follow_feature_order() {
        let zones = ZoneSet::new(parse_polygons(ZONES).unwrap());
        assert_eq!(zones.contains(LatLng::new(47.05, 8.05)), Some(0));
        assert_eq!(zones.contains(LatLng::new(47.05, 9.55)), Some(1));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(
            parse_polygons("not json"),
            Err(SourceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_zones_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ZONES.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let zones = load_zones(&path, Duration::from_secs(1)).await.unwrap();
        assert_eq!(zones.len(), 2);

        let perimeter = load_perimeter(&path, Duration::from_secs(1)).await.unwrap();
        assert!(perimeter.contains(LatLng::new(47.05, 8.05)));
    }

    #[tokio::test]
    async fn test_missing_sources_degrade() {
        let zones = load_zones_or_empty(Some("/nonexistent/buffers.geojson"), Duration::from_secs(1)).await;
        assert!(zones.is_empty());

        let perimeter =
            load_perimeter_or_none(Some("/nonexistent/area.geojson"), Duration::from_secs(1)).await;
        assert!(perimeter.is_none());
        assert!(load_perimeter_or_none(None, Duration::from_secs(1)).await.is_none());
    }
}
