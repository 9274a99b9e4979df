// src/geofence/predicate.rs
//
// Point-in-polygon membership over the static polygon sets loaded at
// startup. Uses `geo::Contains`, which tests the interior only: a point on
// an edge is consistently reported as outside.

use crate::types::LatLng;
use geo::{Contains, MultiPolygon};

/// A pre-computed hazard cluster polygon.
///
/// `zone_index` is the position in the loaded list and is only meaningful
/// within one application session.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardBufferZone {
    pub zone_index: usize,
    pub polygon: MultiPolygon<f64>,
}

/// Index of the first polygon (in list order) whose interior contains `point`.
pub fn first_containing(polygons: &[MultiPolygon<f64>], point: LatLng) -> Option<usize> {
    let p = point.to_point();
    polygons.iter().position(|poly| poly.contains(&p))
}

/// Ordered set of hazard zones. Overlaps resolve to the lower index.
#[derive(Debug, Clone, Default)]
pub struct ZoneSet {
    zones: Vec<HazardBufferZone>,
}

impl ZoneSet {
    pub fn new(polygons: Vec<MultiPolygon<f64>>) -> Self {
        let zones = polygons
            .into_iter()
            .enumerate()
            .map(|(zone_index, polygon)| HazardBufferZone {
                zone_index,
                polygon,
            })
            .collect();
        Self { zones }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, point: LatLng) -> Option<usize> {
        let p = point.to_point();
        self.zones
            .iter()
            .find(|zone| zone.polygon.contains(&p))
            .map(|zone| zone.zone_index)
    }

    pub fn get(&self, zone_index: usize) -> Option<&HazardBufferZone> {
        self.zones.get(zone_index)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Reference project-area polygon used for coverage and heatmap filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Perimeter {
    polygon: MultiPolygon<f64>,
}

impl Perimeter {
    pub fn new(polygon: MultiPolygon<f64>) -> Self {
        Self { polygon }
    }

    pub fn contains(&self, point: LatLng) -> bool {
        first_containing(std::slice::from_ref(&self.polygon), point).is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, Polygon};

    /// Axis-aligned square in lon/lat.
    pub(crate) fn square(min_lon: f64, min_lat: f64, size: f64) -> MultiPolygon<f64> {
        let poly: Polygon<f64> = polygon![
            (x: min_lon, y: min_lat),
            (x: min_lon + size, y: min_lat),
            (x: min_lon + size, y: min_lat + size),
            (x: min_lon, y: min_lat + size),
            (x: min_lon, y: min_lat),
        ];
        MultiPolygon::new(vec![poly])
    }

    #[test]
    fn test_disjoint_returns_second_index() {
        let zones = ZoneSet::new(vec![square(8.0, 47.0, 0.1), square(9.0, 47.0, 0.1)]);
        assert_eq!(zones.contains(LatLng::new(47.05, 9.05)), Some(1));
    }

    #[test]
    fn test_overlap_resolves_to_lower_index() {
        let zones = ZoneSet::new(vec![square(8.0, 47.0, 0.2), square(8.1, 47.1, 0.2)]);
        let inside_both = LatLng::new(47.15, 8.15);
        for _ in 0..5 {
            assert_eq!(zones.contains(inside_both), Some(0));
        }
    }

    #[test]
    fn test_outside_all_zones() {
        let zones = ZoneSet::new(vec![square(8.0, 47.0, 0.1)]);
        assert_eq!(zones.contains(LatLng::new(46.0, 7.0)), None);
        assert_eq!(ZoneSet::empty().contains(LatLng::new(47.05, 8.05)), None);
    }

    #[test]
    fn test_boundary_point_is_deterministic() {
        let zones = ZoneSet::new(vec![square(8.0, 47.0, 0.1)]);
        let on_edge = LatLng::new(47.05, 8.0);
        let first = zones.contains(on_edge);
        assert_eq!(first, None);
        assert_eq!(zones.contains(on_edge), first);
    }

    #[test]
    fn test_first_containing_matches_zone_set() {
        let polys = vec![square(8.0, 47.0, 0.1), square(8.05, 47.05, 0.1)];
        let point = LatLng::new(47.12, 8.12);
        assert_eq!(first_containing(&polys, point), Some(1));
        assert_eq!(ZoneSet::new(polys).contains(point), Some(1));
    }

    #[test]
    fn test_perimeter_contains() {
        let perimeter = Perimeter::new(square(8.0, 47.0, 1.0));
        assert!(perimeter.contains(LatLng::new(47.5, 8.5)));
        assert!(!perimeter.contains(LatLng::new(48.5, 8.5)));
    }
}
