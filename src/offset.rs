// 🎯 Collision Offsetter - keep stacked markers distinguishable
//
// Users resolving to the same coordinate are fanned out diagonally:
// the Nth repeat (0-based) moves by N * DELTA degrees on both axes.
// Counts live only for one pass, so equal input order gives equal output.

use crate::geojson::{Coordinate, Feature, FeatureCollection, FeatureProperties, Geometry};
use crate::resolver::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Diagonal step between stacked markers, in degrees (~500 m)
pub const DELTA: f64 = 0.005;

/// Decimal places kept when deciding two coordinates are "the same" (~1 m)
pub const KEY_PRECISION: i32 = 5;

/// A user marker after offsetting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPoint {
    pub user_id: String,
    pub display_name: String,
    pub lat: f64,
    pub lng: f64,
    pub profile_url: String,
}

impl ResolvedPoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    pub fn to_feature(&self) -> Feature {
        Feature {
            geometry: Geometry::Point {
                coordinates: self.coordinate().to_lng_lat(),
            },
            properties: FeatureProperties {
                user_id: self.user_id.clone(),
                name: self.display_name.clone(),
                profile_url: self.profile_url.clone(),
            },
        }
    }
}

/// Quantized coordinate used as the collision key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey(i64, i64);

impl CellKey {
    fn of(coord: Coordinate) -> Self {
        let scale = 10f64.powi(KEY_PRECISION);
        CellKey(
            (coord.lat * scale).round() as i64,
            (coord.lng * scale).round() as i64,
        )
    }
}

/// Apply the diagonal fan-out to candidates, preserving input order
pub fn offset(candidates: &[Candidate]) -> Vec<ResolvedPoint> {
    let mut seen: HashMap<CellKey, u32> = HashMap::new();

    candidates
        .iter()
        .map(|c| {
            let count = seen.entry(CellKey::of(c.coordinate)).or_insert(0);
            let shift = f64::from(*count) * DELTA;
            *count += 1;

            ResolvedPoint {
                user_id: c.user_id.clone(),
                display_name: c.display_name.clone(),
                lat: c.coordinate.lat + shift,
                lng: c.coordinate.lng + shift,
                profile_url: c.profile_url.clone(),
            }
        })
        .collect()
}

/// Offset points as a GeoJSON collection, ready for the map layer
pub fn to_feature_collection(points: &[ResolvedPoint]) -> FeatureCollection {
    FeatureCollection::new(points.iter().map(ResolvedPoint::to_feature).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MatchKind;

    fn candidate(id: &str, lat: f64, lng: f64) -> Candidate {
        Candidate {
            user_id: id.to_string(),
            display_name: id.to_string(),
            profile_url: format!("/user/{id}"),
            coordinate: Coordinate::new(lat, lng),
            matched: MatchKind::Neighborhood,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_input() {
        assert!(offset(&[]).is_empty());
    }

    #[test]
    fn test_three_way_collision() {
        let input = vec![
            candidate("A", 42.35, -71.07),
            candidate("B", 42.35, -71.07),
            candidate("C", 42.35, -71.07),
        ];

        let out = offset(&input);

        assert_eq!(out[0].lat, 42.35);
        assert_eq!(out[0].lng, -71.07);
        assert!(close(out[1].lat, 42.35 + DELTA) && close(out[1].lng, -71.07 + DELTA));
        assert!(close(out[2].lat, 42.35 + 2.0 * DELTA) && close(out[2].lng, -71.07 + 2.0 * DELTA));
    }

    #[test]
    fn test_deterministic_for_same_order() {
        let input = vec![
            candidate("A", 42.35, -71.07),
            candidate("B", 30.26, -97.74),
            candidate("C", 42.35, -71.07),
        ];

        assert_eq!(offset(&input), offset(&input));
    }

    #[test]
    fn test_distinct_points_untouched() {
        let input = vec![candidate("A", 42.35, -71.07), candidate("B", 42.36, -71.07)];
        let out = offset(&input);

        assert_eq!(out[1].lat, 42.36);
        assert_eq!(out[1].lng, -71.07);
    }

    #[test]
    fn test_near_identical_values_share_a_key() {
        // differ only past the 5th decimal
        let input = vec![
            candidate("A", 42.3503, -71.08099999),
            candidate("B", 42.3503, -71.081),
        ];
        let out = offset(&input);

        assert!(close(out[1].lat, 42.3503 + DELTA));
    }

    #[test]
    fn test_feature_collection_order() {
        let out = offset(&[candidate("A", 1.0, 2.0), candidate("B", 1.0, 2.0)]);
        let fc = to_feature_collection(&out);

        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[0].properties.user_id, "A");
        assert_eq!(fc.features[0].geometry, Geometry::Point { coordinates: [2.0, 1.0] });
    }
}
