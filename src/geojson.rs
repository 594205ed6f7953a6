// 🗺️ GeoJSON point features + bounding boxes
//
// Just enough of GeoJSON for a point layer: `[lng, lat]` ordering on the
// wire, explicit `lat`/`lng` names everywhere else.

use serde::{Deserialize, Serialize};

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// GeoJSON position order
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

// ============================================================================
// BOUNDS
// ============================================================================

/// Growable bounding box. Starts empty; an empty box must never be fitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    sw: Option<Coordinate>,
    ne: Option<Coordinate>,
}

impl Bounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points<I: IntoIterator<Item = Coordinate>>(points: I) -> Self {
        let mut bounds = Self::new();
        for p in points {
            bounds.extend(p);
        }
        bounds
    }

    /// Grow to include `point`. Non-finite coordinates are ignored.
    pub fn extend(&mut self, point: Coordinate) {
        if !point.lat.is_finite() || !point.lng.is_finite() {
            return;
        }
        match (self.sw.as_mut(), self.ne.as_mut()) {
            (Some(sw), Some(ne)) => {
                sw.lat = sw.lat.min(point.lat);
                sw.lng = sw.lng.min(point.lng);
                ne.lat = ne.lat.max(point.lat);
                ne.lng = ne.lng.max(point.lng);
            }
            _ => {
                self.sw = Some(point);
                self.ne = Some(point);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sw.is_none()
    }

    pub fn south_west(&self) -> Option<Coordinate> {
        self.sw
    }

    pub fn north_east(&self) -> Option<Coordinate> {
        self.ne
    }

    pub fn center(&self) -> Option<Coordinate> {
        let (sw, ne) = (self.sw?, self.ne?);
        Some(Coordinate::new((sw.lat + ne.lat) / 2.0, (sw.lng + ne.lng) / 2.0))
    }
}

// ============================================================================
// FEATURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
}

impl Geometry {
    pub fn coordinate(&self) -> Coordinate {
        match self {
            Geometry::Point { coordinates: [lng, lat] } => Coordinate::new(*lat, *lng),
        }
    }
}

/// Properties carried by every user marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub user_id: String,
    pub name: String,
    #[serde(rename = "profileUrl")]
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn coordinate(&self) -> Coordinate {
        self.geometry.coordinate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.features.iter().map(Feature::coordinate))
    }
}
