// 🧭 Location Resolver - one display coordinate per user
//
// Two-tier lookup:
//   1. (user.city, neighborhoods[0]) against the neighborhood table
//   2. user.city against the city centroid table
// A user matching neither is left off the map and counted, never an error.

use crate::geojson::Coordinate;
use crate::reference::{CityCentroidRecord, NeighborhoodRecord, ReferenceData};
use crate::users::UserRecord;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

/// Which table produced the coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Neighborhood,
    CityCentroid,
}

/// A resolved user before collision offsetting
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub user_id: String,
    pub display_name: String,
    pub profile_url: String,
    pub coordinate: Coordinate,
    pub matched: MatchKind,
}

/// Output of one resolution pass over the user list
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// In user-list order
    pub candidates: Vec<Candidate>,
    /// Ids of users with no joinable neighborhood or city
    pub unmapped: Vec<String>,
}

impl Resolution {
    pub fn unmapped_count(&self) -> usize {
        self.unmapped.len()
    }

    pub fn centroid_fallbacks(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.matched == MatchKind::CityCentroid)
            .count()
    }
}

// ============================================================================
// LINEAR RESOLUTION
// ============================================================================

/// Resolve a single user by scanning the reference tables in source order
pub fn resolve(
    user: &UserRecord,
    neighborhoods: &[NeighborhoodRecord],
    cities: &[CityCentroidRecord],
) -> Option<Coordinate> {
    resolve_with_kind(user, neighborhoods, cities).map(|(coord, _)| coord)
}

fn resolve_with_kind(
    user: &UserRecord,
    neighborhoods: &[NeighborhoodRecord],
    cities: &[CityCentroidRecord],
) -> Option<(Coordinate, MatchKind)> {
    if let Some(primary) = user.primary_neighborhood() {
        let hit = neighborhoods
            .iter()
            .find(|n| n.city_name == user.city && n.name == primary);
        if let Some(n) = hit {
            return Some((Coordinate::new(n.lat, n.lng), MatchKind::Neighborhood));
        }
    }

    cities
        .iter()
        .find(|c| c.city_name == user.city)
        .map(|c| (Coordinate::new(c.lat, c.lng), MatchKind::CityCentroid))
}

// ============================================================================
// INDEXED RESOLUTION
// ============================================================================

/// Hash index over the reference tables with the same first-row-wins
/// semantics as [`resolve`]. Built once per reference load.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    neighborhoods: HashMap<(String, String), Coordinate>,
    centroids: HashMap<String, Coordinate>,
}

impl LocationIndex {
    pub fn new(reference: &ReferenceData) -> Self {
        let mut neighborhoods = HashMap::with_capacity(reference.neighborhoods.len());
        for n in &reference.neighborhoods {
            neighborhoods
                .entry((n.city_name.clone(), n.name.clone()))
                .or_insert_with(|| Coordinate::new(n.lat, n.lng));
        }

        let mut centroids = HashMap::with_capacity(reference.cities.len());
        for c in &reference.cities {
            centroids
                .entry(c.city_name.clone())
                .or_insert_with(|| Coordinate::new(c.lat, c.lng));
        }

        Self {
            neighborhoods,
            centroids,
        }
    }

    pub fn resolve(&self, user: &UserRecord) -> Option<Coordinate> {
        self.resolve_with_kind(user).map(|(coord, _)| coord)
    }

    fn resolve_with_kind(&self, user: &UserRecord) -> Option<(Coordinate, MatchKind)> {
        if let Some(primary) = user.primary_neighborhood() {
            let key = (user.city.clone(), primary.to_string());
            if let Some(coord) = self.neighborhoods.get(&key) {
                return Some((*coord, MatchKind::Neighborhood));
            }
        }

        self.centroids
            .get(&user.city)
            .map(|coord| (*coord, MatchKind::CityCentroid))
    }

    /// Resolve every user, keeping input order for the offsetter
    pub fn resolve_all(&self, users: &[UserRecord]) -> Resolution {
        let mut resolution = Resolution::default();

        for user in users {
            match self.resolve_with_kind(user) {
                Some((coordinate, matched)) => resolution.candidates.push(Candidate {
                    user_id: user.id.clone(),
                    display_name: user.display_name(),
                    profile_url: user.profile_url(),
                    coordinate,
                    matched,
                }),
                None => {
                    debug!(user_id = %user.id, city = %user.city, "user has no map location");
                    resolution.unmapped.push(user.id.clone());
                }
            }
        }

        resolution
    }
}

// ============================================================================
// TESTS
// ============================================================================
