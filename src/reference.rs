// 📍 Reference Data Store - neighborhoods + city centroids
//
// Parses the static neighborhood CSV (and an optional city centroid CSV)
// into validated, immutable records. Bad rows are dropped, never fatal.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// RECORDS
// ============================================================================

/// One row of the neighborhood reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodRecord {
    pub name: String,
    pub city_name: String,
    pub state_name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// City center used when a user's neighborhood can't be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCentroidRecord {
    pub city_name: String,
    pub state_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Raw neighborhood row exactly as it appears in the CSV.
/// Every column is optional text so one malformed row can't fail the load.
#[derive(Debug, Deserialize)]
struct RawNeighborhoodRow {
    #[serde(default)]
    neighborhood: Option<String>,
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    state_name: Option<String>,
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lng: Option<String>,
    #[serde(default)]
    zip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCentroidRow {
    #[serde(default, alias = "city_name")]
    city: Option<String>,
    #[serde(default)]
    state_id: Option<String>,
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lng: Option<String>,
}

const NEIGHBORHOOD_COLUMNS: [&str; 4] = ["neighborhood", "city_name", "lat", "lng"];
const CENTROID_COLUMNS: [&str; 3] = ["city", "lat", "lng"];

// ============================================================================
// LOAD STATS
// ============================================================================

/// How many rows were kept and dropped during one load cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub neighborhoods_kept: usize,
    pub neighborhoods_dropped: usize,
    pub centroids_kept: usize,
    pub centroids_dropped: usize,
}

// ============================================================================
// REFERENCE DATA
// ============================================================================

/// Immutable result of one reference-data load cycle
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub neighborhoods: Vec<NeighborhoodRecord>,
    pub cities: Vec<CityCentroidRecord>,
    pub stats: LoadStats,
}

impl ReferenceData {
    pub fn new(neighborhoods: Vec<NeighborhoodRecord>, cities: Vec<CityCentroidRecord>) -> Self {
        let stats = LoadStats {
            neighborhoods_kept: neighborhoods.len(),
            centroids_kept: cities.len(),
            ..LoadStats::default()
        };
        Self {
            neighborhoods,
            cities,
            stats,
        }
    }

    /// Parse neighborhood CSV text and, optionally, city centroid CSV text.
    ///
    /// Fails only when a source can't be read at all or lacks a required
    /// header column. Individual bad rows are skipped and counted.
    pub fn load<N: Read, C: Read>(neighborhoods: N, centroids: Option<C>) -> Result<Self, LoadError> {
        let (neighborhoods, neighborhoods_dropped) = parse_neighborhoods(neighborhoods)?;
        let (cities, centroids_dropped) = match centroids {
            Some(reader) => parse_centroids(reader)?,
            None => (Vec::new(), 0),
        };

        let stats = LoadStats {
            neighborhoods_kept: neighborhoods.len(),
            neighborhoods_dropped,
            centroids_kept: cities.len(),
            centroids_dropped,
        };

        info!(
            neighborhoods = stats.neighborhoods_kept,
            dropped = stats.neighborhoods_dropped,
            centroids = stats.centroids_kept,
            "reference data loaded"
        );

        Ok(Self {
            neighborhoods,
            cities,
            stats,
        })
    }

    /// Convenience wrapper over [`ReferenceData::load`] for files on disk
    pub fn load_from_paths(neighborhoods: &Path, centroids: Option<&Path>) -> Result<Self, LoadError> {
        let open = |path: &Path| {
            File::open(path).map_err(|source| LoadError::Unavailable {
                path: path.display().to_string(),
                source,
            })
        };

        let neighborhood_file = open(neighborhoods)?;
        let centroid_file = centroids.map(open).transpose()?;

        Self::load(neighborhood_file, centroid_file)
    }

    /// Neighborhoods belonging to one city, in source order
    pub fn neighborhoods_in_city<'a>(&'a self, city: &'a str) -> impl Iterator<Item = &'a NeighborhoodRecord> + 'a {
        self.neighborhoods.iter().filter(move |n| n.city_name == city)
    }

    /// First centroid for a city, if any
    pub fn centroid_for(&self, city: &str) -> Option<&CityCentroidRecord> {
        self.cities.iter().find(|c| c.city_name == city)
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty() && self.cities.is_empty()
    }
}

// ============================================================================
// PARSING
// ============================================================================

fn parse_neighborhoods<R: Read>(reader: R) -> Result<(Vec<NeighborhoodRecord>, usize), LoadError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    require_columns(&mut rdr, &NEIGHBORHOOD_COLUMNS)?;

    let mut records = Vec::new();
    let mut dropped = 0;

    for (line, row) in rdr.deserialize::<RawNeighborhoodRow>().enumerate() {
        let parsed = row.ok().and_then(|raw| {
            Some(NeighborhoodRecord {
                name: required(raw.neighborhood)?,
                city_name: required(raw.city_name)?,
                state_name: raw.state_name.map(|s| s.trim().to_string()).unwrap_or_default(),
                lat: coordinate(raw.lat)?,
                lng: coordinate(raw.lng)?,
                zip: raw.zip.and_then(|z| required(Some(z))),
            })
        });

        match parsed {
            Some(record) => records.push(record),
            None => {
                dropped += 1;
                debug!(line = line + 2, "dropping invalid neighborhood row");
            }
        }
    }

    Ok((records, dropped))
}

fn parse_centroids<R: Read>(reader: R) -> Result<(Vec<CityCentroidRecord>, usize), LoadError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    // The centroid file may name its city column `city_name` instead
    let headers = rdr.headers()?.clone();
    let has = |col: &str| headers.iter().any(|h| h.trim() == col);
    if !has("city") && !has("city_name") {
        return Err(LoadError::MissingColumn("city".to_string()));
    }
    for col in ["lat", "lng"] {
        if !has(col) {
            return Err(LoadError::MissingColumn(col.to_string()));
        }
    }

    let mut records = Vec::new();
    let mut dropped = 0;

    for row in rdr.deserialize::<RawCentroidRow>() {
        let parsed = row.ok().and_then(|raw| {
            Some(CityCentroidRecord {
                city_name: required(raw.city)?,
                state_id: raw.state_id.map(|s| s.trim().to_string()).unwrap_or_default(),
                lat: coordinate(raw.lat)?,
                lng: coordinate(raw.lng)?,
            })
        });

        match parsed {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    Ok((records, dropped))
}

fn require_columns<R: Read>(rdr: &mut csv::Reader<R>, columns: &[&str]) -> Result<(), LoadError> {
    let headers = rdr.headers()?;
    for col in columns {
        if !headers.iter().any(|h| h.trim() == *col) {
            return Err(LoadError::MissingColumn((*col).to_string()));
        }
    }
    Ok(())
}

/// Non-empty trimmed text or nothing
fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn coordinate(value: Option<String>) -> Option<f64> {
    required(value)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const NEIGHBORHOODS: &str = "\
neighborhood,city_name,state_name,lat,lng,zip
Back Bay,Boston,Massachusetts,42.3503,-71.0810,02116
Beacon Hill,Boston,Massachusetts,42.3588,-71.0707,
,Boston,Massachusetts,42.30,-71.05,02100
Mission,San Francisco,California,,-122.4194,94110
Hyde Park,Austin,Texas,30.3050,not-a-number,78751
Zilker,Austin,Texas,30.2669,-97.7729,78704
";

    const CENTROIDS: &str = "\
city,state_id,lat,lng
Boston,MA,42.3601,-71.0589
Austin,TX,30.2672,-97.7431
Nowhere,,abc,1.0
";

    #[test]
    fn test_invalid_rows_are_dropped() {
        let data = ReferenceData::load(NEIGHBORHOODS.as_bytes(), None::<&[u8]>).unwrap();

        // missing name, missing lat, unparseable lng
        assert_eq!(data.neighborhoods.len(), 3);
        assert_eq!(data.stats.neighborhoods_dropped, 3);
        assert!(data.cities.is_empty());

        let names: Vec<&str> = data.neighborhoods.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Back Bay", "Beacon Hill", "Zilker"]);
    }

    #[test]
    fn test_fields_are_parsed() {
        let data = ReferenceData::load(NEIGHBORHOODS.as_bytes(), None::<&[u8]>).unwrap();
        let back_bay = &data.neighborhoods[0];

        assert_eq!(back_bay.city_name, "Boston");
        assert_eq!(back_bay.state_name, "Massachusetts");
        assert_eq!(back_bay.lat, 42.3503);
        assert_eq!(back_bay.lng, -71.0810);
        assert_eq!(back_bay.zip.as_deref(), Some("02116"));

        // empty zip is absent, not ""
        assert_eq!(data.neighborhoods[1].zip, None);
    }

    #[test]
    fn test_centroids_loaded_alongside() {
        let data = ReferenceData::load(NEIGHBORHOODS.as_bytes(), Some(CENTROIDS.as_bytes())).unwrap();

        assert_eq!(data.cities.len(), 2);
        assert_eq!(data.stats.centroids_dropped, 1);
        assert_eq!(data.centroid_for("Austin").unwrap().state_id, "TX");
        assert!(data.centroid_for("Nowhere").is_none());
    }

    #[test]
    fn test_centroid_city_name_alias() {
        let csv = "city_name,state_id,lat,lng\nBoston,MA,42.36,-71.05\n";
        let data = ReferenceData::load("neighborhood,city_name,lat,lng\n".as_bytes(), Some(csv.as_bytes())).unwrap();

        assert_eq!(data.cities.len(), 1);
        assert_eq!(data.cities[0].city_name, "Boston");
    }

    #[test]
    fn test_missing_header_is_fatal() {
        let csv = "name,city,latitude,longitude\nBack Bay,Boston,42.35,-71.08\n";
        let err = ReferenceData::load(csv.as_bytes(), None::<&[u8]>).unwrap_err();

        assert!(matches!(err, LoadError::MissingColumn(ref col) if col == "neighborhood"));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = ReferenceData::load_from_paths(Path::new("/definitely/not/here.csv"), None).unwrap_err();
        assert!(matches!(err, LoadError::Unavailable { .. }));
    }

    #[test]
    fn test_neighborhoods_in_city() {
        let data = ReferenceData::load(NEIGHBORHOODS.as_bytes(), None::<&[u8]>).unwrap();
        let boston: Vec<_> = data.neighborhoods_in_city("Boston").collect();

        assert_eq!(boston.len(), 2);
        assert!(data.neighborhoods_in_city("Paris").next().is_none());
    }
}
