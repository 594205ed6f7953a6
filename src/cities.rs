// 🏙️ City Index - distinct, sorted city names for selectors
//
// Works over any record that carries a city, so the filter can be fed from
// reference data or from the live user list without a second code path.

use crate::reference::{CityCentroidRecord, NeighborhoodRecord, ReferenceData};
use crate::users::UserRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Anything that belongs to a city
pub trait HasCity {
    fn city(&self) -> &str;
}

impl HasCity for NeighborhoodRecord {
    fn city(&self) -> &str {
        &self.city_name
    }
}

impl HasCity for CityCentroidRecord {
    fn city(&self) -> &str {
        &self.city_name
    }
}

impl HasCity for UserRecord {
    fn city(&self) -> &str {
        &self.city
    }
}

impl HasCity for str {
    fn city(&self) -> &str {
        self
    }
}

impl HasCity for String {
    fn city(&self) -> &str {
        self
    }
}

/// Lexicographically sorted, deduplicated city names; blanks excluded
pub fn distinct_cities<'a, T, I>(records: I) -> Vec<String>
where
    T: HasCity + ?Sized + 'a,
    I: IntoIterator<Item = &'a T>,
{
    records
        .into_iter()
        .map(|r| r.city().trim())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Where the city selector takes its options from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitySource {
    /// Every city in the reference table
    #[default]
    Reference,
    /// Only cities some user actually lives in
    Users,
}

impl CitySource {
    pub fn cities(&self, reference: &ReferenceData, users: &[UserRecord]) -> Vec<String> {
        match self {
            CitySource::Reference => distinct_cities(&reference.neighborhoods),
            CitySource::Users => distinct_cities(users),
        }
    }
}

/// Sorted distinct state names from the neighborhood table
pub fn distinct_states(neighborhoods: &[NeighborhoodRecord]) -> Vec<String> {
    neighborhoods
        .iter()
        .map(|n| n.state_name.trim())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Cities for the state picked in the profile form
pub fn cities_in_state(neighborhoods: &[NeighborhoodRecord], state: &str) -> Vec<String> {
    distinct_cities(neighborhoods.iter().filter(|n| n.state_name == state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hood(name: &str, city: &str, state: &str) -> NeighborhoodRecord {
        NeighborhoodRecord {
            name: name.to_string(),
            city_name: city.to_string(),
            state_name: state.to_string(),
            lat: 0.0,
            lng: 0.0,
            zip: None,
        }
    }

    #[test]
    fn test_distinct_cities_sorted_and_deduped() {
        let names = ["Boston", "Boston", "Austin"];
        assert_eq!(distinct_cities(names.iter().copied()), vec!["Austin", "Boston"]);
    }

    #[test]
    fn test_distinct_cities_idempotent() {
        let names = vec!["Seattle".to_string(), "".to_string(), "Austin".to_string(), "  ".to_string()];
        let once = distinct_cities(&names);
        let twice = distinct_cities(&once);

        assert_eq!(once, vec!["Austin", "Seattle"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_city_source_switch() {
        let reference = ReferenceData::new(
            vec![hood("Back Bay", "Boston", "MA"), hood("Zilker", "Austin", "TX")],
            vec![],
        );
        let users: Vec<UserRecord> = serde_json::from_str(
            r#"[{"_id":"1","city":"Denver"},{"_id":"2","city":""},{"_id":"3","city":"Denver"}]"#,
        )
        .unwrap();

        assert_eq!(CitySource::Reference.cities(&reference, &users), vec!["Austin", "Boston"]);
        assert_eq!(CitySource::Users.cities(&reference, &users), vec!["Denver"]);
    }

    #[test]
    fn test_states_and_cities_in_state() {
        let hoods = vec![
            hood("Back Bay", "Boston", "Massachusetts"),
            hood("Central", "Cambridge", "Massachusetts"),
            hood("Zilker", "Austin", "Texas"),
            hood("Unknown", "Somewhere", ""),
        ];

        assert_eq!(distinct_states(&hoods), vec!["Massachusetts", "Texas"]);
        assert_eq!(cities_in_state(&hoods, "Massachusetts"), vec!["Boston", "Cambridge"]);
        assert!(cities_in_state(&hoods, "Ohio").is_empty());
    }
}
