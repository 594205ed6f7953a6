// 📋 User directory - list view search + column sort

use crate::users::UserRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Name,
    Email,
    Country,
    State,
    City,
    Neighborhood,
}

impl SortColumn {
    pub const ALL: [SortColumn; 6] = [
        SortColumn::Name,
        SortColumn::Email,
        SortColumn::Country,
        SortColumn::State,
        SortColumn::City,
        SortColumn::Neighborhood,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SortColumn::Name => "Name",
            SortColumn::Email => "Email",
            SortColumn::Country => "Country",
            SortColumn::State => "State",
            SortColumn::City => "City",
            SortColumn::Neighborhood => "Neighborhood",
        }
    }

    /// Lowercased sort key for a user
    fn key(&self, user: &UserRecord) -> String {
        match self {
            SortColumn::Name => format!("{} {}", user.first_name, user.last_name),
            SortColumn::Email => user.email.clone(),
            SortColumn::Country => user.country.clone(),
            SortColumn::State => user.state.clone().unwrap_or_default(),
            SortColumn::City => user.city.clone(),
            SortColumn::Neighborhood => user.primary_neighborhood().unwrap_or_default().to_string(),
        }
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Asc => "▲",
            SortDirection::Desc => "▼",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: SortColumn::Name,
            direction: SortDirection::Asc,
        }
    }
}

impl SortState {
    /// Same column flips direction; a new column starts ascending
    pub fn toggle(&mut self, column: SortColumn) {
        if self.column == column {
            self.direction = self.direction.flip();
        } else {
            self.column = column;
            self.direction = SortDirection::Asc;
        }
    }
}

/// Case-insensitive substring match over every searchable field
pub fn matches_search(user: &UserRecord, search: &str) -> bool {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    let mut haystack = user.neighborhoods.join(" ");
    for field in [
        user.city.as_str(),
        user.state.as_deref().unwrap_or_default(),
        user.first_name.as_str(),
        user.last_name.as_str(),
        user.email.as_str(),
    ] {
        haystack.push(' ');
        haystack.push_str(field);
    }

    haystack.to_lowercase().contains(&needle)
}

/// Users matching `search`, ordered by `sort`. Ties keep input order.
pub fn filter_and_sort<'a>(users: &'a [UserRecord], search: &str, sort: SortState) -> Vec<&'a UserRecord> {
    let mut rows: Vec<(String, &UserRecord)> = users
        .iter()
        .filter(|u| matches_search(u, search))
        .map(|u| (sort.column.key(u), u))
        .collect();

    rows.sort_by(|(a, _), (b, _)| {
        let ord = a.cmp(b);
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    rows.into_iter().map(|(_, u)| u).collect()
}

/// Convenience for callers that only want ids
pub fn ordered_ids(users: &[UserRecord], search: &str, sort: SortState) -> Vec<String> {
    filter_and_sort(users, search, sort)
        .into_iter()
        .map(|u| u.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<UserRecord> {
        serde_json::from_str(
            r#"[
                {"_id":"1","first_name":"carol","last_name":"Z","email":"carol@caltech.edu","country":"USA","state":"TX","city":"Austin","neighborhoods":["Zilker"]},
                {"_id":"2","first_name":"Ada","last_name":"L","email":"ada@caltech.edu","country":"USA","city":"Boston","neighborhoods":["Back Bay","Fenway"]},
                {"_id":"3","first_name":"Bob","last_name":"M","email":"bob@caltech.edu","country":"Canada","state":"ON","city":"Toronto","neighborhoods":[]}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_sort_by_name_is_case_insensitive() {
        let ids = ordered_ids(&users(), "", SortState::default());
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_toggle_flips_then_resets() {
        let mut sort = SortState::default();
        sort.toggle(SortColumn::Name);
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(ordered_ids(&users(), "", sort), vec!["1", "3", "2"]);

        sort.toggle(SortColumn::City);
        assert_eq!(sort, SortState { column: SortColumn::City, direction: SortDirection::Asc });
    }

    #[test]
    fn test_search_covers_neighborhoods_and_email() {
        let all = users();
        assert_eq!(ordered_ids(&all, "fenway", SortState::default()), vec!["2"]);
        assert_eq!(ordered_ids(&all, "BOB@", SortState::default()), vec!["3"]);
        assert_eq!(ordered_ids(&all, "  ", SortState::default()).len(), 3);
        assert!(ordered_ids(&all, "paris", SortState::default()).is_empty());
    }

    #[test]
    fn test_missing_state_sorts_first() {
        let sort = SortState { column: SortColumn::State, direction: SortDirection::Asc };
        assert_eq!(ordered_ids(&users(), "", sort), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_neighborhood_column_uses_primary() {
        let sort = SortState { column: SortColumn::Neighborhood, direction: SortDirection::Asc };
        // "" < "back bay" < "zilker"
        assert_eq!(ordered_ids(&users(), "", sort), vec!["3", "2", "1"]);
    }
}
