// 🎛️ Selection / Filter state
//
// City filter changes re-run the whole reconcile. Highlight changes only
// restyle what is already drawn.

use serde::{Deserialize, Serialize};

/// What the host has to do after a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing changed
    None,
    /// Rebuild features and refit the viewport
    Reconcile,
    /// Paint-only pass, no data work
    Restyle,
}

/// Marker emphasis target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Highlight {
    Neighborhood(String),
    User(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    city: Option<String>,
    highlighted: Option<Highlight>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(city: Option<String>) -> Self {
        let mut state = Self::new();
        state.set_city(city);
        state
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn highlighted(&self) -> Option<&Highlight> {
        self.highlighted.as_ref()
    }

    /// Pick a city (`None` or blank = all cities). Always drops the highlight.
    pub fn set_city(&mut self, city: Option<String>) -> Change {
        let city = city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let had_highlight = self.highlighted.take().is_some();

        if city == self.city {
            return if had_highlight { Change::Restyle } else { Change::None };
        }
        self.city = city;
        Change::Reconcile
    }

    pub fn set_highlighted(&mut self, highlight: Option<Highlight>) -> Change {
        if highlight == self.highlighted {
            return Change::None;
        }
        self.highlighted = highlight;
        Change::Restyle
    }
}
