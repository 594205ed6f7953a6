// Roommate Map - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod reference;   // Reference Data Store - neighborhood/city CSV
pub mod cities;      // City Index
pub mod resolver;    // Location Resolver
pub mod offset;      // Collision Offsetter
pub mod geojson;
pub mod surface;     // RenderSurface trait + in-memory surface
pub mod reconciler;  // Map Layer Reconciler
pub mod selection;   // Selection / Filter State
pub mod controller;  // Loading gate + liveness
pub mod users;
pub mod identity;
pub mod directory;   // List view search + sort
pub mod db;
pub mod config;
pub mod error;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use reference::{CityCentroidRecord, LoadStats, NeighborhoodRecord, ReferenceData};
pub use cities::{cities_in_state, distinct_cities, distinct_states, CitySource, HasCity};
pub use resolver::{resolve, Candidate, LocationIndex, MatchKind, Resolution};
pub use offset::{offset, to_feature_collection, ResolvedPoint, DELTA};
pub use geojson::{Bounds, Coordinate, Feature, FeatureCollection};
pub use surface::{FitOptions, HighlightMatch, MemorySurface, RenderSurface, Viewport};
pub use reconciler::{viewport_target, LayerState, MapLayer, ReconcileOutcome, SurfaceEvent};
pub use selection::{Change, Highlight, SelectionState};
pub use controller::{FetchKind, FetchTicket, LoadState, MapController};
pub use users::{Profile, UserRecord};
pub use identity::{guard, GuardDecision, Identity};
pub use directory::{filter_and_sort, SortColumn, SortDirection, SortState};
pub use db::{
    Event, ImportSummary, SaveKind,
    setup_database, upsert_profile, patch_profile, get_profile_by_identity,
    get_user_by_email, get_user_by_username, list_users, count_profiles,
    import_profiles, insert_event, get_events_for_entity,
};
pub use config::Config;
pub use error::{LoadError, PersistenceError, SurfaceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
