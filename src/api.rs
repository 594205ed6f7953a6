// 🌐 HTTP collaborators - user listing, profile store, reference lookups
//
// Identity comes from headers set by the upstream auth proxy. Handlers never
// hold the database lock across an await.

use crate::cities::{cities_in_state, distinct_states, CitySource};
use crate::config::Config;
use crate::db;
use crate::error::{AppError, PersistenceError};
use crate::geojson::FeatureCollection;
use crate::identity::{guard, validate_signup_email, GuardDecision, Identity};
use crate::offset::offset;
use crate::reconciler::{LayerState, MapLayer};
use crate::reference::ReferenceData;
use crate::resolver::LocationIndex;
use crate::selection::SelectionState;
use crate::surface::{MemorySurface, Viewport};
use crate::users::{Profile, UserRecord};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub const UID_HEADER: &str = "x-identity-uid";
pub const EMAIL_HEADER: &str = "x-identity-email";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub reference: Arc<ReferenceData>,
    pub index: Arc<LocationIndex>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, reference: ReferenceData, config: Config) -> Self {
        let index = LocationIndex::new(&reference);
        Self {
            db: Arc::new(Mutex::new(conn)),
            reference: Arc::new(reference),
            index: Arc::new(index),
            config: Arc::new(config),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
    }
}

/// Identity vouched for by the auth proxy, if both headers are present
pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    Some(Identity::new(header(UID_HEADER)?, header(EMAIL_HEADER)?))
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
pub struct UsernameQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
pub struct FirebaseQuery {
    firebase_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CitiesQuery {
    #[serde(default)]
    source: CitySource,
}

#[derive(Deserialize)]
pub struct MapQuery {
    city: Option<String>,
}

#[derive(Deserialize)]
pub struct GuardQuery {
    path: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileLookup {
    success: bool,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<Profile>,
}

/// Listing entry plus whether the visitor is looking at their own page
#[derive(Serialize)]
pub struct UserLookup {
    #[serde(flatten)]
    user: UserRecord,
    is_own: bool,
}

#[derive(Serialize)]
pub struct SaveResponse {
    success: bool,
    profile: Profile,
}

#[derive(Serialize)]
pub struct MapResponse {
    /// `ready` or `degraded`
    surface: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    features: FeatureCollection,
    viewport: Option<Viewport>,
    unmapped: usize,
}

#[derive(Serialize)]
pub struct GuardResponse {
    decision: GuardDecision,
    location: Option<&'static str>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    profiles: i64,
    neighborhoods: usize,
    cities: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let profiles = db::count_profiles(&*state.conn()?)?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        profiles,
        neighborhoods: state.reference.neighborhoods.len(),
        cities: state.reference.cities.len(),
    }))
}

/// GET /api/users - Sanitized listing of every profile
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserRecord>>, AppError> {
    let users = db::list_users(&*state.conn()?)?;
    Ok(Json(users))
}

/// GET /api/user?username= - Profile page lookup
async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<UserLookup>, AppError> {
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or(AppError::MissingParameter("username"))?;
    let username = username.trim();

    let user = db::get_user_by_username(&*state.conn()?, username, &state.config.email_domain)?
        .ok_or(AppError::NotFound("User"))?;
    let is_own = identity_from_headers(&headers).is_some_and(|me| me.is_own_profile(username));

    Ok(Json(UserLookup { user, is_own }))
}

/// GET /api/profile?firebase_id=
async fn get_profile(
    State(state): State<AppState>,
    Query(query): Query<FirebaseQuery>,
) -> Result<Json<ProfileLookup>, AppError> {
    let firebase_id = query
        .firebase_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::MissingParameter("firebase_id"))?;

    let profile = db::get_profile_by_identity(&*state.conn()?, firebase_id.trim())?;

    Ok(Json(ProfileLookup {
        success: true,
        exists: profile.is_some(),
        profile,
    }))
}

/// POST /api/profile - Upsert by firebase_id
async fn save_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<SaveResponse>, AppError> {
    let firebase_id = patch
        .get("firebase_id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingParameter("firebase_id"))?
        .to_string();

    let identity = identity_from_headers(&headers);
    if let Some(identity) = &identity {
        if identity.uid != firebase_id {
            return Err(AppError::Forbidden);
        }
    }

    if let Some(email) = patch.get("email").and_then(|v| v.as_str()).filter(|e| !e.is_empty()) {
        validate_signup_email(email, &state.config.email_domain).map_err(|e| AppError::InvalidEmail(e.message()))?;
    }

    let actor = identity.as_ref().map_or("anonymous", |i| i.uid.as_str());
    let (profile, kind) = db::patch_profile(&*state.conn()?, patch, actor).map_err(|e| match e {
        PersistenceError::InvalidProfile(reason) => AppError::InvalidBody(reason),
        other => AppError::from(other),
    })?;
    info!(firebase_id = %firebase_id, ?kind, "profile saved");

    Ok(Json(SaveResponse {
        success: true,
        profile,
    }))
}

/// GET /api/profile/history?firebase_id= - Save log for the caller's own profile
async fn profile_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FirebaseQuery>,
) -> Result<Json<Vec<db::Event>>, AppError> {
    let firebase_id = query
        .firebase_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::MissingParameter("firebase_id"))?;
    let firebase_id = firebase_id.trim();

    match identity_from_headers(&headers) {
        Some(identity) if identity.uid == firebase_id => {}
        _ => return Err(AppError::Forbidden),
    }

    let conn = state.conn()?;
    let profile = db::get_profile_by_identity(&conn, firebase_id)?.ok_or(AppError::NotFound("Profile"))?;
    let profile_id = profile.id.ok_or(AppError::NotFound("Profile"))?;
    let events = db::get_events_for_entity(&conn, "profile", &profile_id)?;

    Ok(Json(events))
}

/// GET /api/cities?source=reference|users - City selector options
async fn list_cities(
    State(state): State<AppState>,
    Query(query): Query<CitiesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let users = match query.source {
        CitySource::Users => db::list_users(&*state.conn()?)?,
        CitySource::Reference => Vec::new(),
    };

    Ok(Json(query.source.cities(&state.reference, &users)))
}

/// GET /api/states
async fn list_states(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(distinct_states(&state.reference.neighborhoods))
}

/// GET /api/cities/:state
async fn list_cities_in_state(State(state): State<AppState>, Path(us_state): Path<String>) -> Json<Vec<String>> {
    Json(cities_in_state(&state.reference.neighborhoods, &us_state))
}

/// GET /api/map?city= - Reconciled feature set and viewport
async fn get_map(
    State(state): State<AppState>,
    Query(query): Query<MapQuery>,
) -> Result<Json<MapResponse>, AppError> {
    let users = db::list_users(&*state.conn()?)?;

    let resolution = state.index.resolve_all(&users);
    let points = offset(&resolution.candidates);
    let selection = SelectionState::with_city(query.city);

    let mut layer: MapLayer<MemorySurface> = MapLayer::new();
    let token = state.config.map_token.as_deref();
    layer.mount(|| {
        MemorySurface::connect(token).map(|mut surface| {
            surface.finish_style_load();
            surface
        })
    });

    layer
        .reconcile(&points, &selection, &state.reference)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let (surface, reason) = match layer.state() {
        LayerState::Degraded(reason) => ("degraded", Some(reason.clone())),
        _ => ("ready", None),
    };
    let viewport = layer.surface().and_then(|s| s.viewport());
    let features = layer.rendered().clone();
    layer.dispose();

    Ok(Json(MapResponse {
        surface,
        reason,
        features,
        viewport,
        unmapped: resolution.unmapped_count(),
    }))
}

/// GET /api/guard?path= - Where the current visitor may go
async fn check_guard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GuardQuery>,
) -> Result<Json<GuardResponse>, AppError> {
    let path = query.path.unwrap_or_else(|| "/".to_string());
    let identity = identity_from_headers(&headers);

    let profile_exists = match &identity {
        Some(identity) => match state.conn() {
            Ok(conn) => db::get_profile_by_identity(&conn, &identity.uid).ok().map(|p| p.is_some()),
            Err(_) => None,
        },
        None => None,
    };

    let decision = guard(&path, identity.as_ref(), profile_exists);
    Ok(Json(GuardResponse {
        decision,
        location: decision.location(),
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/users", get(list_users))
        .route("/user", get(get_user))
        .route("/profile", get(get_profile).post(save_profile))
        .route("/profile/history", get(profile_history))
        .route("/cities", get(list_cities))
        .route("/cities/:state", get(list_cities_in_state))
        .route("/states", get(list_states))
        .route("/map", get(get_map))
        .route("/guard", get(check_guard))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================
