// 🧩 Map controller - loading gate + liveness around the pipeline
//
// Reference data and the user list arrive independently and in any order.
// Nothing is resolved or drawn until both have landed at least once.
// Results are applied in completion order; anything arriving after unmount,
// or carrying a ticket from another controller, is dropped.

use crate::cities::CitySource;
use crate::error::{LoadError, SurfaceError};
use crate::offset::{offset, ResolvedPoint};
use crate::reconciler::{LayerState, MapLayer, ReconcileOutcome, SurfaceEvent};
use crate::reference::ReferenceData;
use crate::resolver::LocationIndex;
use crate::selection::{Change, Highlight, SelectionState};
use crate::surface::{HighlightMatch, RenderSurface};
use crate::users::UserRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Reference,
    Users,
}

/// Handed out when a fetch starts, handed back with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    session: u64,
    seq: u64,
    pub kind: FetchKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    /// A source failed before it ever delivered data
    Failed(String),
}

pub struct MapController<S: RenderSurface> {
    session: u64,
    next_seq: u64,
    alive: bool,
    reference: Option<ReferenceData>,
    index: LocationIndex,
    users: Option<Vec<UserRecord>>,
    selection: SelectionState,
    layer: MapLayer<S>,
    points: Vec<ResolvedPoint>,
    unmapped: usize,
    failure: Option<String>,
}

impl<S: RenderSurface> Default for MapController<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RenderSurface> MapController<S> {
    pub fn new() -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            next_seq: 0,
            alive: true,
            reference: None,
            index: LocationIndex::default(),
            users: None,
            selection: SelectionState::new(),
            layer: MapLayer::new(),
            points: Vec::new(),
            unmapped: 0,
            failure: None,
        }
    }

    /// Attach the rendering surface. Init failures leave a degraded layer.
    pub fn mount<F>(&mut self, factory: F) -> &LayerState
    where
        F: FnOnce() -> Result<S, SurfaceError>,
    {
        self.layer.mount(factory);
        self.refresh();
        self.layer.state()
    }

    // ========================================================================
    // FETCH RESULTS
    // ========================================================================

    pub fn begin_fetch(&mut self, kind: FetchKind) -> FetchTicket {
        self.next_seq += 1;
        FetchTicket {
            session: self.session,
            seq: self.next_seq,
            kind,
        }
    }

    fn accepts(&self, ticket: &FetchTicket, kind: FetchKind) -> bool {
        if !self.alive || ticket.session != self.session || ticket.kind != kind {
            debug!(seq = ticket.seq, ?kind, "discarding fetch result for dead or foreign session");
            return false;
        }
        true
    }

    /// Apply a finished reference-data fetch. Returns false when discarded.
    pub fn complete_reference(&mut self, ticket: FetchTicket, result: Result<ReferenceData, LoadError>) -> bool {
        if !self.accepts(&ticket, FetchKind::Reference) {
            return false;
        }
        match result {
            Ok(reference) => {
                self.index = LocationIndex::new(&reference);
                self.reference = Some(reference);
                self.refresh();
            }
            Err(e) => self.record_failure("reference data", &e),
        }
        true
    }

    /// Apply a finished user-list fetch. Returns false when discarded.
    pub fn complete_users(&mut self, ticket: FetchTicket, result: Result<Vec<UserRecord>, LoadError>) -> bool {
        if !self.accepts(&ticket, FetchKind::Users) {
            return false;
        }
        match result {
            Ok(users) => {
                self.users = Some(users);
                self.refresh();
            }
            Err(e) => self.record_failure("user list", &e),
        }
        true
    }

    fn record_failure(&mut self, what: &str, error: &LoadError) {
        // earlier data (if any) stays on screen
        warn!(source = what, error = %error, "fetch failed");
        self.failure = Some(format!("{what}: {error}"));
    }

    pub fn is_loading(&self) -> bool {
        self.reference.is_none() || self.users.is_none()
    }

    pub fn load_state(&self) -> LoadState {
        match (&self.failure, self.is_loading()) {
            (_, false) => LoadState::Ready,
            (Some(reason), true) => LoadState::Failed(reason.clone()),
            (None, true) => LoadState::Loading,
        }
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn set_city(&mut self, city: Option<String>) -> Change {
        let change = self.selection.set_city(city);
        match change {
            Change::Reconcile => self.refresh(),
            Change::Restyle => self.restyle(),
            Change::None => {}
        }
        change
    }

    pub fn set_highlighted(&mut self, highlight: Option<Highlight>) -> Change {
        let change = self.selection.set_highlighted(highlight);
        if change == Change::Restyle {
            self.restyle();
        }
        change
    }

    /// Options for the city selector
    pub fn cities(&self, source: CitySource) -> Vec<String> {
        let empty = ReferenceData::default();
        let reference = self.reference.as_ref().unwrap_or(&empty);
        source.cities(reference, self.users.as_deref().unwrap_or_default())
    }

    // ========================================================================
    // PIPELINE
    // ========================================================================

    /// Resolve → offset → reconcile. No-op until both inputs are in.
    fn refresh(&mut self) {
        if !self.alive {
            return;
        }
        let (Some(reference), Some(users)) = (&self.reference, &self.users) else {
            return;
        };

        let resolution = self.index.resolve_all(users);
        self.points = offset(&resolution.candidates);
        self.unmapped = resolution.unmapped_count();

        match self.layer.reconcile(&self.points, &self.selection, reference) {
            Ok(ReconcileOutcome::Applied { features, fitted }) => {
                info!(features, unmapped = self.unmapped, fitted, "map layer reconciled");
            }
            Ok(outcome) => debug!(?outcome, "map layer not updated"),
            Err(e) => warn!(error = %e, "map layer reconcile failed"),
        }
        // neighborhood highlights are id lists, recompute against the new users
        self.restyle();
    }

    fn highlight_match(&self) -> Option<HighlightMatch> {
        match self.selection.highlighted()? {
            Highlight::User(id) => Some(HighlightMatch::UserId(id.clone())),
            Highlight::Neighborhood(name) => {
                let city = self.selection.city();
                let ids = self
                    .users
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .filter(|u| u.primary_neighborhood() == Some(name.as_str()))
                    .filter(|u| city.map_or(true, |c| u.city == c))
                    .map(|u| u.id.clone())
                    .collect();
                Some(HighlightMatch::UserIds(ids))
            }
        }
    }

    fn restyle(&mut self) {
        if !self.alive {
            return;
        }
        let highlight = self.highlight_match();
        if let Err(e) = self.layer.restyle(highlight) {
            warn!(error = %e, "map restyle failed");
        }
    }

    pub fn handle_event(&mut self, event: SurfaceEvent) {
        if !self.alive {
            return;
        }
        if let Err(e) = self.layer.handle_event(event) {
            warn!(error = %e, "map event failed");
        }
    }

    /// Tear down. Later fetch results and events are ignored.
    pub fn unmount(&mut self) {
        self.alive = false;
        self.layer.dispose();
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn points(&self) -> &[ResolvedPoint] {
        &self.points
    }

    pub fn unmapped_count(&self) -> usize {
        self.unmapped
    }

    pub fn layer(&self) -> &MapLayer<S> {
        &self.layer
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.layer.surface_mut()
    }

    pub fn reference(&self) -> Option<&ReferenceData> {
        self.reference.as_ref()
    }

    pub fn users(&self) -> Option<&[UserRecord]> {
        self.users.as_deref()
    }
}

// ============================================================================
// TESTS
// ============================================================================
