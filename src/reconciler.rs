// 🔁 Map Layer Reconciler
//
// Owns the point layer on a `RenderSurface` and brings it in line with the
// latest feature set on every change. Callers hand over data; only this
// module sequences source/layer/listener calls.
//
// Lifecycle:
//   Uninitialized --mount ok--> Ready --reconcile--> Ready
//   Uninitialized --mount err-> Degraded
//   any --dispose--> Disposed (terminal, idempotent)

use crate::error::SurfaceError;
use crate::geojson::{Bounds, Coordinate, FeatureCollection, FeatureProperties};
use crate::offset::{to_feature_collection, ResolvedPoint};
use crate::reference::ReferenceData;
use crate::selection::SelectionState;
use crate::surface::{
    CirclePaint, EventKind, FitOptions, HighlightMatch, LayerSpec, ListenerId, PopupId, RenderSurface,
};
use serde::Serialize;
use tracing::{debug, warn};

pub const SOURCE_ID: &str = "users";
pub const LAYER_ID: &str = "user-points";

pub const FIT_PADDING: f64 = 50.0;
/// Ceiling when zooming to a single city
pub const CITY_MAX_ZOOM: f64 = 14.0;
/// Ceiling for the all-cities overview
pub const OVERVIEW_MAX_ZOOM: f64 = 5.0;

// ============================================================================
// STATE + EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LayerState {
    Uninitialized,
    Ready,
    /// Surface failed to start; the map area stays empty
    Degraded(String),
    Disposed,
}

/// Events the host forwards from the surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    StyleLoaded,
    MouseEnter {
        feature: FeatureProperties,
        at: Coordinate,
    },
    MouseLeave,
    Click {
        feature: FeatureProperties,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { features: usize, fitted: bool },
    /// Style not loaded yet; flushed on `StyleLoaded`
    Deferred,
    /// Layer not ready (degraded, disposed or never mounted)
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
struct Frame {
    features: FeatureCollection,
    fit: Option<(Bounds, FitOptions)>,
}

// ============================================================================
// VIEWPORT
// ============================================================================

/// Where the viewport should go for this feature set and selection.
///
/// `None` means leave the viewport alone: either nothing is rendered or
/// the bounds would be degenerate.
pub fn viewport_target(
    features: &FeatureCollection,
    selection: &SelectionState,
    reference: &ReferenceData,
) -> Option<(Bounds, FitOptions)> {
    if features.is_empty() {
        return None;
    }

    let (bounds, max_zoom) = match selection.city() {
        Some(city) => {
            let mut bounds = Bounds::from_points(
                reference
                    .neighborhoods_in_city(city)
                    .map(|n| Coordinate::new(n.lat, n.lng)),
            );
            if bounds.is_empty() {
                if let Some(c) = reference.centroid_for(city) {
                    bounds.extend(Coordinate::new(c.lat, c.lng));
                }
            }
            (bounds, CITY_MAX_ZOOM)
        }
        None => (features.bounds(), OVERVIEW_MAX_ZOOM),
    };

    if bounds.is_empty() {
        return None;
    }

    Some((
        bounds,
        FitOptions {
            padding: FIT_PADDING,
            max_zoom,
        },
    ))
}

// ============================================================================
// MAP LAYER
// ============================================================================

pub struct MapLayer<S: RenderSurface> {
    state: LayerState,
    surface: Option<S>,
    listeners: Vec<ListenerId>,
    layer_listeners_attached: bool,
    popup: Option<PopupId>,
    pending: Option<Frame>,
    rendered: FeatureCollection,
    paint: CirclePaint,
}

impl<S: RenderSurface> Default for MapLayer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RenderSurface> MapLayer<S> {
    pub fn new() -> Self {
        Self {
            state: LayerState::Uninitialized,
            surface: None,
            listeners: Vec::new(),
            layer_listeners_attached: false,
            popup: None,
            pending: None,
            rendered: FeatureCollection::default(),
            paint: CirclePaint::default(),
        }
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LayerState::Ready
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Host-side access, e.g. to forward native state changes
    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    /// Last feature set actually pushed to the surface
    pub fn rendered(&self) -> &FeatureCollection {
        &self.rendered
    }

    /// Attach to a freshly created surface. Runs once; later calls are no-ops.
    /// A failing factory leaves the layer degraded instead of propagating.
    pub fn mount<F>(&mut self, factory: F) -> &LayerState
    where
        F: FnOnce() -> Result<S, SurfaceError>,
    {
        if self.state != LayerState::Uninitialized {
            return &self.state;
        }

        match factory() {
            Ok(mut surface) => match surface.on(EventKind::StyleLoaded, None) {
                Ok(listener) => {
                    self.listeners.push(listener);
                    self.surface = Some(surface);
                    self.state = LayerState::Ready;
                }
                Err(e) => {
                    surface.release();
                    self.degrade(e);
                }
            },
            Err(e) => self.degrade(e),
        }

        &self.state
    }

    fn degrade(&mut self, error: SurfaceError) {
        warn!(error = %error, "map surface unavailable, rendering empty map");
        self.state = LayerState::Degraded(error.to_string());
    }

    /// Replace whatever is drawn with `points` and refit the viewport.
    pub fn reconcile(
        &mut self,
        points: &[ResolvedPoint],
        selection: &SelectionState,
        reference: &ReferenceData,
    ) -> Result<ReconcileOutcome, SurfaceError> {
        if !self.is_ready() {
            return Ok(ReconcileOutcome::Skipped);
        }

        let features = to_feature_collection(points);
        let fit = viewport_target(&features, selection, reference);
        let frame = Frame { features, fit };

        let style_loaded = self.surface.as_ref().is_some_and(|s| s.is_style_loaded());
        if !style_loaded {
            debug!(features = frame.features.len(), "style not loaded, deferring reconcile");
            self.pending = Some(frame);
            return Ok(ReconcileOutcome::Deferred);
        }

        self.pending = None;
        self.apply(frame)
    }

    fn apply(&mut self, frame: Frame) -> Result<ReconcileOutcome, SurfaceError> {
        let surface = self.surface.as_mut().ok_or(SurfaceError::Released)?;

        let replaced = surface.has_source(SOURCE_ID) && surface.set_source_data(SOURCE_ID, &frame.features)?;

        if !replaced {
            // layer goes before its source, comes back after it
            if surface.has_layer(LAYER_ID) {
                surface.remove_layer(LAYER_ID)?;
            }
            if surface.has_source(SOURCE_ID) {
                surface.remove_source(SOURCE_ID)?;
            }
            surface.add_source(SOURCE_ID, frame.features.clone())?;
        }

        if !surface.has_layer(LAYER_ID) {
            surface.add_layer(LayerSpec {
                id: LAYER_ID.to_string(),
                source: SOURCE_ID.to_string(),
                paint: self.paint.clone(),
            })?;
        }

        if !self.layer_listeners_attached {
            for kind in [EventKind::MouseEnter, EventKind::MouseLeave, EventKind::Click] {
                let id = surface.on(kind, Some(LAYER_ID))?;
                self.listeners.push(id);
            }
            self.layer_listeners_attached = true;
        }

        let fitted = match frame.fit {
            Some((bounds, options)) => {
                surface.fit_bounds(bounds, options)?;
                true
            }
            None => false,
        };

        let count = frame.features.len();
        self.rendered = frame.features;

        Ok(ReconcileOutcome::Applied {
            features: count,
            fitted,
        })
    }

    /// Paint-only update for the current highlight
    pub fn restyle(&mut self, highlight: Option<HighlightMatch>) -> Result<(), SurfaceError> {
        self.paint.highlight = highlight;

        if !self.is_ready() {
            return Ok(());
        }
        match self.surface.as_mut() {
            Some(surface) if surface.has_layer(LAYER_ID) => surface.set_paint(LAYER_ID, self.paint.clone()),
            // picked up when the layer is first added
            _ => Ok(()),
        }
    }

    /// Feed a surface event through. Events after dispose are dropped.
    pub fn handle_event(&mut self, event: SurfaceEvent) -> Result<(), SurfaceError> {
        if !self.is_ready() {
            return Ok(());
        }

        if event == SurfaceEvent::StyleLoaded {
            return match self.pending.take() {
                Some(frame) => self.apply(frame).map(|_| ()),
                None => Ok(()),
            };
        }

        let Some(surface) = self.surface.as_mut() else {
            return Ok(());
        };

        match event {
            SurfaceEvent::MouseEnter { feature, at } => {
                surface.set_cursor("pointer");
                if let Some(old) = self.popup.take() {
                    surface.remove_popup(old);
                }
                self.popup = Some(surface.show_popup(at, &feature.name)?);
            }
            SurfaceEvent::MouseLeave => {
                surface.set_cursor("");
                if let Some(old) = self.popup.take() {
                    surface.remove_popup(old);
                }
            }
            SurfaceEvent::Click { feature } => {
                if !feature.profile_url.is_empty() {
                    surface.navigate(&feature.profile_url);
                }
            }
            SurfaceEvent::StyleLoaded => {}
        }

        Ok(())
    }

    /// Detach listeners and release the surface. Safe to call repeatedly,
    /// including on a layer that never mounted.
    pub fn dispose(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            if let Some(popup) = self.popup.take() {
                surface.remove_popup(popup);
            }
            for listener in self.listeners.drain(..) {
                surface.off(listener);
            }
            surface.release();
        }
        self.listeners.clear();
        self.popup = None;
        self.pending = None;
        self.layer_listeners_attached = false;
        self.state = LayerState::Disposed;
    }
}

// ============================================================================
// TESTS
// ============================================================================
