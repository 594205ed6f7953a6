// 🖼️ Rendering surface - the imperative map API
//
// `RenderSurface` mirrors what a hosted map library exposes: sources, layers,
// listeners, popups, viewport. Only `reconciler::MapLayer` talks to it.
// `MemorySurface` keeps everything in memory; the server uses it to compute
// what a browser map would end up showing, and tests use it to inspect calls.

use crate::error::SurfaceError;
use crate::geojson::{Bounds, Coordinate, FeatureCollection};
use serde::Serialize;
use std::collections::HashMap;

// ============================================================================
// LAYER + VIEWPORT TYPES
// ============================================================================

/// What part of a feature a highlight matches on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum HighlightMatch {
    UserId(String),
    /// Users whose marker sits in this neighborhood
    UserIds(Vec<String>),
}

/// Circle styling for a point layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CirclePaint {
    pub radius: f64,
    pub color: String,
    pub stroke_width: f64,
    pub stroke_color: String,
    /// Features matching get `highlight_color` / `highlight_radius`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<HighlightMatch>,
    pub highlight_color: String,
    pub highlight_radius: f64,
}

impl Default for CirclePaint {
    fn default() -> Self {
        Self {
            radius: 8.0,
            color: "#dc2626".to_string(),
            stroke_width: 2.0,
            stroke_color: "#ffffff".to_string(),
            highlight: None,
            highlight_color: "#f59e0b".to_string(),
            highlight_radius: 11.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    pub paint: CirclePaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitOptions {
    pub padding: f64,
    pub max_zoom: f64,
}

/// Last viewport the surface was asked to fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub bounds: Bounds,
    pub padding: f64,
    pub max_zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StyleLoaded,
    MouseEnter,
    MouseLeave,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PopupId(pub u64);

// ============================================================================
// SURFACE TRAIT
// ============================================================================

pub trait RenderSurface {
    /// Sources and layers may only be added once this is true
    fn is_style_loaded(&self) -> bool;

    fn has_source(&self, id: &str) -> bool;
    fn has_layer(&self, id: &str) -> bool;

    fn add_source(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError>;

    /// Replace a source's data in place.
    /// `Ok(false)` means the surface can't do partial replacement.
    fn set_source_data(&mut self, id: &str, data: &FeatureCollection) -> Result<bool, SurfaceError>;

    /// Fails while any layer still reads from the source
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn set_paint(&mut self, layer: &str, paint: CirclePaint) -> Result<(), SurfaceError>;

    fn fit_bounds(&mut self, bounds: Bounds, options: FitOptions) -> Result<(), SurfaceError>;

    fn on(&mut self, kind: EventKind, layer: Option<&str>) -> Result<ListenerId, SurfaceError>;
    fn off(&mut self, listener: ListenerId);

    fn show_popup(&mut self, at: Coordinate, label: &str) -> Result<PopupId, SurfaceError>;
    fn remove_popup(&mut self, popup: PopupId);

    fn set_cursor(&mut self, cursor: &str);
    fn navigate(&mut self, url: &str);

    /// Tear the surface down. Safe to call more than once.
    fn release(&mut self);
}

// ============================================================================
// IN-MEMORY SURFACE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub id: PopupId,
    pub at: Coordinate,
    pub label: String,
}

/// Surface that keeps its whole state in memory
#[derive(Debug, Default)]
pub struct MemorySurface {
    style_loaded: bool,
    supports_set_data: bool,
    released: bool,
    next_id: u64,
    sources: HashMap<String, FeatureCollection>,
    layers: Vec<LayerSpec>,
    listeners: Vec<(ListenerId, EventKind, Option<String>)>,
    popups: Vec<Popup>,
    viewport: Option<Viewport>,
    cursor: String,
    navigations: Vec<String>,
    /// Every mutating call, in order
    pub calls: Vec<String>,
}

impl MemorySurface {
    /// Open a surface. A missing or blank access token fails like the hosted
    /// library does when it has no credential.
    pub fn connect(access_token: Option<&str>) -> Result<Self, SurfaceError> {
        match access_token.map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Self {
                supports_set_data: true,
                ..Self::default()
            }),
            _ => Err(SurfaceError::Init("missing access token".to_string())),
        }
    }

    /// Surface whose style is ready immediately
    pub fn loaded() -> Self {
        Self {
            style_loaded: true,
            supports_set_data: true,
            ..Self::default()
        }
    }

    /// Surface without in-place data replacement, forcing remove/re-add
    pub fn without_set_data(mut self) -> Self {
        self.supports_set_data = false;
        self
    }

    /// Simulate the style finishing loading
    pub fn finish_style_load(&mut self) {
        self.style_loaded = true;
    }

    pub fn source(&self, id: &str) -> Option<&FeatureCollection> {
        self.sources.get(id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn check(&self) -> Result<(), SurfaceError> {
        if self.released {
            Err(SurfaceError::Released)
        } else {
            Ok(())
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderSurface for MemorySurface {
    fn is_style_loaded(&self) -> bool {
        self.style_loaded && !self.released
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    fn add_source(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError> {
        self.check()?;
        if self.sources.contains_key(id) {
            return Err(SurfaceError::Duplicate(id.to_string()));
        }
        self.calls.push(format!("add_source:{id}"));
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: &FeatureCollection) -> Result<bool, SurfaceError> {
        self.check()?;
        if !self.supports_set_data {
            return Ok(false);
        }
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| SurfaceError::UnknownSource(id.to_string()))?;
        self.calls.push(format!("set_source_data:{id}"));
        *source = data.clone();
        Ok(true)
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        self.check()?;
        if self.layers.iter().any(|l| l.source == id) {
            return Err(SurfaceError::SourceInUse(id.to_string()));
        }
        self.calls.push(format!("remove_source:{id}"));
        self.sources.remove(id);
        Ok(())
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError> {
        self.check()?;
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::UnknownSource(layer.source));
        }
        if self.has_layer(&layer.id) {
            return Err(SurfaceError::Duplicate(layer.id));
        }
        self.calls.push(format!("add_layer:{}", layer.id));
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        self.check()?;
        self.calls.push(format!("remove_layer:{id}"));
        self.layers.retain(|l| l.id != id);
        Ok(())
    }

    fn set_paint(&mut self, layer: &str, paint: CirclePaint) -> Result<(), SurfaceError> {
        self.check()?;
        self.calls.push(format!("set_paint:{layer}"));
        if let Some(l) = self.layers.iter_mut().find(|l| l.id == layer) {
            l.paint = paint;
        }
        Ok(())
    }

    fn fit_bounds(&mut self, bounds: Bounds, options: FitOptions) -> Result<(), SurfaceError> {
        self.check()?;
        self.calls.push("fit_bounds".to_string());
        self.viewport = Some(Viewport {
            bounds,
            padding: options.padding,
            max_zoom: options.max_zoom,
        });
        Ok(())
    }

    fn on(&mut self, kind: EventKind, layer: Option<&str>) -> Result<ListenerId, SurfaceError> {
        self.check()?;
        let id = ListenerId(self.next_id());
        self.listeners.push((id, kind, layer.map(str::to_string)));
        Ok(id)
    }

    fn off(&mut self, listener: ListenerId) {
        self.listeners.retain(|(id, _, _)| *id != listener);
    }

    fn show_popup(&mut self, at: Coordinate, label: &str) -> Result<PopupId, SurfaceError> {
        self.check()?;
        let id = PopupId(self.next_id());
        self.popups.push(Popup {
            id,
            at,
            label: label.to_string(),
        });
        Ok(id)
    }

    fn remove_popup(&mut self, popup: PopupId) {
        self.popups.retain(|p| p.id != popup);
    }

    fn set_cursor(&mut self, cursor: &str) {
        self.cursor = cursor.to_string();
    }

    fn navigate(&mut self, url: &str) {
        self.navigations.push(url.to_string());
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.calls.push("release".to_string());
        self.released = true;
        self.listeners.clear();
        self.popups.clear();
        self.layers.clear();
        self.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_token() {
        assert!(matches!(MemorySurface::connect(None), Err(SurfaceError::Init(_))));
        assert!(matches!(MemorySurface::connect(Some("  ")), Err(SurfaceError::Init(_))));
        assert!(MemorySurface::connect(Some("pk.test")).is_ok());
    }

    #[test]
    fn test_source_cannot_be_removed_under_a_layer() {
        let mut surface = MemorySurface::loaded();
        surface.add_source("users", FeatureCollection::default()).unwrap();
        surface
            .add_layer(LayerSpec {
                id: "user-points".to_string(),
                source: "users".to_string(),
                paint: CirclePaint::default(),
            })
            .unwrap();

        assert_eq!(
            surface.remove_source("users"),
            Err(SurfaceError::SourceInUse("users".to_string()))
        );

        surface.remove_layer("user-points").unwrap();
        surface.remove_source("users").unwrap();
        assert_eq!(surface.source_count(), 0);
    }

    #[test]
    fn test_layer_needs_source() {
        let mut surface = MemorySurface::loaded();
        let err = surface
            .add_layer(LayerSpec {
                id: "user-points".to_string(),
                source: "users".to_string(),
                paint: CirclePaint::default(),
            })
            .unwrap_err();

        assert_eq!(err, SurfaceError::UnknownSource("users".to_string()));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut surface = MemorySurface::loaded();
        surface.on(EventKind::Click, Some("user-points")).unwrap();
        surface.release();
        surface.release();

        assert!(surface.is_released());
        assert_eq!(surface.listener_count(), 0);
        assert_eq!(surface.calls.iter().filter(|c| *c == "release").count(), 1);
        assert_eq!(surface.add_source("x", FeatureCollection::default()), Err(SurfaceError::Released));
    }
}
