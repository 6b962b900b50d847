use foundation::{Aabb2, FeatureId, LngLat};
use futures_util::future::LocalBoxFuture;
use scene::FeatureCollection;

use crate::layer::{LayerBinding, LayerSpec, SourceSpec};
use crate::symbology::Paint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    DuplicateSource(String),
    DuplicateLayer(String),
    UnknownSource(String),
    UnknownLayer(String),
    /// A source cannot be removed while a layer still reads it.
    SourceInUse { source: String, layer: String },
    NotGeoJson(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            EngineError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            EngineError::UnknownSource(id) => write!(f, "unknown source: {id}"),
            EngineError::UnknownLayer(id) => write!(f, "unknown layer: {id}"),
            EngineError::SourceInUse { source, layer } => {
                write!(f, "source {source} is still used by layer {layer}")
            }
            EngineError::NotGeoJson(id) => write!(f, "source is not a GeoJSON source: {id}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FitOptions {
    pub padding: f64,
    pub duration_ms: u64,
}

impl FitOptions {
    pub const fn new(padding: f64, duration_ms: u64) -> Self {
        Self {
            padding,
            duration_ms,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
}

/// The stateful map canvas driven by the layer manager.
///
/// Layers are kept in render order; [`MapEngine::layers`] lists them bottom to
/// top. Pointer events for listened layers are delivered by the host.
pub trait MapEngine {
    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError>;
    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), EngineError>;
    fn source_data(&self, id: &str) -> Option<&FeatureCollection>;
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;

    fn has_layer(&self, id: &str) -> bool;
    /// Inserts below `before` when given and present, else on top.
    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) -> Result<(), EngineError>;
    fn set_paint(&mut self, layer_id: &str, paint: Paint) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    fn move_layer_to_top(&mut self, id: &str) -> Result<(), EngineError>;
    fn layers(&self) -> Vec<LayerBinding>;

    fn set_feature_state(
        &mut self,
        source: &str,
        feature: FeatureId,
        key: &str,
        value: bool,
    ) -> Result<(), EngineError>;

    /// Subscribes to pointer events on `layer_id`. The subscription outlives
    /// the layer and applies again when a layer with that id is re-added.
    fn listen(&mut self, layer_id: &str);
    fn unlisten(&mut self, layer_id: &str);

    fn fit_bounds(&mut self, bounds: Aabb2, options: FitOptions);
    fn jump_to(&mut self, camera: Camera);
    fn camera(&self) -> Camera;

    fn show_popup(&mut self, at: LngLat, text: &str);
    fn hide_popup(&mut self);

    /// Resolves once `id` has finished loading its data.
    ///
    /// Must also resolve when `id` is removed before it loads, and at once
    /// for an unknown id. Callers re-check their generation afterwards.
    fn source_loaded(&mut self, id: &str) -> LocalBoxFuture<'static, ()>;
}
