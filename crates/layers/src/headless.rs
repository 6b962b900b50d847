//! In-memory [`MapEngine`] for tests and the command-line driver.
//!
//! Validates the same way a real style does: ids are unique, layers need an
//! existing source, and a source cannot be removed while a layer reads it.

use std::collections::{BTreeMap, BTreeSet};

use foundation::{Aabb2, FeatureId, LngLat};
use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use scene::FeatureCollection;
use tokio::sync::oneshot;
use tracing::trace;

use crate::engine::{Camera, EngineError, FitOptions, MapEngine};
use crate::layer::{LayerBinding, LayerSpec, SourceSpec};
use crate::symbology::Paint;

/// Mutations applied to the map, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    AddSource(String),
    SetSourceData(String),
    RemoveSource(String),
    AddLayer(String),
    RemoveLayer(String),
    MoveLayerToTop(String),
    FitBounds(Aabb2),
    JumpTo(Camera),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub at: LngLat,
    pub text: String,
}

#[derive(Debug)]
pub struct HeadlessMap {
    sources: BTreeMap<String, SourceSpec>,
    stack: Vec<LayerSpec>,
    feature_state: BTreeMap<(String, FeatureId), BTreeMap<String, bool>>,
    listening: BTreeSet<String>,
    camera: Camera,
    min_zoom: f64,
    popup: Option<Popup>,
    ops: Vec<EngineOp>,
    defer_loading: bool,
    load_waiters: BTreeMap<String, Vec<oneshot::Sender<()>>>,
}

impl HeadlessMap {
    pub fn new(camera: Camera, min_zoom: f64) -> Self {
        Self {
            sources: BTreeMap::new(),
            stack: Vec::new(),
            feature_state: BTreeMap::new(),
            listening: BTreeSet::new(),
            camera,
            min_zoom,
            popup: None,
            ops: Vec::new(),
            defer_loading: false,
            load_waiters: BTreeMap::new(),
        }
    }

    /// Sources report loaded only when [`HeadlessMap::complete_load`] is called.
    pub fn with_deferred_loading(mut self) -> Self {
        self.defer_loading = true;
        self
    }

    /// Signals every waiter on `id`. Returns how many were waiting.
    pub fn complete_load(&mut self, id: &str) -> usize {
        let waiters = self.load_waiters.remove(id).unwrap_or_default();
        let n = waiters.len();
        for tx in waiters {
            let _ = tx.send(());
        }
        n
    }

    pub fn load_waiters(&self, id: &str) -> usize {
        self.load_waiters.get(id).map_or(0, Vec::len)
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.stack.iter().map(|l| l.id.clone()).collect()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.stack.iter().find(|l| l.id == id)
    }

    pub fn feature_state(&self, source: &str, feature: FeatureId, key: &str) -> bool {
        self.feature_state
            .get(&(source.to_string(), feature))
            .and_then(|s| s.get(key))
            .copied()
            .unwrap_or(false)
    }

    /// Features of `source` with `key` set, in id order.
    pub fn features_with_state(&self, source: &str, key: &str) -> Vec<FeatureId> {
        self.feature_state
            .iter()
            .filter(|((s, _), state)| s == source && state.get(key).copied().unwrap_or(false))
            .map(|((_, id), _)| *id)
            .collect()
    }

    pub fn is_listening(&self, layer_id: &str) -> bool {
        self.listening.contains(layer_id)
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn ops(&self) -> &[EngineOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<EngineOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn fits(&self) -> Vec<Aabb2> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                EngineOp::FitBounds(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.stack.iter().position(|l| l.id == id)
    }
}

impl MapEngine for HeadlessMap {
    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError> {
        if self.sources.contains_key(id) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), spec);
        self.ops.push(EngineOp::AddSource(id.to_string()));
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), EngineError> {
        match self.sources.get_mut(id) {
            Some(SourceSpec::GeoJson { data: current }) => *current = data,
            Some(_) => return Err(EngineError::NotGeoJson(id.to_string())),
            None => return Err(EngineError::UnknownSource(id.to_string())),
        }
        self.ops.push(EngineOp::SetSourceData(id.to_string()));
        Ok(())
    }

    fn source_data(&self, id: &str) -> Option<&FeatureCollection> {
        match self.sources.get(id) {
            Some(SourceSpec::GeoJson { data }) => Some(data),
            _ => None,
        }
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        if !self.sources.contains_key(id) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        if let Some(layer) = self.stack.iter().find(|l| l.source == id) {
            return Err(EngineError::SourceInUse {
                source: id.to_string(),
                layer: layer.id.clone(),
            });
        }
        self.sources.remove(id);
        self.feature_state.retain(|(source, _), _| source != id);
        // Waiters on a removed source are released by the dropped senders.
        self.load_waiters.remove(id);
        self.ops.push(EngineOp::RemoveSource(id.to_string()));
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) -> Result<(), EngineError> {
        if self.has_layer(&spec.id) {
            return Err(EngineError::DuplicateLayer(spec.id));
        }
        if !self.sources.contains_key(&spec.source) {
            return Err(EngineError::UnknownSource(spec.source));
        }
        let id = spec.id.clone();
        match before.and_then(|b| self.position(b)) {
            Some(at) => self.stack.insert(at, spec),
            None => self.stack.push(spec),
        }
        self.ops.push(EngineOp::AddLayer(id));
        Ok(())
    }

    fn set_paint(&mut self, layer_id: &str, paint: Paint) -> Result<(), EngineError> {
        let at = self
            .position(layer_id)
            .ok_or_else(|| EngineError::UnknownLayer(layer_id.to_string()))?;
        self.stack[at].paint = paint;
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let at = self
            .position(id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        self.stack.remove(at);
        self.ops.push(EngineOp::RemoveLayer(id.to_string()));
        Ok(())
    }

    fn move_layer_to_top(&mut self, id: &str) -> Result<(), EngineError> {
        let at = self
            .position(id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        let layer = self.stack.remove(at);
        self.stack.push(layer);
        self.ops.push(EngineOp::MoveLayerToTop(id.to_string()));
        Ok(())
    }

    fn layers(&self) -> Vec<LayerBinding> {
        self.stack.iter().map(LayerSpec::binding).collect()
    }

    fn set_feature_state(
        &mut self,
        source: &str,
        feature: FeatureId,
        key: &str,
        value: bool,
    ) -> Result<(), EngineError> {
        if !self.sources.contains_key(source) {
            return Err(EngineError::UnknownSource(source.to_string()));
        }
        self.feature_state
            .entry((source.to_string(), feature))
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn listen(&mut self, layer_id: &str) {
        self.listening.insert(layer_id.to_string());
    }

    fn unlisten(&mut self, layer_id: &str) {
        self.listening.remove(layer_id);
    }

    fn fit_bounds(&mut self, bounds: Aabb2, options: FitOptions) {
        let span = (bounds.max[0] - bounds.min[0])
            .max(bounds.max[1] - bounds.min[1])
            .max(1e-6);
        let zoom = (360.0 / span).log2().max(self.min_zoom);
        self.camera = Camera {
            center: bounds.center(),
            zoom,
        };
        trace!(?bounds, padding = options.padding, duration_ms = options.duration_ms, "fit");
        self.ops.push(EngineOp::FitBounds(bounds));
    }

    fn jump_to(&mut self, camera: Camera) {
        self.camera = Camera {
            center: camera.center,
            zoom: camera.zoom.max(self.min_zoom),
        };
        self.ops.push(EngineOp::JumpTo(self.camera));
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn show_popup(&mut self, at: LngLat, text: &str) {
        self.popup = Some(Popup {
            at,
            text: text.to_string(),
        });
    }

    fn hide_popup(&mut self) {
        self.popup = None;
    }

    fn source_loaded(&mut self, id: &str) -> LocalBoxFuture<'static, ()> {
        if !self.defer_loading || !self.sources.contains_key(id) {
            return future::ready(()).boxed_local();
        }
        let (tx, rx) = oneshot::channel();
        self.load_waiters.entry(id.to_string()).or_default().push(tx);
        rx.map(|_| ()).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineOp, HeadlessMap};
    use crate::engine::{Camera, EngineError, FitOptions, MapEngine};
    use crate::layer::{LayerSpec, SourceSpec};
    use foundation::{Aabb2, FeatureId};
    use futures_util::FutureExt;
    use pretty_assertions::assert_eq;
    use scene::FeatureCollection;

    fn map() -> HeadlessMap {
        HeadlessMap::new(
            Camera {
                center: [0.0, 0.0],
                zoom: 4.0,
            },
            4.0,
        )
    }

    fn geojson() -> SourceSpec {
        SourceSpec::GeoJson {
            data: FeatureCollection::default(),
        }
    }

    #[test]
    fn source_in_use_cannot_be_removed() {
        let mut m = map();
        m.add_source("a-src", geojson()).unwrap();
        m.add_layer(LayerSpec::fill("a-fill", "a-src"), None).unwrap();
        m.add_layer(LayerSpec::emphasis("a-fill", "a-src"), None).unwrap();

        m.remove_layer("a-fill").unwrap();
        assert_eq!(
            m.remove_source("a-src"),
            Err(EngineError::SourceInUse {
                source: "a-src".into(),
                layer: "a-fill-hover-line".into()
            })
        );
        m.remove_layer("a-fill-hover-line").unwrap();
        m.remove_source("a-src").unwrap();
        assert!(m.source_ids().is_empty());
    }

    #[test]
    fn layers_insert_before_and_move_to_top() {
        let mut m = map();
        m.add_source("s", geojson()).unwrap();
        m.add_source("r", SourceSpec::raster("https://t", 256)).unwrap();
        m.add_layer(LayerSpec::fill("a", "s"), None).unwrap();
        m.add_layer(LayerSpec::fill("b", "s"), None).unwrap();
        m.add_layer(LayerSpec::raster("ras", "r"), Some("a")).unwrap();
        assert_eq!(m.layer_ids(), vec!["ras", "a", "b"]);

        m.move_layer_to_top("a").unwrap();
        assert_eq!(m.layer_ids(), vec!["ras", "b", "a"]);
        assert_eq!(
            m.add_layer(LayerSpec::fill("c", "missing"), None),
            Err(EngineError::UnknownSource("missing".into()))
        );
    }

    #[test]
    fn feature_state_requires_source_and_dies_with_it() {
        let mut m = map();
        assert!(m.set_feature_state("s", FeatureId(1), "hover", true).is_err());
        m.add_source("s", geojson()).unwrap();
        m.set_feature_state("s", FeatureId(1), "hover", true).unwrap();
        assert_eq!(m.features_with_state("s", "hover"), vec![FeatureId(1)]);
        m.remove_source("s").unwrap();
        assert!(!m.feature_state("s", FeatureId(1), "hover"));
    }

    #[test]
    fn fit_and_jump_respect_min_zoom() {
        let mut m = map();
        m.fit_bounds(Aabb2::new([-180.0, -80.0], [180.0, 80.0]), FitOptions::new(40.0, 1000));
        assert_eq!(m.camera().zoom, 4.0);
        m.fit_bounds(Aabb2::new([0.0, 0.0], [0.5, 0.25]), FitOptions::new(40.0, 1000));
        assert_eq!(m.camera().center, [0.25, 0.125]);
        assert!(m.camera().zoom > 9.0);
        assert_eq!(m.fits().len(), 2);

        m.jump_to(Camera {
            center: [1.0, 1.0],
            zoom: 1.0,
        });
        assert_eq!(
            m.ops().last(),
            Some(&EngineOp::JumpTo(Camera {
                center: [1.0, 1.0],
                zoom: 4.0
            }))
        );
    }

    #[test]
    fn deferred_loading_waits_for_completion() {
        let mut m = map().with_deferred_loading();
        m.add_source("s", geojson()).unwrap();
        let mut loaded = m.source_loaded("s");
        assert!((&mut loaded).now_or_never().is_none());
        assert_eq!(m.complete_load("s"), 1);
        assert_eq!(loaded.now_or_never(), Some(()));
        // Unknown sources never block.
        assert_eq!(m.source_loaded("nope").now_or_never(), Some(()));
    }

    #[test]
    fn removing_a_source_releases_its_load_waiters() {
        let mut m = map().with_deferred_loading();
        m.add_source("s", geojson()).unwrap();
        let loaded = m.source_loaded("s");
        m.remove_source("s").unwrap();
        assert_eq!(m.load_waiters("s"), 0);
        assert_eq!(loaded.now_or_never(), Some(()));
    }
}
