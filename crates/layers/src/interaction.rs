use std::cell::RefCell;
use std::collections::BTreeMap;

use foundation::{FeatureId, LngLat};
use scene::IndexedRegion;
use tracing::{debug, trace};

use crate::engine::MapEngine;
use crate::symbology::HOVER_STATE;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PointerKind {
    Enter,
    Move,
    Leave,
    Click,
}

/// A pointer event on one layer, with the topmost feature under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    pub layer_id: String,
    pub kind: PointerKind,
    pub feature: Option<FeatureId>,
    pub at: LngLat,
}

impl PointerEvent {
    pub fn new(layer_id: impl Into<String>, kind: PointerKind, feature: Option<FeatureId>, at: LngLat) -> Self {
        Self {
            layer_id: layer_id.into(),
            kind,
            feature,
            at,
        }
    }
}

#[derive(Debug, Default)]
struct WiredLayer {
    hovered: Option<(String, FeatureId)>,
}

/// Hover highlight, popup label and click dispatch for boundary layers.
///
/// Owns the registry of wired layer ids, so each layer is subscribed exactly
/// once however often it is reinstalled.
#[derive(Debug, Default)]
pub struct InteractionHandler {
    wired: RefCell<BTreeMap<String, WiredLayer>>,
}

impl InteractionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires `layer_id` once. Returns `false` when it already was.
    pub fn attach(&self, map: &mut dyn MapEngine, layer_id: &str) -> bool {
        let mut wired = self.wired.borrow_mut();
        if wired.contains_key(layer_id) {
            return false;
        }
        map.listen(layer_id);
        wired.insert(layer_id.to_string(), WiredLayer::default());
        debug!(layer = layer_id, "wired layer interaction");
        true
    }

    pub fn is_wired(&self, layer_id: &str) -> bool {
        self.wired.borrow().contains_key(layer_id)
    }

    pub fn wired_layers(&self) -> Vec<String> {
        self.wired.borrow().keys().cloned().collect()
    }

    pub fn hovered(&self, layer_id: &str) -> Option<(String, FeatureId)> {
        self.wired
            .borrow()
            .get(layer_id)
            .and_then(|w| w.hovered.clone())
    }

    /// Applies one pointer event. A click on a placed feature returns the
    /// region to drill into.
    ///
    /// The bound source is read from the live render stack, and every
    /// feature-state change first checks that the source still exists.
    pub fn handle(
        &self,
        map: &mut dyn MapEngine,
        event: &PointerEvent,
        lookup: impl Fn(&str, FeatureId) -> Option<IndexedRegion>,
    ) -> Option<IndexedRegion> {
        let mut wired = self.wired.borrow_mut();
        let state = wired.get_mut(&event.layer_id)?;
        let source = map
            .layers()
            .into_iter()
            .find(|l| l.id == event.layer_id)
            .map(|l| l.source);

        match event.kind {
            PointerKind::Enter => {
                trace!(layer = %event.layer_id, "pointer entered");
                None
            }
            PointerKind::Leave => {
                map.hide_popup();
                clear_hover(map, state);
                None
            }
            PointerKind::Move => {
                let (Some(source), Some(fid)) = (source, event.feature) else {
                    return None;
                };
                if !map.has_source(&source) {
                    return None;
                }
                if state.hovered.as_ref() != Some(&(source.clone(), fid)) {
                    clear_hover(map, state);
                }
                if map.set_feature_state(&source, fid, HOVER_STATE, true).is_ok() {
                    state.hovered = Some((source.clone(), fid));
                }
                match lookup(&source, fid) {
                    Some(hit) => map.show_popup(event.at, hit.region.name()),
                    None => map.hide_popup(),
                }
                None
            }
            PointerKind::Click => {
                let hit = lookup(&source?, event.feature?)?;
                debug!(layer = %event.layer_id, region = %hit.region, "feature clicked");
                Some(hit)
            }
        }
    }
}

fn clear_hover(map: &mut dyn MapEngine, state: &mut WiredLayer) {
    if let Some((source, fid)) = state.hovered.take() {
        if map.has_source(&source) {
            let _ = map.set_feature_state(&source, fid, HOVER_STATE, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InteractionHandler, PointerEvent, PointerKind};
    use crate::engine::{Camera, MapEngine};
    use crate::headless::HeadlessMap;
    use crate::layer::{LayerSpec, SourceSpec};
    use foundation::FeatureId;
    use pretty_assertions::assert_eq;
    use scene::{FeatureCollection, IndexedRegion, Region};

    fn map_with_layer() -> HeadlessMap {
        let mut map = HeadlessMap::new(
            Camera {
                center: [0.0, 0.0],
                zoom: 4.0,
            },
            4.0,
        );
        map.add_source(
            "kab-src",
            SourceSpec::GeoJson {
                data: FeatureCollection::default(),
            },
        )
        .unwrap();
        map.add_layer(LayerSpec::fill("kab-fill", "kab-src"), None).unwrap();
        map
    }

    fn named(id: FeatureId) -> Option<IndexedRegion> {
        Some(IndexedRegion {
            id,
            region: Region::Level1 {
                level1: format!("Region {}", id.get()),
            },
            bounds: None,
        })
    }

    fn event(kind: PointerKind, feature: Option<u64>) -> PointerEvent {
        PointerEvent::new("kab-fill", kind, feature.map(FeatureId), [1.0, 2.0])
    }

    #[test]
    fn attach_is_idempotent() {
        let mut map = map_with_layer();
        let handler = InteractionHandler::new();
        assert!(handler.attach(&mut map, "kab-fill"));
        assert!(!handler.attach(&mut map, "kab-fill"));
        assert!(map.is_listening("kab-fill"));
        assert_eq!(handler.wired_layers(), vec!["kab-fill".to_string()]);
    }

    #[test]
    fn hover_moves_between_features_and_clears_on_leave() {
        let mut map = map_with_layer();
        let handler = InteractionHandler::new();
        handler.attach(&mut map, "kab-fill");
        let lookup = |_: &str, id| named(id);

        handler.handle(&mut map, &event(PointerKind::Move, Some(1)), lookup);
        handler.handle(&mut map, &event(PointerKind::Move, Some(2)), lookup);
        assert_eq!(map.features_with_state("kab-src", "hover"), vec![FeatureId(2)]);
        assert_eq!(map.popup().map(|p| p.text.as_str()), Some("Region 2"));

        handler.handle(&mut map, &event(PointerKind::Leave, None), lookup);
        assert!(map.features_with_state("kab-src", "hover").is_empty());
        assert_eq!(map.popup(), None);
        assert_eq!(handler.hovered("kab-fill"), None);
    }

    #[test]
    fn leave_after_source_removed_is_harmless() {
        let mut map = map_with_layer();
        let handler = InteractionHandler::new();
        handler.attach(&mut map, "kab-fill");
        handler.handle(&mut map, &event(PointerKind::Move, Some(1)), |_, id| named(id));

        map.remove_layer("kab-fill").unwrap();
        map.remove_source("kab-src").unwrap();
        handler.handle(&mut map, &event(PointerKind::Leave, None), |_, id| named(id));
        assert_eq!(handler.hovered("kab-fill"), None);
    }

    #[test]
    fn click_resolves_region_and_ignores_unwired_layers() {
        let mut map = map_with_layer();
        let handler = InteractionHandler::new();
        let click = event(PointerKind::Click, Some(3));
        assert_eq!(handler.handle(&mut map, &click, |_, id| named(id)), None);

        handler.attach(&mut map, "kab-fill");
        let hit = handler.handle(&mut map, &click, |_, id| named(id)).unwrap();
        assert_eq!(hit.region.name(), "Region 3");
        assert_eq!(handler.handle(&mut map, &event(PointerKind::Click, None), |_, id| named(id)), None);
    }
}
