use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::{Aabb2, FeatureId};
use scene::{FeatureCollection, HierarchySchema, IndexedRegion, Region, RegionIndex};
use streaming::{FetchError, RasterQuery, RasterService, RequestCoordinator, VectorQuery, VectorService};
use tracing::{debug, info};

use crate::engine::{Camera, EngineError, FitOptions, MapEngine};
use crate::interaction::{InteractionHandler, PointerEvent};
use crate::layer::{
    LayerBinding, LayerKind, LayerSlot, LayerSpec, SourceSpec, conventional_source_id,
    emphasis_layer_id, is_emphasis_layer,
};
use crate::symbology::Paint;

#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    Fetch(FetchError),
    Engine(EngineError),
}

impl LayerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LayerError::Fetch(e) if e.is_cancelled())
    }
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::Fetch(e) => write!(f, "fetch failed: {e}"),
            LayerError::Engine(e) => write!(f, "map update failed: {e}"),
        }
    }
}

impl std::error::Error for LayerError {}

impl From<FetchError> for LayerError {
    fn from(e: FetchError) -> Self {
        LayerError::Fetch(e)
    }
}

impl From<EngineError> for LayerError {
    fn from(e: EngineError) -> Self {
        LayerError::Engine(e)
    }
}

/// Where the coverage raster lives on the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSlot {
    pub source_id: String,
    pub layer_id: String,
    pub tile_size: u32,
}

impl Default for RasterSlot {
    fn default() -> Self {
        Self {
            source_id: "gee-lulc".to_string(),
            layer_id: "gee-lulc-layer".to_string(),
            tile_size: 256,
        }
    }
}

/// One boundary layer install: what to fetch, where to put it, and which
/// layers to tear down first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorInstall {
    pub query: VectorQuery,
    pub slot: LayerSlot,
    pub remove_first: Vec<String>,
}

impl VectorInstall {
    pub fn new(query: VectorQuery, slot: LayerSlot) -> Self {
        Self {
            query,
            slot,
            remove_first: Vec::new(),
        }
    }

    pub fn removing(mut self, layer_id: impl Into<String>) -> Self {
        self.remove_first.push(layer_id.into());
        self
    }
}

/// Installs, replaces and removes boundary and coverage layers.
///
/// Every fill layer gets an emphasis companion reading the same source;
/// emphasis layers are kept on top of the stack and are always removed
/// before their base, the source last.
pub struct LayerManager<M> {
    map: Rc<RefCell<M>>,
    coordinator: Rc<RequestCoordinator>,
    vector: Rc<dyn VectorService>,
    raster: Rc<dyn RasterService>,
    interaction: InteractionHandler,
    schema: HierarchySchema,
    raster_slot: RasterSlot,
    regions: RefCell<BTreeMap<String, RegionIndex>>,
}

impl<M: MapEngine> LayerManager<M> {
    pub fn new(
        map: Rc<RefCell<M>>,
        coordinator: Rc<RequestCoordinator>,
        vector: Rc<dyn VectorService>,
        raster: Rc<dyn RasterService>,
        schema: HierarchySchema,
    ) -> Self {
        Self {
            map,
            coordinator,
            vector,
            raster,
            interaction: InteractionHandler::new(),
            schema,
            raster_slot: RasterSlot::default(),
            regions: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_raster_slot(mut self, slot: RasterSlot) -> Self {
        self.raster_slot = slot;
        self
    }

    pub fn map(&self) -> &Rc<RefCell<M>> {
        &self.map
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    pub fn interaction(&self) -> &InteractionHandler {
        &self.interaction
    }

    pub fn schema(&self) -> &HierarchySchema {
        &self.schema
    }

    pub fn raster_slot(&self) -> &RasterSlot {
        &self.raster_slot
    }

    /// Resolves the collection, then tears down `remove_first` and creates or
    /// refreshes the slot's source and layers without yielding in between.
    /// A failed or cancelled fetch leaves the map as it was.
    pub async fn install_vector_layer(
        &self,
        install: &VectorInstall,
    ) -> Result<FeatureCollection, LayerError> {
        let generation = self.coordinator.generation();
        let mut data = self
            .coordinator
            .vector(self.vector.as_ref(), &install.query)
            .await?;
        self.coordinator.ensure_current(generation)?;

        for id in &install.remove_first {
            self.remove_layer_and_source(id)?;
        }
        let assigned = data.assign_stable_ids();
        let slot = &install.slot;
        {
            let mut map = self.map.borrow_mut();
            apply_boundary_source(&mut *map, slot, &data)?;
            self.interaction.attach(&mut *map, &slot.layer_id);
            raise_emphasis_layers(&mut *map)?;
        }
        let index = RegionIndex::build(&data, &self.schema);
        info!(
            layer = %slot.layer_id,
            features = data.len(),
            regions = index.len(),
            assigned_ids = assigned,
            "installed boundary layer"
        );
        self.regions.borrow_mut().insert(slot.source_id.clone(), index);
        Ok(data)
    }

    /// Replaces the coverage raster. A blank tile URL (no coverage) leaves the
    /// map untouched and returns `false`.
    pub async fn install_raster_overlay(&self, query: &RasterQuery) -> Result<bool, LayerError> {
        let generation = self.coordinator.generation();
        let tile_url = self.coordinator.raster(self.raster.as_ref(), query).await?;
        self.coordinator.ensure_current(generation)?;

        if tile_url.trim().is_empty() {
            debug!(query = %query.query_string(), "no coverage for query");
            return Ok(false);
        }

        let slot = &self.raster_slot;
        let mut map = self.map.borrow_mut();
        if map.has_layer(&slot.layer_id) {
            map.remove_layer(&slot.layer_id)?;
        }
        if map.has_source(&slot.source_id) {
            map.remove_source(&slot.source_id)?;
        }
        map.add_source(&slot.source_id, SourceSpec::raster(tile_url, slot.tile_size))?;

        // Beneath the lowest boundary fill so every outline stays visible.
        let before = map
            .layers()
            .into_iter()
            .find(|l| l.kind == LayerKind::Fill)
            .map(|l| l.id);
        map.add_layer(
            LayerSpec::raster(&slot.layer_id, &slot.source_id),
            before.as_deref(),
        )?;
        raise_emphasis_layers(&mut *map)?;
        info!(query = %query.query_string(), below = ?before, "installed coverage raster");
        Ok(true)
    }

    /// Removes every layer bound to `layer_id`'s source (emphasis first), then
    /// the source. Returns `false` when nothing matched.
    pub fn remove_layer_and_source(&self, layer_id: &str) -> Result<bool, EngineError> {
        let mut map = self.map.borrow_mut();
        let stack = map.layers();
        let emphasis = emphasis_layer_id(layer_id);
        let source = stack
            .iter()
            .find(|l| l.id == layer_id)
            .or_else(|| stack.iter().find(|l| l.id == emphasis))
            .map(|l| l.source.clone())
            .or_else(|| conventional_source_id(layer_id).filter(|s| map.has_source(s)));
        let Some(source) = source else {
            return Ok(false);
        };

        let bound: Vec<&LayerBinding> = stack.iter().filter(|l| l.source == source).collect();
        let (emphasis_layers, base_layers): (Vec<&LayerBinding>, Vec<&LayerBinding>) =
            bound.into_iter().partition(|l| is_emphasis_layer(&l.id));
        for layer in emphasis_layers.iter().chain(base_layers.iter()) {
            map.remove_layer(&layer.id)?;
        }
        if map.has_source(&source) {
            map.remove_source(&source)?;
        }
        drop(map);

        self.regions.borrow_mut().remove(&source);
        debug!(layer = layer_id, source = %source, "removed layer and source");
        Ok(true)
    }

    pub fn remove_slot(&self, slot: &LayerSlot) -> Result<bool, EngineError> {
        self.remove_layer_and_source(&slot.layer_id)
    }

    /// Moves every emphasis layer to the top of the stack.
    pub fn raise_emphasis_layers(&self) -> Result<(), EngineError> {
        raise_emphasis_layers(&mut *self.map.borrow_mut())
    }

    /// Resolves once `source_id` reports its data loaded.
    pub async fn wait_for_source(&self, source_id: &str) {
        let loaded = self.map.borrow_mut().source_loaded(source_id);
        loaded.await;
    }

    /// Fits the viewport to `region` as found in `source_id`.
    ///
    /// Looks in the source's region index first, then scans the source's
    /// features. Returns `false` when no matching feature has bounds.
    pub fn fit_to_region(&self, source_id: &str, region: &Region, options: FitOptions) -> bool {
        let indexed = self
            .regions
            .borrow()
            .get(source_id)
            .and_then(|idx| idx.find(region))
            .and_then(|r| r.bounds);
        let bounds = indexed.or_else(|| {
            let map = self.map.borrow();
            map.source_data(source_id).and_then(|data| {
                data.features
                    .iter()
                    .filter(|f| Region::from_properties(f, &self.schema).as_ref() == Some(region))
                    .find_map(|f| f.bounds())
            })
        });
        match bounds {
            Some(bounds) => {
                self.fit_bounds(bounds, options);
                true
            }
            None => {
                debug!(source = source_id, region = %region, "no bounds to fit");
                false
            }
        }
    }

    pub fn fit_bounds(&self, bounds: Aabb2, options: FitOptions) {
        self.map.borrow_mut().fit_bounds(bounds, options);
    }

    pub fn jump_to(&self, camera: Camera) {
        self.map.borrow_mut().jump_to(camera);
    }

    pub fn region_at(&self, source_id: &str, feature: FeatureId) -> Option<IndexedRegion> {
        self.regions
            .borrow()
            .get(source_id)
            .and_then(|idx| idx.get(feature))
            .cloned()
    }

    pub fn find_region(&self, source_id: &str, region: &Region) -> Option<IndexedRegion> {
        self.regions
            .borrow()
            .get(source_id)
            .and_then(|idx| idx.find(region))
            .cloned()
    }

    /// Routes a pointer event through the interaction handler. A click on a
    /// placed feature returns the region to drill into.
    pub fn dispatch_pointer(&self, event: &PointerEvent) -> Option<IndexedRegion> {
        let mut map = self.map.borrow_mut();
        let regions = self.regions.borrow();
        self.interaction.handle(&mut *map, event, |source, fid| {
            regions.get(source).and_then(|idx| idx.get(fid)).cloned()
        })
    }
}

fn apply_boundary_source(
    map: &mut dyn MapEngine,
    slot: &LayerSlot,
    data: &FeatureCollection,
) -> Result<(), EngineError> {
    let emphasis = slot.emphasis_layer_id();
    if map.has_source(&slot.source_id) {
        map.set_source_data(&slot.source_id, data.clone())?;
        if !map.has_layer(&slot.layer_id) {
            map.add_layer(LayerSpec::fill(&slot.layer_id, &slot.source_id), None)?;
        }
        if map.has_layer(&emphasis) {
            map.set_paint(&emphasis, Paint::hover_outline())?;
        } else {
            map.add_layer(LayerSpec::emphasis(&slot.layer_id, &slot.source_id), None)?;
        }
    } else {
        map.add_source(
            &slot.source_id,
            SourceSpec::GeoJson {
                data: data.clone(),
            },
        )?;
        map.add_layer(LayerSpec::fill(&slot.layer_id, &slot.source_id), None)?;
        map.add_layer(LayerSpec::emphasis(&slot.layer_id, &slot.source_id), None)?;
    }
    Ok(())
}

fn raise_emphasis_layers(map: &mut dyn MapEngine) -> Result<(), EngineError> {
    let ids: Vec<String> = map
        .layers()
        .into_iter()
        .filter(|l| is_emphasis_layer(&l.id))
        .map(|l| l.id)
        .collect();
    for id in ids {
        map.move_layer_to_top(&id)?;
    }
    Ok(())
}
