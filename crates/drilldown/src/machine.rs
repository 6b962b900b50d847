//! Drill-down state machine.
//!
//! The breadcrumb is the state: `Home` when empty, `AtLevelN` at depth N.
//! Each transition captures the request generation when it starts and
//! re-checks it after every await; a transition overtaken by `home` stops
//! with a cancellation error and touches nothing further. Any other failure
//! puts back the previous session, camera and coverage.

use std::cell::RefCell;

use foundation::Aabb2;
use layers::{Camera, EngineError, LayerError, LayerManager, LayerSlot, MapEngine, VectorInstall};
use scene::{Breadcrumb, DrillState, IndexedRegion, Region, RegionLevel};
use streaming::{FeatureFilter, FetchError, Generation, RasterQuery, VectorQuery};
use tracing::{debug, info, warn};

use crate::config::ExplorerConfig;
use crate::url_state::{SessionSnapshot, UrlStateSync};

#[derive(Debug, Clone, PartialEq)]
pub enum DrillError {
    Layer(LayerError),
    YearOutOfRange { year: i32, min: i32, max: i32 },
    /// A breadcrumb level that is not part of the current trail.
    NotInTrail(RegionLevel),
}

impl DrillError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DrillError::Layer(e) if e.is_cancelled())
    }
}

impl std::fmt::Display for DrillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrillError::Layer(e) => write!(f, "{e}"),
            DrillError::YearOutOfRange { year, min, max } => {
                write!(f, "year {year} outside {min}..={max}")
            }
            DrillError::NotInTrail(level) => write!(f, "{level} is not in the breadcrumb"),
        }
    }
}

impl std::error::Error for DrillError {}

impl From<LayerError> for DrillError {
    fn from(e: LayerError) -> Self {
        DrillError::Layer(e)
    }
}

impl From<FetchError> for DrillError {
    fn from(e: FetchError) -> Self {
        DrillError::Layer(LayerError::Fetch(e))
    }
}

impl From<EngineError> for DrillError {
    fn from(e: EngineError) -> Self {
        DrillError::Layer(LayerError::Engine(e))
    }
}

/// What a failed transition returns to.
struct Checkpoint {
    session: SessionSnapshot,
    camera: Camera,
}

pub struct Drilldown<M> {
    layers: LayerManager<M>,
    config: ExplorerConfig,
    session: RefCell<SessionSnapshot>,
    url: RefCell<Box<dyn UrlStateSync>>,
}

impl<M: MapEngine> Drilldown<M> {
    pub fn new(layers: LayerManager<M>, config: ExplorerConfig, url: Box<dyn UrlStateSync>) -> Self {
        let session = SessionSnapshot::new(config.years.default);
        Self {
            layers,
            config,
            session: RefCell::new(session),
            url: RefCell::new(url),
        }
    }

    pub fn layers(&self) -> &LayerManager<M> {
        &self.layers
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn session(&self) -> SessionSnapshot {
        self.session.borrow().clone()
    }

    pub fn breadcrumb(&self) -> Breadcrumb {
        self.session.borrow().breadcrumb.clone()
    }

    pub fn state(&self) -> DrillState {
        self.session.borrow().breadcrumb.state()
    }

    pub fn year(&self) -> i32 {
        self.session.borrow().year
    }

    /// Restores the URL session once, then shows either the restored region
    /// or the home view.
    pub async fn bootstrap(&self) -> Result<(), DrillError> {
        let restored = self.url.borrow().read();
        if let Some(mut snapshot) = restored {
            let years = self.config.years;
            if !years.contains(snapshot.year) {
                warn!(
                    year = snapshot.year,
                    fallback = years.default,
                    "restored year out of range"
                );
                snapshot.year = years.default;
            }
            *self.session.borrow_mut() = snapshot;
            self.publish();
        }

        let generation = self.layers.coordinator().generation();
        let region = self.breadcrumb().region();
        info!(state = ?self.state(), year = self.year(), "bootstrapping");
        match region {
            Some(region) => self.focus_region(generation, &region, &[]).await,
            None => self.enter_home(generation).await,
        }
    }

    /// Cancels everything in flight and returns to the unfiltered level-1 view.
    pub async fn home(&self) -> Result<(), DrillError> {
        let generation = self.layers.coordinator().cancel_all();
        for level in RegionLevel::ALL {
            self.layers.remove_slot(&self.config.levels.slot(level))?;
            self.layers.remove_slot(&self.config.levels.preview_slot(level))?;
        }
        {
            let mut session = self.session.borrow_mut();
            session.breadcrumb.clear();
            session.selection = None;
        }
        self.layers.jump_to(self.config.viewport.home_camera());
        self.publish();
        info!(generation = %generation, "home");
        self.enter_home(generation).await
    }

    /// Drills into a clicked feature's region.
    pub async fn drill_down(&self, hit: IndexedRegion) -> Result<(), DrillError> {
        let generation = self.layers.coordinator().generation();
        let previous = self.checkpoint();
        let region = hit.region;
        {
            let mut session = self.session.borrow_mut();
            session.breadcrumb = Breadcrumb::from_region(&region);
            session.selection = region.value(RegionLevel::Level1).map(str::to_string);
        }
        self.publish();
        info!(region = %region, level = %region.level(), "drill down");

        let result = self.drill_steps(generation, &region, hit.bounds).await;
        self.settle(generation, previous, result).await
    }

    /// Breadcrumb click: returns to `level` of the current trail.
    pub async fn drill_up(&self, level: RegionLevel) -> Result<(), DrillError> {
        let generation = self.layers.coordinator().generation();
        let region = self
            .breadcrumb()
            .region_at(level)
            .ok_or(DrillError::NotInTrail(level))?;
        let previous = self.checkpoint();
        self.session.borrow_mut().breadcrumb.truncate(level);
        self.publish();
        info!(region = %region, level = %level, "drill up");

        let deeper: Vec<RegionLevel> = RegionLevel::ALL.into_iter().filter(|l| *l > level).collect();
        let result = self.focus_region(generation, &region, &deeper).await;
        self.settle(generation, previous, result).await
    }

    /// Region list selection of a level-1 region.
    pub async fn select_region(&self, name: &str) -> Result<(), DrillError> {
        let generation = self.layers.coordinator().generation();
        let previous = self.checkpoint();
        let region = Region::Level1 {
            level1: name.to_string(),
        };
        {
            let mut session = self.session.borrow_mut();
            session.breadcrumb = Breadcrumb::from_region(&region);
            session.selection = Some(name.to_string());
        }
        self.publish();
        info!(region = %region, "region selected");

        let result = self
            .focus_region(generation, &region, &[RegionLevel::Level2, RegionLevel::Level3])
            .await;
        self.settle(generation, previous, result).await
    }

    /// Changes the coverage year, keeping the current trail.
    pub async fn set_year(&self, year: i32) -> Result<(), DrillError> {
        let years = self.config.years;
        if !years.contains(year) {
            return Err(DrillError::YearOutOfRange {
                year,
                min: years.min,
                max: years.max,
            });
        }
        let generation = self.layers.coordinator().generation();
        self.session.borrow_mut().year = year;
        self.publish();
        info!(year, "year changed");

        let region = self.breadcrumb().region();
        self.install_raster(generation, region.as_ref()).await
    }

    /// Zooms to the clicked feature, then swaps the parent boundaries for the
    /// next level down. At the deepest level the region is reloaded alone.
    async fn drill_steps(
        &self,
        generation: Generation,
        region: &Region,
        bounds: Option<Aabb2>,
    ) -> Result<(), DrillError> {
        if let Some(bounds) = bounds {
            self.layers
                .fit_bounds(bounds, self.config.viewport.feature_fit.options());
        }
        self.install_raster(generation, Some(region)).await?;

        let levels = &self.config.levels;
        let install = match region.level() {
            RegionLevel::Level1 => self
                .boundaries(RegionLevel::Level2, Some(region), levels.slot(RegionLevel::Level2))
                .removing(levels.slot(RegionLevel::Level1).layer_id),
            RegionLevel::Level2 => self
                .boundaries(RegionLevel::Level3, Some(region), levels.slot(RegionLevel::Level3))
                .removing(levels.slot(RegionLevel::Level2).layer_id)
                .removing(levels.slot(RegionLevel::Level1).layer_id),
            RegionLevel::Level3 => RegionLevel::ALL.into_iter().fold(
                self.boundaries(RegionLevel::Level3, Some(region), levels.slot(RegionLevel::Level3)),
                |install, level| install.removing(levels.slot(level).layer_id),
            ),
        };
        self.install_boundaries(generation, install).await
    }

    async fn enter_home(&self, generation: Generation) -> Result<(), DrillError> {
        let install = self.boundaries(
            RegionLevel::Level1,
            None,
            self.config.levels.slot(RegionLevel::Level1),
        );
        self.install_boundaries(generation, install).await?;
        self.install_raster(generation, None).await
    }

    /// Locates `region` through a temporary preview layer, then shows the
    /// next level down (or, at the deepest level, the region itself).
    /// The `clear` slots go when the preview arrives.
    async fn focus_region(
        &self,
        generation: Generation,
        region: &Region,
        clear: &[RegionLevel],
    ) -> Result<(), DrillError> {
        let preview = self.config.levels.preview_slot(region.level());
        let result = self.focus_steps(generation, region, &preview, clear).await;
        match &result {
            Err(e) if e.is_cancelled() => {}
            _ => {
                if let Err(e) = self.layers.remove_slot(&preview) {
                    warn!(layer = %preview.layer_id, error = %e, "failed to discard preview");
                }
            }
        }
        result
    }

    async fn focus_steps(
        &self,
        generation: Generation,
        region: &Region,
        preview: &LayerSlot,
        clear: &[RegionLevel],
    ) -> Result<(), DrillError> {
        let level = region.level();
        let levels = &self.config.levels;

        let install = clear.iter().fold(
            self.boundaries(level, Some(region), preview.clone()),
            |install, l| install.removing(levels.slot(*l).layer_id),
        );
        self.install_boundaries(generation, install).await?;
        self.layers.wait_for_source(&preview.source_id).await;
        self.guard(generation)?;
        self.layers.fit_to_region(
            &preview.source_id,
            region,
            self.config.viewport.region_fit.options(),
        );

        self.install_raster(generation, Some(region)).await?;

        let install = match level.deeper() {
            Some(child) => self
                .boundaries(child, Some(region), levels.slot(child))
                .removing(levels.slot(level).layer_id),
            None => self
                .boundaries(level, Some(region), levels.slot(level))
                .removing(levels.slot(level).layer_id),
        };
        self.install_boundaries(generation, install).await
    }

    fn boundaries(&self, level: RegionLevel, region: Option<&Region>, slot: LayerSlot) -> VectorInstall {
        let layer_name = &self.config.levels.get(level).layer_name;
        let query = match region {
            Some(region) => VectorQuery::filtered(
                layer_name.clone(),
                FeatureFilter::for_region(region, &self.config.hierarchy),
            ),
            None => VectorQuery::all(layer_name.clone()),
        };
        VectorInstall::new(query, slot)
    }

    async fn install_boundaries(
        &self,
        generation: Generation,
        install: VectorInstall,
    ) -> Result<(), DrillError> {
        self.guard(generation)?;
        self.layers.install_vector_layer(&install).await?;
        self.guard(generation)
    }

    /// Coverage failures other than cancellation are logged and skipped.
    async fn install_raster(
        &self,
        generation: Generation,
        region: Option<&Region>,
    ) -> Result<(), DrillError> {
        self.guard(generation)?;
        let year = self.year();
        let query = match region {
            Some(region) => RasterQuery::for_region(region, &self.config.hierarchy, year),
            None => RasterQuery::unfiltered(year),
        };
        match self.layers.install_raster_overlay(&query).await {
            Ok(true) => {}
            Ok(false) => debug!(query = %query.query_string(), "no coverage"),
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => warn!(query = %query.query_string(), error = %e, "coverage unavailable"),
        }
        self.guard(generation)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            session: self.session(),
            camera: self.layers.map().borrow().camera(),
        }
    }

    /// Puts back the session, camera and coverage of `previous` when a
    /// transition failed for any reason other than cancellation.
    async fn settle(
        &self,
        generation: Generation,
        previous: Checkpoint,
        result: Result<(), DrillError>,
    ) -> Result<(), DrillError> {
        let Err(error) = result else {
            return Ok(());
        };
        if error.is_cancelled() {
            return Err(error);
        }
        info!(breadcrumb = %previous.session.breadcrumb, "restoring previous view");
        let region = previous.session.breadcrumb.region();
        *self.session.borrow_mut() = previous.session;
        self.publish();
        self.layers.jump_to(previous.camera);
        if let Err(e) = self.install_raster(generation, region.as_ref()).await {
            debug!(error = %e, "coverage restore superseded");
        }
        Err(error)
    }

    fn guard(&self, generation: Generation) -> Result<(), DrillError> {
        Ok(self.layers.coordinator().ensure_current(generation)?)
    }

    fn publish(&self) {
        let snapshot = self.session.borrow().clone();
        self.url.borrow_mut().write(&snapshot);
    }
}
