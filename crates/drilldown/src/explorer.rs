use std::cell::RefCell;
use std::rc::Rc;

use foundation::Clock;
use layers::{LayerManager, MapEngine, PointerEvent, PointerKind};
use scene::{Breadcrumb, DrillState, RegionLevel};
use storage::DurableStore;
use streaming::{RasterService, RegionCache, RequestCoordinator, VectorService};
use tracing::{debug, info, warn};

use crate::config::ExplorerConfig;
use crate::machine::{DrillError, Drilldown};
use crate::url_state::{SessionSnapshot, UrlStateSync};

/// Everything the explorer needs from its host.
pub struct ExplorerParts<M> {
    pub map: M,
    pub vector: Rc<dyn VectorService>,
    pub raster: Rc<dyn RasterService>,
    pub store: Box<dyn DurableStore>,
    pub clock: Rc<dyn Clock>,
    pub url: Box<dyn UrlStateSync>,
}

/// Entry point for hosts: owns the component graph and turns user actions
/// into state machine transitions.
///
/// Actions never fail outward. A transition superseded by Home is logged at
/// debug, any other failure at warn, and the action reports `false`.
pub struct Explorer<M> {
    drilldown: Drilldown<M>,
}

impl<M: MapEngine> Explorer<M> {
    pub fn new(config: ExplorerConfig, parts: ExplorerParts<M>) -> Self {
        let cache = RegionCache::load(config.cache.clone(), parts.clock, parts.store);
        let coordinator = Rc::new(RequestCoordinator::new(cache));
        let layers = LayerManager::new(
            Rc::new(RefCell::new(parts.map)),
            coordinator,
            parts.vector,
            parts.raster,
            config.hierarchy.clone(),
        )
        .with_raster_slot(config.raster.slot());
        Self {
            drilldown: Drilldown::new(layers, config, parts.url),
        }
    }

    pub fn map(&self) -> &Rc<RefCell<M>> {
        self.drilldown.layers().map()
    }

    pub fn drilldown(&self) -> &Drilldown<M> {
        &self.drilldown
    }

    pub fn breadcrumb(&self) -> Breadcrumb {
        self.drilldown.breadcrumb()
    }

    pub fn state(&self) -> DrillState {
        self.drilldown.state()
    }

    pub fn year(&self) -> i32 {
        self.drilldown.year()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.drilldown.session()
    }

    pub async fn start(&self) -> bool {
        report("start", self.drilldown.bootstrap().await)
    }

    pub async fn home(&self) -> bool {
        report("home", self.drilldown.home().await)
    }

    /// Applies a pointer event; a click on a boundary feature drills into it.
    pub async fn pointer(&self, event: &PointerEvent) -> bool {
        let hit = self.drilldown.layers().dispatch_pointer(event);
        match (event.kind, hit) {
            (PointerKind::Click, Some(hit)) => {
                report("drill down", self.drilldown.drill_down(hit).await)
            }
            _ => true,
        }
    }

    pub async fn breadcrumb_clicked(&self, level: RegionLevel) -> bool {
        report("drill up", self.drilldown.drill_up(level).await)
    }

    pub async fn year_changed(&self, year: i32) -> bool {
        report("year change", self.drilldown.set_year(year).await)
    }

    pub async fn region_selected(&self, name: &str) -> bool {
        report("region selection", self.drilldown.select_region(name).await)
    }

    /// Drops every cached collection and tile URL, in memory and on disk.
    pub fn clear_cache(&self) {
        self.drilldown.layers().coordinator().clear_cache();
        info!("cache cleared");
    }
}

fn report(action: &str, result: Result<(), DrillError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_cancelled() => {
            debug!(action, "superseded");
            false
        }
        Err(e) => {
            warn!(action, error = %e, "action failed");
            false
        }
    }
}
