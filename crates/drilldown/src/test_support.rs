//! Fake services and a wired explorer over a small three-level atlas.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use foundation::{Clock, FeatureId, ManualClock, Timestamp};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use layers::{HeadlessMap, PointerEvent, PointerKind};
use scene::{Feature, FeatureCollection, Geometry, HierarchySchema, Properties, RegionLevel};
use serde_json::Value;
use storage::InMemoryStore;
use streaming::{FetchError, RasterQuery, RasterService, VectorQuery, VectorService};
use tokio::sync::oneshot;

use crate::config::ExplorerConfig;
use crate::explorer::{Explorer, ExplorerParts};
use crate::url_state::MemoryUrlState;

/// (layer, ancestry, lower-left corner, size)
const ATLAS: &[(&str, &[&str], [f64; 2], f64)] = &[
    ("L1", &["Alpha"], [0.0, 0.0], 10.0),
    ("L1", &["Delta"], [20.0, 0.0], 10.0),
    ("L2", &["Alpha", "Beta"], [0.0, 0.0], 5.0),
    ("L2", &["Alpha", "Zeta"], [5.0, 0.0], 5.0),
    ("L2", &["Delta", "Omega"], [20.0, 0.0], 5.0),
    ("L3", &["Alpha", "Beta", "Gamma"], [0.0, 0.0], 2.0),
    ("L3", &["Alpha", "Beta", "Eta"], [2.0, 0.0], 2.0),
    ("L3", &["Alpha", "Zeta", "Iota"], [5.0, 0.0], 2.0),
];

fn square([x, y]: [f64; 2], size: f64) -> Geometry {
    Geometry::Polygon(vec![vec![
        vec![x, y],
        vec![x + size, y],
        vec![x + size, y + size],
        vec![x, y + size],
        vec![x, y],
    ]])
}

/// Boundary service over [`ATLAS`]. Fetches can be held until released, or
/// refused outright.
#[derive(Default)]
pub struct Atlas {
    calls: RefCell<Vec<String>>,
    holding: Cell<bool>,
    held: RefCell<Vec<oneshot::Sender<()>>>,
    failing: Cell<bool>,
}

impl Atlas {
    /// Cache keys of every fetch issued, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn hold(&self) {
        self.holding.set(true);
    }

    pub fn fail(&self) {
        self.failing.set(true);
    }

    /// Stops holding and lets every held fetch complete.
    pub fn release(&self) -> usize {
        self.holding.set(false);
        let held: Vec<_> = self.held.borrow_mut().drain(..).collect();
        let n = held.len();
        for tx in held {
            let _ = tx.send(());
        }
        n
    }

    fn collection(query: &VectorQuery) -> FeatureCollection {
        let schema = HierarchySchema::new("level1", "level2", "level3");
        let clauses = query
            .filter
            .as_ref()
            .map(|f| f.clauses().to_vec())
            .unwrap_or_default();
        let features = ATLAS
            .iter()
            .filter(|(layer, ..)| *layer == query.layer_name)
            .filter_map(|(_, ancestry, corner, size)| {
                let mut props = Properties::new();
                for (level, value) in RegionLevel::ALL.into_iter().zip(ancestry.iter()) {
                    props.insert(schema.field(level).to_string(), Value::from(*value));
                }
                let matches = clauses
                    .iter()
                    .all(|(k, v)| props.get(k).and_then(Value::as_str) == Some(v.as_str()));
                matches.then(|| Feature::new(Some(square(*corner, *size)), props))
            })
            .collect();
        FeatureCollection::new(features)
    }
}

impl VectorService for Atlas {
    fn fetch(
        &self,
        query: &VectorQuery,
    ) -> LocalBoxFuture<'static, Result<FeatureCollection, FetchError>> {
        self.calls.borrow_mut().push(query.cache_key());
        if self.failing.get() {
            let err = FetchError::Network("connection reset by peer".to_string());
            return async move { Err(err) }.boxed_local();
        }
        let fc = Self::collection(query);
        if !self.holding.get() {
            return async move { Ok(fc) }.boxed_local();
        }
        let (tx, rx) = oneshot::channel();
        self.held.borrow_mut().push(tx);
        async move {
            let _ = rx.await;
            Ok(fc)
        }
        .boxed_local()
    }
}

/// Tile service answering with a URL derived from the query.
#[derive(Default)]
pub struct Coverage {
    calls: RefCell<Vec<String>>,
    failing: Cell<bool>,
}

impl Coverage {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn fail(&self) {
        self.failing.set(true);
    }
}

impl RasterService for Coverage {
    fn fetch(&self, query: &RasterQuery) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        self.calls.borrow_mut().push(query.cache_key());
        let result = if self.failing.get() {
            Err(FetchError::Status {
                url: "https://tiles.test/lulc".to_string(),
                status: 503,
            })
        } else {
            Ok(format!("https://tiles.test/{}/{{z}}/{{x}}/{{y}}", query.query_string()))
        };
        async move { result }.boxed_local()
    }
}

pub fn config() -> ExplorerConfig {
    let mut config = ExplorerConfig::default();
    config.hierarchy = HierarchySchema::new("level1", "level2", "level3");
    config.levels.level1.layer_name = "L1".to_string();
    config.levels.level2.layer_name = "L2".to_string();
    config.levels.level3.layer_name = "L3".to_string();
    config
}

pub fn click(layer_id: &str, feature: u64) -> PointerEvent {
    PointerEvent::new(layer_id, PointerKind::Click, Some(FeatureId(feature)), [0.0, 0.0])
}

pub fn explorer() -> (Explorer<HeadlessMap>, Rc<Atlas>, Rc<Coverage>, MemoryUrlState) {
    explorer_with(MemoryUrlState::new(), false)
}

pub fn explorer_with(
    url: MemoryUrlState,
    deferred_loading: bool,
) -> (Explorer<HeadlessMap>, Rc<Atlas>, Rc<Coverage>, MemoryUrlState) {
    let config = config();
    let mut map = HeadlessMap::new(config.viewport.home_camera(), config.viewport.min_zoom);
    if deferred_loading {
        map = map.with_deferred_loading();
    }
    let atlas = Rc::new(Atlas::default());
    let coverage = Rc::new(Coverage::default());
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(Timestamp(0)));
    let explorer = Explorer::new(
        config,
        ExplorerParts {
            map,
            vector: atlas.clone(),
            raster: coverage.clone(),
            store: Box::new(InMemoryStore::new()),
            clock,
            url: Box::new(url.clone()),
        },
    );
    (explorer, atlas, coverage, url)
}
