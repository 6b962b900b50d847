use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use foundation::Clock;
use scene::FeatureCollection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storage::DurableStore;
use tracing::{debug, warn};

/// Two days.
pub const DEFAULT_TTL_MS: u64 = 2 * 24 * 60 * 60 * 1000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Vector,
    Raster,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Vector => write!(f, "vector"),
            Namespace::Raster => write!(f, "raster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub vector_storage_key: String,
    pub raster_storage_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            vector_storage_key: "mapCache_geojson".to_string(),
            raster_storage_key: "mapCache_gee".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn storage_key(&self, ns: Namespace) -> &str {
        match ns {
            Namespace::Vector => &self.vector_storage_key,
            Namespace::Raster => &self.raster_storage_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "expiresAt")]
    pub expires_at: u64,
}

/// Values the cache knows how to store, one namespace per type.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + 'static {
    const NAMESPACE: Namespace;

    /// Whether a fetched value is worth remembering.
    fn is_cacheable(&self) -> bool {
        true
    }

    fn shelf(cache: &RegionCache) -> &Shelf<Self>;
    fn shelf_mut(cache: &mut RegionCache) -> &mut Shelf<Self>;
}

impl CacheValue for FeatureCollection {
    const NAMESPACE: Namespace = Namespace::Vector;

    fn shelf(cache: &RegionCache) -> &Shelf<Self> {
        &cache.vector
    }

    fn shelf_mut(cache: &mut RegionCache) -> &mut Shelf<Self> {
        &mut cache.vector
    }
}

/// Raster tile-URL templates. Blank means "no coverage" and is never cached.
impl CacheValue for String {
    const NAMESPACE: Namespace = Namespace::Raster;

    fn is_cacheable(&self) -> bool {
        !self.trim().is_empty()
    }

    fn shelf(cache: &RegionCache) -> &Shelf<Self> {
        &cache.raster
    }

    fn shelf_mut(cache: &mut RegionCache) -> &mut Shelf<Self> {
        &mut cache.raster
    }
}

/// One namespace's entries.
#[derive(Debug, Clone)]
pub struct Shelf<V> {
    entries: BTreeMap<String, CacheEntry<V>>,
}

impl<V> Default for Shelf<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: CacheValue> Shelf<V> {
    fn load(store: &dyn DurableStore, key: &str, now: u64) -> Self {
        let raw = match store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                warn!(key, error = %e, "failed to read cache namespace; starting empty");
                return Self::default();
            }
        };
        let mut entries: BTreeMap<String, CacheEntry<V>> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key, error = %e, "discarding corrupt cache namespace");
                return Self::default();
            }
        };
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        debug!(
            key,
            kept = entries.len(),
            expired = before - entries.len(),
            "loaded cache namespace"
        );
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// TTL cache for remote region data, mirrored to durable storage.
///
/// The in-memory maps are authoritative; the durable store only survives
/// restarts. Storage failures are logged and otherwise ignored.
pub struct RegionCache {
    config: CacheConfig,
    clock: Rc<dyn Clock>,
    store: Box<dyn DurableStore>,
    vector: Shelf<FeatureCollection>,
    raster: Shelf<String>,
}

impl std::fmt::Debug for RegionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionCache")
            .field("config", &self.config)
            .field("vector", &self.vector.len())
            .field("raster", &self.raster.len())
            .finish()
    }
}

impl RegionCache {
    /// Restores both namespaces, dropping expired and corrupt content.
    pub fn load(config: CacheConfig, clock: Rc<dyn Clock>, store: Box<dyn DurableStore>) -> Self {
        let now = clock.now().as_millis();
        let vector = Shelf::load(store.as_ref(), &config.vector_storage_key, now);
        let raster = Shelf::load(store.as_ref(), &config.raster_storage_key, now);
        Self {
            config,
            clock,
            store,
            vector,
            raster,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Unexpired value for `key`. An expired entry is evicted, never served.
    pub fn get<V: CacheValue>(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now().as_millis();
        let shelf = V::shelf_mut(self);
        let expires_at = shelf.entries.get(key)?.expires_at;
        if now < expires_at {
            return shelf.entries.get(key).map(|e| e.value.clone());
        }
        shelf.entries.remove(key);
        debug!(namespace = %V::NAMESPACE, key, "evicted expired entry");
        None
    }

    /// Non-mutating lookup; expired entries read as absent.
    pub fn peek<V: CacheValue>(&self, key: &str) -> Option<&V> {
        let now = self.clock.now().as_millis();
        V::shelf(self)
            .entries
            .get(key)
            .filter(|e| now < e.expires_at)
            .map(|e| &e.value)
    }

    /// Stores `value` for one TTL and persists the namespace.
    pub fn set<V: CacheValue>(&mut self, key: impl Into<String>, value: V) {
        let expires_at = self.clock.now().saturating_add(self.config.ttl()).as_millis();
        V::shelf_mut(self)
            .entries
            .insert(key.into(), CacheEntry { value, expires_at });
        self.persist::<V>();
    }

    /// Empties both namespaces and their durable copies.
    pub fn clear(&mut self) {
        self.vector = Shelf::default();
        self.raster = Shelf::default();
        for ns in [Namespace::Vector, Namespace::Raster] {
            let key = self.config.storage_key(ns).to_string();
            if let Err(e) = self.store.remove(&key) {
                warn!(namespace = %ns, error = %e, "failed to clear durable cache");
            }
        }
    }

    pub fn len(&self, ns: Namespace) -> usize {
        match ns {
            Namespace::Vector => self.vector.len(),
            Namespace::Raster => self.raster.len(),
        }
    }

    fn persist<V: CacheValue>(&mut self) {
        let key = self.config.storage_key(V::NAMESPACE).to_string();
        let raw = match serde_json::to_string(&V::shelf(self).entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(namespace = %V::NAMESPACE, error = %e, "failed to encode cache");
                return;
            }
        };
        if let Err(e) = self.store.set(&key, &raw) {
            warn!(namespace = %V::NAMESPACE, error = %e, "failed to persist cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheConfig, CacheValue, Namespace, RegionCache};
    use foundation::{Clock, ManualClock, Timestamp};
    use pretty_assertions::assert_eq;
    use scene::{Feature, FeatureCollection};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use storage::{DurableStore, InMemoryStore, StorageError};

    /// Store handle tests can keep inspecting after handing a box to the cache.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<InMemoryStore>>);

    impl DurableStore for SharedStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.borrow().get(key)
        }
        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.borrow_mut().set(key, value)
        }
        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            self.0.borrow_mut().remove(key)
        }
    }

    fn cache_with(store: impl DurableStore + 'static, clock: &ManualClock) -> RegionCache {
        let clock: Rc<dyn Clock> = Rc::new(clock.clone());
        RegionCache::load(CacheConfig::default(), clock, Box::new(store))
    }

    fn one_feature() -> FeatureCollection {
        FeatureCollection::new(vec![Feature::default()])
    }

    #[test]
    fn entries_expire_exactly_at_ttl() {
        let clock = ManualClock::new(Timestamp(1_000));
        let mut cache = cache_with(InMemoryStore::new(), &clock);
        cache.set("gee_year=2024", "https://tiles/{z}/{x}/{y}".to_string());

        clock.advance(CacheConfig::default().ttl() - Duration::from_millis(1));
        assert_eq!(
            cache.get::<String>("gee_year=2024").as_deref(),
            Some("https://tiles/{z}/{x}/{y}")
        );

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.peek::<String>("gee_year=2024"), None);
        assert_eq!(cache.get::<String>("gee_year=2024"), None);
        assert_eq!(cache.len(Namespace::Raster), 0);
    }

    #[test]
    fn namespaces_are_disjoint_and_survive_reload() {
        let clock = ManualClock::new(Timestamp(0));
        let store = SharedStore::default();
        let mut cache = cache_with(store.clone(), &clock);
        cache.set("k", one_feature());
        cache.set("k", "tile".to_string());

        let mut reloaded = cache_with(store.clone(), &clock);
        assert_eq!(reloaded.get::<FeatureCollection>("k"), Some(one_feature()));
        assert_eq!(reloaded.get::<String>("k").as_deref(), Some("tile"));
        assert!(store.0.borrow().get("mapCache_geojson").unwrap().is_some());
        assert!(store.0.borrow().get("mapCache_gee").unwrap().is_some());
    }

    #[test]
    fn expired_and_corrupt_content_is_dropped_at_load() {
        let clock = ManualClock::new(Timestamp(0));
        let mut store = InMemoryStore::new();
        store
            .set(
                "mapCache_gee",
                r#"{"old":{"value":"a","expiresAt":10},"new":{"value":"b","expiresAt":99}}"#,
            )
            .unwrap();
        store.set("mapCache_geojson", "{not json").unwrap();
        clock.set(Timestamp(10));

        let cache = cache_with(store, &clock);
        assert_eq!(cache.len(Namespace::Raster), 1);
        assert_eq!(cache.peek::<String>("new").map(String::as_str), Some("b"));
        assert_eq!(cache.len(Namespace::Vector), 0);
    }

    #[test]
    fn quota_failures_keep_memory_authoritative() {
        let clock = ManualClock::new(Timestamp(0));
        let mut cache = cache_with(InMemoryStore::with_quota(8), &clock);
        cache.set("gee_year=2024", "https://tiles/{z}/{x}/{y}".to_string());
        assert!(cache.peek::<String>("gee_year=2024").is_some());
    }

    #[test]
    fn clear_empties_memory_and_storage() {
        let clock = ManualClock::new(Timestamp(0));
        let store = SharedStore::default();
        let mut cache = cache_with(store.clone(), &clock);
        cache.set("a", one_feature());
        cache.set("b", "tile".to_string());
        cache.clear();

        assert_eq!(cache.len(Namespace::Vector), 0);
        assert_eq!(cache.len(Namespace::Raster), 0);
        assert!(store.0.borrow().is_empty());
    }

    #[test]
    fn blank_tile_urls_are_not_cacheable() {
        assert!(!"  ".to_string().is_cacheable());
        assert!("https://t".to_string().is_cacheable());
        assert!(FeatureCollection::default().is_cacheable());
    }
}
