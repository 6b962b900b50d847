use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared};
use scene::FeatureCollection;
use tracing::debug;

use crate::cache::{CacheValue, Namespace, RegionCache};
use crate::request::{Generation, RasterQuery, Request, VectorQuery};
use crate::source::{FetchError, RasterService, VectorService};

type SharedFetch<V> = Shared<LocalBoxFuture<'static, Result<V, FetchError>>>;

/// One registered in-flight fetch.
pub struct Pending<V> {
    ticket: Request,
    generation: Generation,
    fetch: SharedFetch<V>,
}

/// In-flight fetches per namespace, keyed by cache key.
#[derive(Default)]
pub struct PendingRegistry {
    vector: BTreeMap<String, Pending<FeatureCollection>>,
    raster: BTreeMap<String, Pending<String>>,
}

impl PendingRegistry {
    pub fn len(&self, ns: Namespace) -> usize {
        match ns {
            Namespace::Vector => self.vector.len(),
            Namespace::Raster => self.raster.len(),
        }
    }

    fn clear(&mut self) {
        self.vector.clear();
        self.raster.clear();
    }
}

/// Cacheable values that can also be fetched through the coordinator.
pub trait Coordinated: CacheValue {
    fn in_flight(registry: &mut PendingRegistry) -> &mut BTreeMap<String, Pending<Self>>;
}

impl Coordinated for FeatureCollection {
    fn in_flight(registry: &mut PendingRegistry) -> &mut BTreeMap<String, Pending<Self>> {
        &mut registry.vector
    }
}

impl Coordinated for String {
    fn in_flight(registry: &mut PendingRegistry) -> &mut BTreeMap<String, Pending<Self>> {
        &mut registry.raster
    }
}

/// Cache-then-dedup front for both remote services.
///
/// At most one fetch per key is in flight; later callers for the same key
/// await the same operation. [`RequestCoordinator::cancel_all`] advances the
/// generation and forgets every in-flight fetch; their awaiters then receive
/// [`FetchError::Cancelled`] and nothing they produced reaches the cache.
///
/// Single-threaded: shared via `Rc`, no borrow is held across an await.
pub struct RequestCoordinator {
    cache: RefCell<RegionCache>,
    generation: Cell<Generation>,
    pending: RefCell<PendingRegistry>,
    next_ticket: Cell<u64>,
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("generation", &self.generation.get())
            .field("pending_vector", &self.pending_len(Namespace::Vector))
            .field("pending_raster", &self.pending_len(Namespace::Raster))
            .finish()
    }
}

impl RequestCoordinator {
    pub fn new(cache: RegionCache) -> Self {
        Self {
            cache: RefCell::new(cache),
            generation: Cell::new(Generation::default()),
            pending: RefCell::new(PendingRegistry::default()),
            next_ticket: Cell::new(1),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation.get()
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation.get() == generation
    }

    /// `Err(Cancelled)` once `generation` has been superseded.
    pub fn ensure_current(&self, generation: Generation) -> Result<(), FetchError> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(FetchError::Cancelled)
        }
    }

    /// Supersedes every in-flight fetch without waiting for it.
    pub fn cancel_all(&self) -> Generation {
        let next = self.generation.get().next();
        self.generation.set(next);
        let mut pending = self.pending.borrow_mut();
        let dropped = pending.len(Namespace::Vector) + pending.len(Namespace::Raster);
        pending.clear();
        debug!(generation = %next, dropped, "cancelled in-flight requests");
        next
    }

    pub fn pending_len(&self, ns: Namespace) -> usize {
        self.pending.borrow().len(ns)
    }

    pub fn cached<V: CacheValue>(&self, key: &str) -> Option<V> {
        self.cache.borrow_mut().get::<V>(key)
    }

    pub fn cache_len(&self, ns: Namespace) -> usize {
        self.cache.borrow().len(ns)
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Resolves `key` from the cache, an in-flight fetch, or `producer`.
    ///
    /// `producer` is only invoked when neither has it. The caller that
    /// unregisters a settled fetch also stores its value (when cacheable).
    pub async fn resolve<V, F, Fut>(&self, key: &str, producer: F) -> Result<V, FetchError>
    where
        V: Coordinated,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + 'static,
    {
        if let Some(hit) = self.cached::<V>(key) {
            debug!(namespace = %V::NAMESPACE, key, "cache hit");
            return Ok(hit);
        }

        let generation = self.generation.get();
        let joined = V::in_flight(&mut self.pending.borrow_mut())
            .get(key)
            .filter(|p| p.generation == generation)
            .map(|p| (p.ticket, p.fetch.clone()));

        let (ticket, fetch) = match joined {
            Some(joined) => {
                debug!(namespace = %V::NAMESPACE, key, "joined in-flight request");
                joined
            }
            None => {
                let ticket = Request(self.next_ticket.get());
                self.next_ticket.set(ticket.0 + 1);
                let fetch: SharedFetch<V> = producer().boxed_local().shared();
                V::in_flight(&mut self.pending.borrow_mut()).insert(
                    key.to_string(),
                    Pending {
                        ticket,
                        generation,
                        fetch: fetch.clone(),
                    },
                );
                debug!(namespace = %V::NAMESPACE, key, ticket = ticket.0, "issued request");
                (ticket, fetch)
            }
        };

        let result = fetch.await;

        if !self.is_current(generation) {
            debug!(namespace = %V::NAMESPACE, key, "discarding stale response");
            return Err(FetchError::Cancelled);
        }

        let owned = {
            let mut pending = self.pending.borrow_mut();
            let in_flight = V::in_flight(&mut pending);
            let mine = in_flight.get(key).is_some_and(|p| p.ticket == ticket);
            if mine {
                in_flight.remove(key);
            }
            mine
        };

        if owned {
            if let Ok(value) = &result {
                if value.is_cacheable() {
                    self.cache.borrow_mut().set(key.to_string(), value.clone());
                }
            }
        }
        result
    }

    pub async fn vector(
        &self,
        service: &dyn VectorService,
        query: &VectorQuery,
    ) -> Result<FeatureCollection, FetchError> {
        self.resolve(&query.cache_key(), || service.fetch(query)).await
    }

    pub async fn raster(
        &self,
        service: &dyn RasterService,
        query: &RasterQuery,
    ) -> Result<String, FetchError> {
        self.resolve(&query.cache_key(), || service.fetch(query)).await
    }
}
