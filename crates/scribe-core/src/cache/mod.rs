//! Result cache for AI-backed operations
//!
//! Bounded key/value store of prior results with time-based freshness,
//! stale-while-revalidate serving, in-flight request collapsing, and
//! dependency-based invalidation. The cache performs no I/O of its own; it
//! only wraps caller-supplied fetch functions.
//!
//! ## Semantics
//!
//! - A fresh entry is served directly.
//! - A stale entry (past its TTL but inside its grace window) is served
//!   immediately while a detached revalidation refreshes it in the
//!   background; revalidation failures are swallowed and counted.
//! - Concurrent lookups for the same missing key share exactly one fetch
//!   invocation and receive the same result or failure.
//! - A failed fetch degrades to whatever is cached, even expired data; the
//!   error only propagates when nothing is cached at all.

mod lru;
pub mod types;


pub use types::{CacheEntry, CacheMetrics, CacheOptions, CacheSource, CacheStrategy, FetchConfig};

use crate::error::{ScribeError, ScribeResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruList;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A boxed fetch future producing the cache's payload envelope
pub type FetchFuture = BoxFuture<'static, ScribeResult<Value>>;

type SharedFetch = Shared<FetchFuture>;
type BoxedFetch = Box<dyn FnOnce() -> FetchFuture + Send>;

struct Slot {
    entry: CacheEntry,
    dependencies: Vec<String>,
    lru_idx: usize,
}

#[derive(Default)]
struct Store {
    slots: HashMap<String, Slot>,
    recency: LruList,
    dependents: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    revalidations: u64,
    revalidation_failures: u64,
    degraded_serves: u64,
    lookups: u64,
    total_latency_ms: f64,
}

/// Bounded result cache with freshness, stale-serving, and request collapsing
///
/// Cloning yields a cheap handle to the same underlying cache. Instances
/// are constructed explicitly and passed to whatever needs them; there is
/// no implicit process-wide cache.
#[derive(Clone)]
pub struct ResultCache {
    capacity: usize,
    store: Arc<Mutex<Store>>,
    in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
    counters: Arc<Mutex<Counters>>,
}

impl ResultCache {
    /// Create a new cache with the given options
    pub fn new(options: CacheOptions) -> Self {
        Self {
            capacity: options.capacity.max(1),
            store: Arc::new(Mutex::new(Store::default())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Create a cache with default options
    pub fn with_defaults() -> Self {
        Self::new(CacheOptions::default())
    }

    /// Look up `key`, falling back to `fetch` according to the configured
    /// strategy
    ///
    /// See the module docs for the full freshness/staleness semantics. The
    /// fetch takes no arguments; closures carry whatever parameters the
    /// underlying operation needs.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        config: FetchConfig,
    ) -> ScribeResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ScribeResult<T>> + Send + 'static,
    {
        let started = Instant::now();
        let result = self.lookup(key, envelope(fetch), config).await;
        self.record_latency(started.elapsed()).await;
        result.and_then(|value| serde_json::from_value(value).map_err(ScribeError::from))
    }

    /// Populate `key` ahead of demand; fetch failures are swallowed
    pub async fn prefetch<T, F, Fut>(&self, key: &str, fetch: F, config: FetchConfig)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ScribeResult<T>> + Send + 'static,
    {
        if let Err(error) = self
            .run_collapsed(key, envelope(fetch), &config, CacheSource::Prefetch)
            .await
        {
            debug!(key, error = %error, "prefetch failed");
        }
    }

    /// Warm the cache with a batch of keyed fetches, run concurrently
    ///
    /// Failures are ignored per-entry; one bad fetch does not stop the rest
    /// of the batch.
    pub async fn warm_cache(&self, entries: Vec<(String, FetchFuture)>, config: FetchConfig) {
        let tasks = entries.into_iter().map(|(key, fut)| {
            let cache = self.clone();
            let config = config.clone();
            async move {
                let fetch: BoxedFetch = Box::new(move || fut);
                if let Err(error) = cache
                    .run_collapsed(&key, fetch, &config, CacheSource::Warm)
                    .await
                {
                    debug!(key = %key, error = %error, "cache warming failed");
                }
            }
        });
        futures::future::join_all(tasks).await;
    }

    /// Remove every entry whose key contains the literal `pattern`
    ///
    /// Synchronous with respect to subsequent reads: once this returns, a
    /// read of a removed key is a miss.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let store = &mut *self.store.lock().await;
        let keys: Vec<String> = store
            .slots
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(slot) = store.slots.remove(key) {
                store.recency.remove(slot.lru_idx);
                unlink_dependencies(&mut store.dependents, key, &slot.dependencies);
            }
        }
        if !keys.is_empty() {
            debug!(pattern, removed = keys.len(), "invalidated cache entries");
        }
        keys.len()
    }

    /// Remove every entry that declared `dependency_key` at store time
    pub async fn invalidate_dependents(&self, dependency_key: &str) -> usize {
        let store = &mut *self.store.lock().await;
        let Some(keys) = store.dependents.remove(dependency_key) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = store.slots.remove(&key) {
                store.recency.remove(slot.lru_idx);
                unlink_dependencies(&mut store.dependents, &key, &slot.dependencies);
                removed += 1;
            }
        }
        debug!(dependency_key, removed, "invalidated dependent entries");
        removed
    }

    /// Drop all entries, in-flight trackers, and dependency links
    pub async fn clear(&self) {
        {
            let store = &mut *self.store.lock().await;
            store.slots.clear();
            store.recency.clear();
            store.dependents.clear();
        }
        self.in_flight.lock().await.clear();
    }

    /// Current number of entries
    pub async fn len(&self) -> usize {
        self.store.lock().await.slots.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.slots.is_empty()
    }

    /// Snapshot of cumulative cache counters
    pub async fn metrics(&self) -> CacheMetrics {
        let entry_count = self.store.lock().await.slots.len();
        let counters = self.counters.lock().await;
        CacheMetrics {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            revalidations: counters.revalidations,
            revalidation_failures: counters.revalidation_failures,
            degraded_serves: counters.degraded_serves,
            average_latency_ms: if counters.lookups == 0 {
                0.0
            } else {
                counters.total_latency_ms / counters.lookups as f64
            },
            entry_count,
            capacity: self.capacity,
        }
    }

    async fn lookup(
        &self,
        key: &str,
        fetch: BoxedFetch,
        config: FetchConfig,
    ) -> ScribeResult<Value> {
        match config.strategy {
            CacheStrategy::NetworkOnly => {
                return self
                    .run_collapsed(key, fetch, &config, CacheSource::Fetch)
                    .await;
            }
            CacheStrategy::CacheOnly => {
                return match self.peek_and_touch(key).await {
                    Some(entry) if !entry.is_expired() => {
                        self.bump_hit().await;
                        Ok(entry.data)
                    }
                    _ => {
                        self.bump_miss().await;
                        Err(ScribeError::cache(format!(
                            "no cached value for key '{key}'"
                        )))
                    }
                };
            }
            CacheStrategy::PreferNetwork => {
                return match self
                    .run_collapsed(key, fetch, &config, CacheSource::Fetch)
                    .await
                {
                    Ok(value) => Ok(value),
                    Err(error) => match self.peek(key).await {
                        Some(entry) => {
                            warn!(key, error = %error, "fetch failed, serving cached value");
                            self.bump_degraded().await;
                            Ok(entry.data)
                        }
                        None => Err(error),
                    },
                };
            }
            CacheStrategy::PreferCache => {}
        }

        if let Some(entry) = self.peek_and_touch(key).await {
            if entry.is_fresh() {
                self.bump_hit().await;
                return Ok(entry.data);
            }
            if entry.is_stale() {
                self.bump_hit().await;
                self.spawn_revalidation(key, fetch, &config);
                return Ok(entry.data);
            }
        }
        self.bump_miss().await;

        match self
            .run_collapsed(key, fetch, &config, CacheSource::Fetch)
            .await
        {
            Ok(value) => Ok(value),
            Err(error) => match self.peek(key).await {
                Some(entry) => {
                    warn!(key, error = %error, "fetch failed, serving expired cache entry");
                    self.bump_degraded().await;
                    Ok(entry.data)
                }
                None => Err(error),
            },
        }
    }

    /// Run a fetch through the in-flight map so that concurrent callers for
    /// the same key share exactly one invocation
    async fn run_collapsed(
        &self,
        key: &str,
        fetch: BoxedFetch,
        config: &FetchConfig,
        source: CacheSource,
    ) -> ScribeResult<Value> {
        let (shared, owner) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let shared = fetch().shared();
                    in_flight.insert(key.to_string(), shared.clone());
                    (shared, true)
                }
            }
        };

        let result = shared.clone().await;

        {
            // Whichever caller settles first clears the tracker; the guard
            // keeps a newer in-flight fetch for the same key intact.
            let mut in_flight = self.in_flight.lock().await;
            if in_flight
                .get(key)
                .is_some_and(|current| Shared::ptr_eq(current, &shared))
            {
                in_flight.remove(key);
            }
        }

        if owner {
            if source == CacheSource::Revalidation {
                let mut counters = self.counters.lock().await;
                counters.revalidations += 1;
                if result.is_err() {
                    counters.revalidation_failures += 1;
                }
            }
            if let Ok(value) = &result {
                self.store_value(key, value.clone(), config, source).await;
            }
        }
        result
    }

    /// Spawn a detached revalidation for a stale key
    ///
    /// The caller already received the stale value; a failure here is
    /// logged and counted, never surfaced.
    fn spawn_revalidation(&self, key: &str, fetch: BoxedFetch, config: &FetchConfig) {
        let cache = self.clone();
        let key = key.to_string();
        let config = config.clone();
        tokio::spawn(async move {
            match cache
                .run_collapsed(&key, fetch, &config, CacheSource::Revalidation)
                .await
            {
                Ok(_) => debug!(key = %key, "revalidated cache entry"),
                Err(error) => warn!(key = %key, error = %error, "background revalidation failed"),
            }
        });
    }

    async fn store_value(&self, key: &str, data: Value, config: &FetchConfig, source: CacheSource) {
        let entry = CacheEntry::new(data, config.ttl, config.stale_while_revalidate, source);
        let mut evicted = 0u64;
        {
            let store = &mut *self.store.lock().await;

            if let Some(old) = store.slots.remove(key) {
                store.recency.remove(old.lru_idx);
                unlink_dependencies(&mut store.dependents, key, &old.dependencies);
            } else if store.slots.len() >= self.capacity {
                if let Some(victim) = store.recency.pop_back() {
                    if let Some(slot) = store.slots.remove(&victim) {
                        unlink_dependencies(&mut store.dependents, &victim, &slot.dependencies);
                    }
                    debug!(key = %victim, "evicted least-recently-used entry");
                    evicted += 1;
                }
            }

            let lru_idx = store.recency.push_front(key.to_string());
            for dep in &config.dependencies {
                store
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(key.to_string());
            }
            store.slots.insert(
                key.to_string(),
                Slot {
                    entry,
                    dependencies: config.dependencies.clone(),
                    lru_idx,
                },
            );
        }
        if evicted > 0 {
            self.counters.lock().await.evictions += evicted;
        }
    }

    /// Read an entry and refresh its recency
    async fn peek_and_touch(&self, key: &str) -> Option<CacheEntry> {
        let store = &mut *self.store.lock().await;
        let (idx, entry) = match store.slots.get(key) {
            Some(slot) => (slot.lru_idx, slot.entry.clone()),
            None => return None,
        };
        store.recency.touch(idx);
        Some(entry)
    }

    /// Read an entry without touching recency (degraded-serving path)
    async fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.store
            .lock()
            .await
            .slots
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    async fn bump_hit(&self) {
        self.counters.lock().await.hits += 1;
    }

    async fn bump_miss(&self) {
        self.counters.lock().await.misses += 1;
    }

    async fn bump_degraded(&self) {
        self.counters.lock().await.degraded_serves += 1;
    }

    async fn record_latency(&self, elapsed: Duration) {
        let mut counters = self.counters.lock().await;
        counters.lookups += 1;
        counters.total_latency_ms += elapsed.as_secs_f64() * 1_000.0;
    }
}

/// Wrap a typed fetch into the cache's payload envelope
fn envelope<T, F, Fut>(fetch: F) -> BoxedFetch
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ScribeResult<T>> + Send + 'static,
{
    Box::new(move || {
        async move {
            let value = fetch().await?;
            serde_json::to_value(value).map_err(ScribeError::from)
        }
        .boxed()
    })
}

fn unlink_dependencies(
    dependents: &mut HashMap<String, HashSet<String>>,
    key: &str,
    dependencies: &[String],
) {
    for dep in dependencies {
        if let Some(keys) = dependents.get_mut(dep) {
            keys.remove(key);
            if keys.is_empty() {
                dependents.remove(dep);
            }
        }
    }
}
