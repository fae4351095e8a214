//! Cache types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// How a cache entry was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    /// Stored by a demand fetch
    Fetch,
    /// Replaced by a background revalidation
    Revalidation,
    /// Populated ahead of demand
    Prefetch,
    /// Populated by bulk warming
    Warm,
}

/// Read/write strategy for a single lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve fresh or stale cache data before falling back to the fetch
    #[default]
    PreferCache,
    /// Fetch first, fall back to any cached value on failure
    PreferNetwork,
    /// Bypass the cache read entirely (the result is still stored)
    NetworkOnly,
    /// Never invoke the fetch; error when nothing servable is cached
    CacheOnly,
}

/// A stored result with its freshness window
///
/// Entries are never mutated in place; revalidation replaces the whole
/// entry. Invariant: `created_at <= fresh_until <= stale_until`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached payload
    pub data: Value,
    /// When the entry was created
    pub created_at: Instant,
    /// Wall-clock creation time, for inspection
    pub stored_at: DateTime<Utc>,
    /// Instant after which the entry is no longer fresh
    pub fresh_until: Instant,
    /// Instant after which even stale serving stops, if a stale window was configured
    pub stale_until: Option<Instant>,
    /// How the entry was produced
    pub source: CacheSource,
}

impl CacheEntry {
    pub(crate) fn new(
        data: Value,
        ttl: Duration,
        stale_window: Option<Duration>,
        source: CacheSource,
    ) -> Self {
        let created_at = Instant::now();
        let fresh_until = created_at + ttl;
        Self {
            data,
            created_at,
            stored_at: Utc::now(),
            fresh_until,
            stale_until: stale_window.map(|window| fresh_until + window),
            source,
        }
    }

    /// Entry is within its TTL
    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.fresh_until
    }

    /// Entry is past its TTL but still inside its stale-while-revalidate window
    pub fn is_stale(&self) -> bool {
        let now = Instant::now();
        now >= self.fresh_until && self.stale_until.is_some_and(|until| now < until)
    }

    /// Entry is past every serving window
    pub fn is_expired(&self) -> bool {
        !self.is_fresh() && !self.is_stale()
    }

    /// Age of the entry
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Per-lookup cache configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Fresh lifetime of the stored result
    pub ttl: Duration,
    /// Additional grace window during which stale data is served while a
    /// background revalidation runs
    pub stale_while_revalidate: Option<Duration>,
    /// Invalidation keys this entry is sensitive to
    pub dependencies: Vec<String>,
    /// Read/write strategy for this lookup
    pub strategy: CacheStrategy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            stale_while_revalidate: None,
            dependencies: Vec::new(),
            strategy: CacheStrategy::PreferCache,
        }
    }
}

impl FetchConfig {
    /// Set the fresh lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the stale-while-revalidate grace window
    pub fn with_stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    /// Register a dependency key for invalidation fan-out
    pub fn with_dependency(mut self, key: impl Into<String>) -> Self {
        self.dependencies.push(key.into());
        self
    }

    /// Set the lookup strategy
    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Construction-time cache settings
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

impl CacheOptions {
    /// Create options with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Lookups served from a fresh or stale entry
    pub hits: u64,
    /// Lookups that had to run the fetch
    pub misses: u64,
    /// Entries evicted by capacity pressure
    pub evictions: u64,
    /// Background revalidations started
    pub revalidations: u64,
    /// Background revalidations that failed (swallowed, never surfaced)
    pub revalidation_failures: u64,
    /// Expired entries served because the fetch failed
    pub degraded_serves: u64,
    /// Running average retrieval latency in milliseconds
    pub average_latency_ms: f64,
    /// Current number of entries
    pub entry_count: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl CacheMetrics {
    /// Fraction of lookups served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
