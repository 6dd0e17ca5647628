//! Per-request key batching.
//!
//! A [`Batcher`] coalesces many single-key requests into one multi-key query:
//! callers ask for individual keys, the concrete [`BatchSource`] answers for
//! a whole key set at once, and results are handed back in input order. This
//! is what keeps a request that touches N threads at one grouped query per
//! aggregate instead of N.
//!
//! Batchers are request-scoped. Construct a fresh set per request (see
//! `ThreadLoaders`) and drop it at request end — there is deliberately no
//! cross-request cache, so one viewer's counts can never leak into another
//! viewer's response.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use asupersync::{Cx, Outcome};

use crate::error::DbError;

/// Whether a batcher memoizes values for the lifetime of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Memoize: repeated loads of a key hit the request-local cache.
    PerRequest,
    /// Always fresh: every `load_many` call re-queries, so counts observe
    /// in-request mutations. Duplicate keys within one call still share one
    /// batch query.
    NoCache,
}

/// A source that answers a whole batch of keys with one query.
pub trait BatchSource: Send + Sync {
    type Key: Clone + Eq + Hash + Send + Sync;
    type Value: Clone + Send;

    /// Cache behavior for batchers over this source.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::PerRequest
    }

    /// The value a key resolves to when the batch result has no entry for
    /// it. Count sources return zero here — a thread with no matching rows
    /// is `0`, never "missing".
    fn absent_value(&self) -> Self::Value;

    /// Execute one query for all `keys` and return a map of results.
    ///
    /// Keys absent from the map resolve to [`BatchSource::absent_value`].
    /// An error rejects every key in the batch; nothing is cached.
    fn load_batch(
        &self,
        cx: &Cx,
        keys: &[Self::Key],
    ) -> impl Future<Output = Outcome<HashMap<Self::Key, Self::Value>, DbError>> + Send;
}

/// Snapshot of batcher counters, for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherMetrics {
    /// Number of `load_batch` calls issued.
    pub batches: u64,
    /// Number of keys requested across all `load`/`load_many` calls.
    pub keys_requested: u64,
    /// Number of keys answered from the request-local cache.
    pub cache_hits: u64,
}

/// Request-scoped batching wrapper around a [`BatchSource`].
pub struct Batcher<S: BatchSource> {
    source: S,
    cache: Mutex<HashMap<S::Key, S::Value>>,
    batches: AtomicU64,
    keys_requested: AtomicU64,
    cache_hits: AtomicU64,
}

impl<S: BatchSource> Batcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            batches: AtomicU64::new(0),
            keys_requested: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// The wrapped source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Load a single key.
    pub async fn load(&self, cx: &Cx, key: S::Key) -> Outcome<S::Value, DbError> {
        let mut values = crate::try_out!(self.load_many(cx, std::slice::from_ref(&key)).await);
        values.pop().map_or_else(
            || Outcome::Err(DbError::Internal("batch returned no value".to_string())),
            Outcome::Ok,
        )
    }

    /// Load many keys, returning values in input key order.
    ///
    /// Repeated keys are answered from a single batch entry. With
    /// [`CachePolicy::PerRequest`], previously loaded keys are answered from
    /// the request-local cache and only the remainder is fetched.
    pub async fn load_many(&self, cx: &Cx, keys: &[S::Key]) -> Outcome<Vec<S::Value>, DbError> {
        self.keys_requested
            .fetch_add(keys.len() as u64, Ordering::Relaxed);

        let use_cache = self.source.cache_policy() == CachePolicy::PerRequest;

        // Collect the distinct uncached keys, preserving first-seen order.
        let mut misses: Vec<S::Key> = Vec::new();
        {
            let cache = self
                .cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut seen: HashSet<&S::Key> = HashSet::with_capacity(keys.len());
            for key in keys {
                if use_cache && cache.contains_key(key) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                if seen.insert(key) {
                    misses.push(key.clone());
                }
            }
        }

        let fetched: HashMap<S::Key, S::Value> = if misses.is_empty() {
            HashMap::new()
        } else {
            self.batches.fetch_add(1, Ordering::Relaxed);
            crate::try_out!(self.source.load_batch(cx, &misses).await)
        };

        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if use_cache {
            for key in &misses {
                let value = fetched
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| self.source.absent_value());
                cache.insert(key.clone(), value);
            }
        }

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = if use_cache {
                cache.get(key).cloned()
            } else {
                fetched.get(key).cloned()
            };
            out.push(value.unwrap_or_else(|| self.source.absent_value()));
        }
        Outcome::Ok(out)
    }

    /// Seed the request-local cache with a known value.
    ///
    /// No-op for [`CachePolicy::NoCache`] sources.
    pub fn prime(&self, key: S::Key, value: S::Value) {
        if self.source.cache_policy() == CachePolicy::NoCache {
            return;
        }
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, value);
    }

    /// Drop all cached values.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> BatcherMetrics {
        BatcherMetrics {
            batches: self.batches.load(Ordering::Relaxed),
            keys_requested: self.keys_requested.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
