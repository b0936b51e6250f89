//! # Cache Layer
//!
//! Read-through cache in front of the current-stock view and the reports.
//!
//! ## Coherence Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Invalidate-on-write                                  │
//! │                                                                         │
//! │  Writer                               Reader                           │
//! │  ──────                               ──────                           │
//! │  lock(stock key)                      get(key) ── hit ──► value        │
//! │  tx: ledger + view                        │                             │
//! │  COMMIT                                   miss                          │
//! │  bump generation                          │                             │
//! │  DEL stock / bulk / report:*              ▼                             │
//! │  unlock                               ticket = generation snapshot      │
//! │  return to caller                     read database                     │
//! │                                       under lock: generation moved?     │
//! │                                         yes → drop the value           │
//! │                                         no  → SET key value EX ttl     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never updated in place. A write always deletes.
//!
//! ## Failure Model
//! The cache is an optimisation only. Every backend error is logged at
//! `warn!`, counted in [`CacheStats::errors`] and treated as a miss. An
//! invalidation that fails is remembered and retried before the next
//! lookup; until it succeeds, lookups of the affected keys bypass the
//! cache entirely. [`CacheLayer::defer`] queues an invalidation the same
//! way without touching the backend, for callers that cannot await.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use stockroom_core::cache_keys::Invalidation;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

// =============================================================================
// Backend Trait
// =============================================================================

/// Errors raised by cache backends. Never surfaced past [`CacheLayer`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pluggable cache backend storing string values under string keys.
///
/// Implementations must be safe to share between tasks. Values are opaque
/// to the backend; [`CacheLayer`] handles serialisation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Gets a value, or `None` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Deletes one key. Deleting a missing key is not an error.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes every key starting with `prefix`. Returns how many went.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Stats
// =============================================================================

/// Cache counters since the engine started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Backend failures (each one degraded to a direct read).
    pub errors: u64,
}

impl CacheStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Cache Layer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Key,
    Prefix,
}

/// Error-swallowing, JSON-typed front for an optional [`CacheBackend`].
pub struct CacheLayer {
    backend: Option<Arc<dyn CacheBackend>>,
    /// Invalidations that failed and must succeed before the keys they
    /// cover are served from the cache again.
    pending: DashMap<String, Pending>,
    /// Bumped by every [`CacheLayer::defer`]. A fill that overlaps one is
    /// deleted again after it lands.
    deferrals: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheLayer {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>) -> Self {
        CacheLayer {
            backend,
            pending: DashMap::new(),
            deferrals: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// A layer with no backend: every lookup is a miss.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("none", |b| b.name())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Looks up and decodes a value. Any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(backend) = &self.backend else {
            return None;
        };

        if !self.retry_pending(backend.as_ref()).await || self.is_pending(key) {
            debug!(key, "Cache bypassed: invalidation outstanding");
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    // Undecodable entries are dropped so the next fill replaces them.
                    self.record_error(backend.name(), "decode", key, &e.to_string());
                    if let Err(e) = backend.invalidate(key).await {
                        self.record_error(backend.name(), "invalidate", key, &e.to_string());
                    }
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                self.record_error(backend.name(), "get", key, &e.to_string());
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Encodes and stores a value. Failures are logged and dropped.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(backend) = &self.backend else {
            return;
        };
        let deferrals = self.deferrals.load(Ordering::Acquire);
        if self.is_pending(key) {
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.record_error(backend.name(), "encode", key, &e.to_string());
                return;
            }
        };

        if let Err(e) = backend.set(key, &raw, ttl).await {
            self.record_error(backend.name(), "set", key, &e.to_string());
            return;
        }

        if self.deferrals.load(Ordering::Acquire) != deferrals {
            debug!(key, "Invalidation deferred during fill, dropping it");
            self.delete(key).await;
        }
    }

    /// Deletes a single key.
    pub async fn delete(&self, key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.invalidate(key).await {
            self.record_error(backend.name(), "invalidate", key, &e.to_string());
            self.pending.insert(key.to_string(), Pending::Key);
        }
    }

    /// Applies every key and prefix of `invalidation`.
    ///
    /// Returns `false` if anything failed. Failed entries stay pending and
    /// block lookups of the keys they cover until a retry succeeds.
    pub async fn invalidate(&self, invalidation: &Invalidation) -> bool {
        let Some(backend) = &self.backend else {
            return true;
        };

        let mut clean = true;
        for key in &invalidation.keys {
            if let Err(e) = backend.invalidate(key).await {
                self.record_error(backend.name(), "invalidate", key, &e.to_string());
                self.pending.insert(key.clone(), Pending::Key);
                clean = false;
            }
        }
        for prefix in &invalidation.prefixes {
            match backend.invalidate_prefix(prefix).await {
                Ok(removed) => debug!(prefix = %prefix, removed, "Invalidated cache prefix"),
                Err(e) => {
                    self.record_error(backend.name(), "invalidate_prefix", prefix, &e.to_string());
                    self.pending.insert(prefix.clone(), Pending::Prefix);
                    clean = false;
                }
            }
        }
        clean
    }

    /// Queues `invalidation` without calling the backend. The covered keys
    /// bypass the cache until the next lookup applies it.
    ///
    /// Synchronous, so it is safe to call from `Drop`.
    pub fn defer(&self, invalidation: &Invalidation) {
        if self.backend.is_none() {
            return;
        }
        for key in &invalidation.keys {
            self.pending.insert(key.clone(), Pending::Key);
        }
        for prefix in &invalidation.prefixes {
            self.pending.insert(prefix.clone(), Pending::Prefix);
        }
        self.deferrals.fetch_add(1, Ordering::AcqRel);
    }

    /// Checks the backend. `true` when there is no backend.
    pub async fn ping(&self) -> bool {
        match &self.backend {
            None => true,
            Some(backend) => match backend.ping().await {
                Ok(()) => true,
                Err(e) => {
                    self.record_error(backend.name(), "ping", "", &e.to_string());
                    false
                }
            },
        }
    }

    /// Retries outstanding invalidations. Returns `true` when none remain.
    async fn retry_pending(&self, backend: &dyn CacheBackend) -> bool {
        if self.pending.is_empty() {
            return true;
        }

        let outstanding: Vec<(String, Pending)> = self
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        for (target, kind) in outstanding {
            let result = match kind {
                Pending::Key => backend.invalidate(&target).await,
                Pending::Prefix => backend.invalidate_prefix(&target).await.map(|_| ()),
            };
            match result {
                Ok(()) => {
                    self.pending.remove(&target);
                    debug!(target = %target, "Outstanding invalidation applied");
                }
                Err(e) => self.record_error(backend.name(), "invalidate", &target, &e.to_string()),
            }
        }

        self.pending.is_empty()
    }

    fn is_pending(&self, key: &str) -> bool {
        self.pending.iter().any(|entry| match entry.value() {
            Pending::Key => entry.key() == key,
            Pending::Prefix => key.starts_with(entry.key().as_str()),
        })
    }

    fn record_error(&self, backend: &str, op: &str, key: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(backend, op, key, error, "Cache operation failed, falling back to database");
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("backend", &self.backend_name())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
