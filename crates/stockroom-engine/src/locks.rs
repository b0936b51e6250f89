//! # Key Locks
//!
//! Per-scope serialisation and generation counters.
//!
//! A scope is a string naming what a lock protects: one (store, product)
//! stock key, one store's bulk/report entries, or one tenant's cross-store
//! reports. Scopes are independent; there is no global lock.
//!
//! ## Lock Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Writer:  stock key ──► store scope ──► tenant scope                   │
//! │           (whole tx)    (bump + invalidate only)                       │
//! │                                                                         │
//! │  Reader:  exactly one scope, only while publishing a cache fill        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State is created on first use and dropped with the last guard or fill
//! ticket for it, so the map tracks only live keys.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct ScopeState {
    lock: Arc<Mutex<()>>,
    generation: AtomicU64,
}

/// Exclusive hold on one scope. Dropping it unlocks the scope.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    locks: &'a KeyLocks,
    scope: String,
    state: Arc<ScopeState>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ScopeGuard<'_> {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Marks the scope as changed. In-flight cache fills for it are dropped.
    pub fn bump(&self) -> u64 {
        self.state.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(&self.scope);
    }
}

/// Generation snapshot taken before a cache fill reads the database.
#[derive(Debug)]
pub struct FillTicket<'a> {
    locks: &'a KeyLocks,
    scope: String,
    state: Arc<ScopeState>,
    generation: u64,
}

impl FillTicket<'_> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs `publish` under the scope lock if nothing was written since the
    /// ticket was taken. Returns whether it ran.
    pub async fn publish<F, Fut>(self, publish: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let _guard = self.state.lock.clone().lock_owned().await;
        if self.state.generation.load(Ordering::Acquire) != self.generation {
            debug!(scope = %self.scope, "Write raced the fill, dropping cached value");
            return false;
        }
        publish().await;
        true
    }
}

impl Drop for FillTicket<'_> {
    fn drop(&mut self) {
        self.locks.prune(&self.scope);
    }
}

/// The lock table.
#[derive(Debug, Default)]
pub struct KeyLocks {
    scopes: DashMap<String, Arc<ScopeState>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, scope: &str) -> Arc<ScopeState> {
        self.scopes.entry(scope.to_string()).or_default().clone()
    }

    /// Waits for exclusive access to `scope`.
    pub async fn lock(&self, scope: &str) -> ScopeGuard<'_> {
        let state = self.state(scope);
        let guard = state.lock.clone().lock_owned().await;
        ScopeGuard {
            locks: self,
            scope: scope.to_string(),
            state,
            guard: Some(guard),
        }
    }

    /// Snapshots the generation of `scope` for a later [`FillTicket::publish`].
    pub fn ticket(&self, scope: &str) -> FillTicket<'_> {
        let state = self.state(scope);
        let generation = state.generation.load(Ordering::Acquire);
        FillTicket {
            locks: self,
            scope: scope.to_string(),
            state,
            generation,
        }
    }

    /// Bumps `scope` without taking its lock. A scope with no live state
    /// has no fills to drop and is left alone.
    pub fn bump(&self, scope: &str) {
        if let Some(state) = self.scopes.get(scope) {
            state.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Current generation of `scope` (0 for a scope nobody has touched).
    pub fn generation(&self, scope: &str) -> u64 {
        self.scopes
            .get(scope)
            .map_or(0, |state| state.generation.load(Ordering::Acquire))
    }

    /// Drops the state of `scope` when the only holders left are the map
    /// and the guard or ticket being dropped.
    fn prune(&self, scope: &str) {
        self.scopes
            .remove_if(scope, |_, state| Arc::strong_count(state) <= 2);
    }

    /// Number of scopes currently tracked.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
