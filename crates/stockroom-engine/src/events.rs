//! # Stock Events
//!
//! In-process fan-out of committed stock changes, for whatever pushes them
//! to terminals and dashboards (a WebSocket gateway, an SSE endpoint, a
//! replication job). The engine knows nothing about the transport.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append / initialize_stock / repair                                     │
//! │       │                                                                 │
//! │       ├── COMMIT                                                        │
//! │       ├── invalidate cache                                              │
//! │       ├── StockUpdated ─────┐                                           │
//! │       ├── LowStock (if low) ┤                                           │
//! │       └── unlock            │                                           │
//! │                             ▼                                           │
//! │                 broadcast::channel(256)                                 │
//! │                   │            │             │                          │
//! │                   ▼            ▼             ▼                          │
//! │            watch(S1)     watch(S2)     watch(tenant)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events for one stock key are sent while its write lock is held, so they
//! arrive in commit order. Nothing is buffered for slow watchers beyond the
//! channel capacity: a watcher that falls behind skips the oldest events,
//! logs a warning and carries on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use stockroom_core::{LowStockAlert, RequestContext, StockMovement};

/// Events buffered per watcher before the oldest are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A committed change visible to watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    /// The on-hand quantity of one (store, product) changed or was
    /// (re)established.
    StockUpdated {
        tenant_id: String,
        store_id: String,
        product_id: String,
        /// The movement that caused it. `None` for a zero initialisation or
        /// a rebuild from the ledger.
        movement: Option<StockMovement>,
        current_stock: i64,
        at: DateTime<Utc>,
    },

    /// A write left a product at or below its threshold.
    LowStock {
        tenant_id: String,
        alert: LowStockAlert,
    },
}

impl StockEvent {
    pub fn tenant_id(&self) -> &str {
        match self {
            StockEvent::StockUpdated { tenant_id, .. } | StockEvent::LowStock { tenant_id, .. } => {
                tenant_id
            }
        }
    }

    pub fn store_id(&self) -> &str {
        match self {
            StockEvent::StockUpdated { store_id, .. } => store_id,
            StockEvent::LowStock { alert, .. } => &alert.store_id,
        }
    }
}

/// Sending half, owned by the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StockEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { tx }
    }

    /// Sends to every live receiver. No receivers is not an error.
    pub fn send(&self, event: StockEvent) {
        if self.tx.send(event).is_err() {
            debug!("No stock event watchers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.tx.subscribe()
    }

    pub fn watcher_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver narrowed to one tenant and, optionally, one store.
#[derive(Debug)]
pub struct StockWatch {
    rx: broadcast::Receiver<StockEvent>,
    ctx: RequestContext,
    store_id: Option<String>,
}

impl StockWatch {
    pub(crate) fn new(
        rx: broadcast::Receiver<StockEvent>,
        ctx: RequestContext,
        store_id: Option<String>,
    ) -> Self {
        StockWatch { rx, ctx, store_id }
    }

    /// Next matching event, or `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<StockEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        tenant_id = %self.ctx.tenant_id,
                        store_id = ?self.store_id,
                        skipped,
                        "Stock watcher lagged"
                    );
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, event: &StockEvent) -> bool {
        if event.tenant_id() != self.ctx.tenant_id {
            return false;
        }
        match &self.store_id {
            Some(store_id) => event.store_id() == store_id,
            None => self.ctx.can_access_store(event.store_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tenant: &str, store: &str, current_stock: i64) -> StockEvent {
        StockEvent::StockUpdated {
            tenant_id: tenant.to_string(),
            store_id: store.to_string(),
            product_id: "p1".to_string(),
            movement: None,
            current_stock,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_watch_filters_tenant_and_store() {
        let bus = EventBus::new();
        let mut store_watch =
            StockWatch::new(bus.subscribe(), RequestContext::new("t1"), Some("s1".into()));
        let mut tenant_watch = StockWatch::new(
            bus.subscribe(),
            RequestContext::new("t1").with_allowed_stores(["s1", "s2"]),
            None,
        );
        assert_eq!(bus.watcher_count(), 2);

        bus.send(update("t2", "s1", 1));
        bus.send(update("t1", "s3", 2));
        bus.send(update("t1", "s2", 3));
        bus.send(update("t1", "s1", 4));

        let first = tenant_watch.recv().await.unwrap();
        assert!(matches!(first, StockEvent::StockUpdated { current_stock: 3, .. }));
        let second = tenant_watch.recv().await.unwrap();
        assert!(matches!(second, StockEvent::StockUpdated { current_stock: 4, .. }));

        let only = store_watch.recv().await.unwrap();
        assert!(matches!(only, StockEvent::StockUpdated { current_stock: 4, .. }));
    }

    #[tokio::test]
    async fn test_lagging_watcher_skips_and_continues() {
        let bus = EventBus::new();
        let mut watch = StockWatch::new(bus.subscribe(), RequestContext::new("t1"), None);

        for i in 0..(EVENT_CHANNEL_CAPACITY as i64 + 10) {
            bus.send(update("t1", "s1", i));
        }

        // The ten oldest were overwritten.
        let next = watch.recv().await.unwrap();
        assert!(matches!(next, StockEvent::StockUpdated { current_stock: 10, .. }));
    }

    #[tokio::test]
    async fn test_closed_bus_ends_watch() {
        let bus = EventBus::new();
        let mut watch = StockWatch::new(bus.subscribe(), RequestContext::new("t1"), None);
        drop(bus);
        assert!(watch.recv().await.is_none());
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(update("t1", "s1", 7)).unwrap();
        assert_eq!(json["type"], "stock_updated");
        assert_eq!(json["current_stock"], 7);
    }
}
