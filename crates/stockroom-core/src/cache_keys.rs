//! # Cache Keys
//!
//! The single source of cache key names. Readers that fill and writers that
//! invalidate both build keys here, so the two can never drift apart.
//!
//! ## Key Scheme
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock:{tenant}:{store}:{product}        point read                    │
//! │  stock-bulk:{tenant}:{store}             bulk read for one store       │
//! │  report:{tenant}:{store}:levels:...      store-scoped reports          │
//! │  report:{tenant}:all:sales:...           cross-store reports           │
//! │  alert:low-stock:{tenant}:{store}:{product}                            │
//! │                                                                         │
//! │  Write to (S, P) invalidates:                                          │
//! │    stock:T:S:P   stock-bulk:T:S   report:T:S:*   report:T:all:*        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::TimeRange;

const ALL_STORES: &str = "all";

/// Full precision, so two distinct instants never share a key.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Point-read key for one (store, product).
pub fn stock(tenant_id: &str, store_id: &str, product_id: &str) -> String {
    format!("stock:{tenant_id}:{store_id}:{product_id}")
}

/// Bulk-read key for every product of a store.
pub fn stock_bulk(tenant_id: &str, store_id: &str) -> String {
    format!("stock-bulk:{tenant_id}:{store_id}")
}

/// Prefix under which every report for `store_id` (or every cross-store
/// report when `None`) is cached. Ends with `:` so `S1` never matches `S10`.
pub fn report_prefix(tenant_id: &str, store_id: Option<&str>) -> String {
    format!("report:{tenant_id}:{}:", store_id.unwrap_or(ALL_STORES))
}

/// Key for a stock-levels report.
pub fn stock_levels_report(
    tenant_id: &str,
    store_id: Option<&str>,
    as_of: Option<DateTime<Utc>>,
) -> String {
    let at = as_of.map(ts).unwrap_or_else(|| "current".to_string());
    format!("{}levels:{at}", report_prefix(tenant_id, store_id))
}

/// Key for a sales report over `range`.
pub fn sales_report(tenant_id: &str, store_id: Option<&str>, range: &TimeRange) -> String {
    format!(
        "{}sales:{}:{}",
        report_prefix(tenant_id, store_id),
        ts(range.start),
        ts(range.end)
    )
}

/// Key holding the active low-stock alert for one (store, product).
pub fn low_stock_alert(tenant_id: &str, store_id: &str, product_id: &str) -> String {
    format!("alert:low-stock:{tenant_id}:{store_id}:{product_id}")
}

/// Everything a committed write to (store, product) must invalidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Exact keys to delete.
    pub keys: Vec<String>,
    /// Prefixes whose keys are all deleted.
    pub prefixes: Vec<String>,
}

/// Keys and prefixes touched by a write to one (store, product).
pub fn for_write(tenant_id: &str, store_id: &str, product_id: &str) -> Invalidation {
    Invalidation {
        keys: vec![
            stock(tenant_id, store_id, product_id),
            stock_bulk(tenant_id, store_id),
        ],
        prefixes: vec![
            report_prefix(tenant_id, Some(store_id)),
            report_prefix(tenant_id, None),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_shapes() {
        assert_eq!(stock("t", "s", "p"), "stock:t:s:p");
        assert_eq!(stock_bulk("t", "s"), "stock-bulk:t:s");
        assert_eq!(low_stock_alert("t", "s", "p"), "alert:low-stock:t:s:p");
        assert_eq!(report_prefix("t", None), "report:t:all:");
    }

    #[test]
    fn test_write_invalidation_covers_every_report_for_the_store() {
        let inv = for_write("t", "s1", "p1");
        let now = Utc::now();
        let range = TimeRange::new(now - Duration::days(1), now).unwrap();

        let store_levels = stock_levels_report("t", Some("s1"), None);
        let all_sales = sales_report("t", None, &range);
        let other_store = stock_levels_report("t", Some("s10"), None);

        let covered = |key: &str| {
            inv.keys.iter().any(|k| k == key) || inv.prefixes.iter().any(|p| key.starts_with(p))
        };

        assert!(covered(&stock("t", "s1", "p1")));
        assert!(covered(&stock_bulk("t", "s1")));
        assert!(covered(&store_levels));
        assert!(covered(&all_sales));
        assert!(!covered(&other_store));
        assert!(!covered(&stock("t", "s1", "p2")));
    }

    #[test]
    fn test_as_of_changes_key() {
        let now = Utc::now();
        assert_ne!(
            stock_levels_report("t", None, Some(now)),
            stock_levels_report("t", None, None)
        );
    }

    #[test]
    fn test_sub_microsecond_instants_get_distinct_keys() {
        let base = Utc::now();
        let later = base + Duration::nanoseconds(1);
        assert_ne!(
            stock_levels_report("t", Some("s1"), Some(base)),
            stock_levels_report("t", Some("s1"), Some(later))
        );

        let first = TimeRange::new(base - Duration::hours(1), base).unwrap();
        let second = TimeRange::new(base - Duration::hours(1), later).unwrap();
        assert_ne!(sales_report("t", None, &first), sales_report("t", None, &second));
    }
}
