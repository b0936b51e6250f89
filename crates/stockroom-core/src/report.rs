//! # Report Shapes
//!
//! Output types of the reporting engine and the pure folding that turns
//! aggregated ledger rows into them. The SQL side groups and sums; this
//! module orders lines and computes totals so both report kinds are
//! deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::TimeRange;

/// On-hand quantity of one product at one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub store_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Stock-levels report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelsReport {
    /// `None` for the live view.
    pub as_of: Option<DateTime<Utc>>,
    /// Ordered by store, then product.
    pub levels: Vec<StockLevel>,
}

impl StockLevelsReport {
    pub fn new(as_of: Option<DateTime<Utc>>, mut levels: Vec<StockLevel>) -> Self {
        levels.sort_by(|a, b| {
            (a.store_id.as_str(), a.product_id.as_str())
                .cmp(&(b.store_id.as_str(), b.product_id.as_str()))
        });
        StockLevelsReport { as_of, levels }
    }

    /// Sum of quantities over every line.
    pub fn total_quantity(&self) -> i64 {
        self.levels.iter().map(|l| l.quantity).sum()
    }
}

/// Sales of one product at one store over the report window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesLine {
    pub store_id: String,
    pub product_id: String,
    /// Units sold (positive).
    pub quantity_sold: i64,
    /// Number of sale movements.
    pub sale_count: i64,
    /// Σ quantity × unit price. Unpriced sales contribute zero.
    pub revenue: Money,
}

/// Sales report over a half-open window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    pub range: TimeRange,
    /// Ordered by store, then product.
    pub lines: Vec<SalesLine>,
    pub total_quantity: i64,
    pub total_revenue: Money,
}

impl SalesReport {
    /// Builds a report from grouped lines, computing totals.
    pub fn from_lines(range: TimeRange, mut lines: Vec<SalesLine>) -> Self {
        lines.sort_by(|a, b| {
            (a.store_id.as_str(), a.product_id.as_str())
                .cmp(&(b.store_id.as_str(), b.product_id.as_str()))
        });

        let total_quantity = lines.iter().map(|l| l.quantity_sold).sum();
        let total_revenue = lines.iter().map(|l| l.revenue).sum();

        SalesReport {
            range,
            lines,
            total_quantity,
            total_revenue,
        }
    }
}
