//! # Ledger Rules
//!
//! The sign convention for movements, ledger replay and the negative-stock
//! policy. Everything the write path decides before touching the database
//! lives here so it can be property-tested without I/O.
//!
//! ## Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   current_stock(store, product) == Σ delta  over the ledger entries    │
//! │                                   for (store, product)                 │
//! │                                                                         │
//! │   StockIn (+q) ──┐                                                      │
//! │   Return  (+q) ──┼──► replay() ──► quantity                             │
//! │   Sale    (-q) ──┤                                                      │
//! │   Removal (-q) ──┘                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{MovementType, StockMovement};

// =============================================================================
// Sign Convention
// =============================================================================

/// Signed effect of a movement of `quantity` units.
///
/// `quantity` is expected to be positive (see
/// [`validate_quantity`](crate::validation::validate_quantity)).
#[inline]
pub const fn signed_delta(movement_type: MovementType, quantity: i64) -> i64 {
    movement_type.sign() * quantity
}

/// Folds a sequence of deltas into an on-hand quantity.
///
/// Returns `None` on overflow.
pub fn replay<I>(deltas: I) -> Option<i64>
where
    I: IntoIterator<Item = i64>,
{
    deltas
        .into_iter()
        .try_fold(0i64, |acc, delta| acc.checked_add(delta))
}

/// Replays ledger entries for a single key.
pub fn replay_movements<'a, I>(movements: I) -> Option<i64>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    replay(movements.into_iter().map(|m| m.delta))
}

// =============================================================================
// Negative Stock Policy
// =============================================================================

/// Whether a decreasing movement may take on-hand quantity below zero.
///
/// The global setting comes from configuration; a store may override it.
///
/// ## Example
/// ```rust
/// use stockroom_core::ledger::StockPolicy;
///
/// let global = StockPolicy::reject_negative();
/// assert!(!global.allow_negative);
///
/// // Store "S9" runs a back-order workflow.
/// let effective = global.effective(Some(true));
/// assert!(effective.allow_negative);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockPolicy {
    pub allow_negative: bool,
}

impl StockPolicy {
    /// Rejects any movement that would leave negative stock.
    pub const fn reject_negative() -> Self {
        StockPolicy {
            allow_negative: false,
        }
    }

    /// Accepts negative stock (oversell / back-order).
    pub const fn allow_negative() -> Self {
        StockPolicy {
            allow_negative: true,
        }
    }

    /// Applies a store-level override on top of this policy.
    pub const fn effective(self, store_override: Option<bool>) -> Self {
        match store_override {
            Some(allow_negative) => StockPolicy { allow_negative },
            None => self,
        }
    }

    /// Computes the quantity after applying `delta` to `current`.
    ///
    /// ## Errors
    /// - `InsufficientStock` when the result is negative, the delta is a
    ///   decrease and the policy forbids it
    /// - `QuantityOverflow` if the addition overflows
    ///
    /// Increases are always accepted, even from an already-negative balance.
    pub fn apply(
        &self,
        store_id: &str,
        product_id: &str,
        current: i64,
        delta: i64,
    ) -> CoreResult<i64> {
        let next = current
            .checked_add(delta)
            .ok_or_else(|| CoreError::QuantityOverflow {
                store_id: store_id.to_string(),
                product_id: product_id.to_string(),
            })?;

        if delta < 0 && next < 0 && !self.allow_negative {
            return Err(CoreError::InsufficientStock {
                store_id: store_id.to_string(),
                product_id: product_id.to_string(),
                available: current,
                requested: -delta,
            });
        }

        Ok(next)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_signed_delta() {
        assert_eq!(signed_delta(MovementType::StockIn, 100), 100);
        assert_eq!(signed_delta(MovementType::Sale, 30), -30);
        assert_eq!(signed_delta(MovementType::Removal, 10), -10);
        assert_eq!(signed_delta(MovementType::Return, 4), 4);
    }

    #[test]
    fn test_store_scenario() {
        // Deliver 100, sell 30, remove 10, then try to sell 100.
        let policy = StockPolicy::default();
        let q = policy.apply("S1", "P1", 0, signed_delta(MovementType::StockIn, 100)).unwrap();
        let q = policy.apply("S1", "P1", q, signed_delta(MovementType::Sale, 30)).unwrap();
        let q = policy.apply("S1", "P1", q, signed_delta(MovementType::Removal, 10)).unwrap();
        assert_eq!(q, 60);

        let err = policy
            .apply("S1", "P1", q, signed_delta(MovementType::Sale, 100))
            .unwrap_err();
        match err {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 60);
                assert_eq!(requested, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_allow_negative_accepts_oversell() {
        let policy = StockPolicy::reject_negative().effective(Some(true));
        assert_eq!(policy.apply("S", "P", 5, -8).unwrap(), -3);
    }

    #[test]
    fn test_increase_from_negative_is_always_accepted() {
        let policy = StockPolicy::reject_negative();
        assert_eq!(policy.apply("S", "P", -3, 1).unwrap(), -2);
    }

    #[test]
    fn test_overflow() {
        let policy = StockPolicy::allow_negative();
        assert!(matches!(
            policy.apply("S", "P", i64::MAX, 1),
            Err(CoreError::QuantityOverflow { .. })
        ));
        assert_eq!(replay([i64::MAX, 1]), None);
    }

    #[test]
    fn test_effective_without_override_keeps_global() {
        assert_eq!(
            StockPolicy::allow_negative().effective(None),
            StockPolicy::allow_negative()
        );
        assert_eq!(
            StockPolicy::allow_negative().effective(Some(false)),
            StockPolicy::reject_negative()
        );
    }

    fn movement_strategy() -> impl Strategy<Value = (MovementType, i64)> {
        (
            prop::sample::select(MovementType::ALL.to_vec()),
            1i64..=1_000,
        )
    }

    proptest! {
        /// Accepted movements under the reject policy never leave the key
        /// negative, and the accepted deltas replay to the running total.
        #[test]
        fn prop_reject_policy_never_goes_negative(
            movements in prop::collection::vec(movement_strategy(), 0..64)
        ) {
            let policy = StockPolicy::reject_negative();
            let mut current = 0i64;
            let mut accepted = Vec::new();

            for (kind, qty) in movements {
                let delta = signed_delta(kind, qty);
                match policy.apply("S", "P", current, delta) {
                    Ok(next) => {
                        current = next;
                        accepted.push(delta);
                    }
                    Err(CoreError::InsufficientStock { available, .. }) => {
                        prop_assert_eq!(available, current);
                    }
                    Err(other) => prop_assert!(false, "unexpected {:?}", other),
                }
                prop_assert!(current >= 0);
            }

            prop_assert_eq!(replay(accepted), Some(current));
        }

        /// Replay is order-independent for a fixed multiset of deltas.
        #[test]
        fn prop_replay_is_commutative(
            mut deltas in prop::collection::vec(-1_000i64..=1_000, 0..64)
        ) {
            let forward = replay(deltas.clone());
            deltas.reverse();
            prop_assert_eq!(forward, replay(deltas));
        }
    }
}
