//! Pure computation engine for deterministic ledger replay.
//!
//! Everything in this module is side-effect free: the replay consumes a
//! snapshot of raw transactions and produces a complete `DerivedState`,
//! which the orchestration layer persists in one atomic batch.

use crate::domain::{Decimal, TimeMs, Transaction, TxnId};

pub mod allocator;
pub mod guard;
pub mod pnl;
pub mod replay;
pub mod risk;

pub use allocator::{allocate, Allocation};
pub use guard::{verify, InvariantViolation};
pub use replay::{replay, OverSellPolicy, ReplayError};

/// An inventory lot created from one BUY transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    /// Originating buy transaction.
    pub txn: TxnId,
    /// Quantity acquired.
    pub original_qty: Decimal,
    /// Quantity not yet consumed by sells. Only ever decremented, and only
    /// by the replay after a full successful allocation pass.
    pub remaining_qty: Decimal,
    /// Per-unit acquisition cost including commission, fixed at creation.
    pub unit_cost: Decimal,
    /// Raw execution price of the buy.
    pub entry_price: Decimal,
    /// Distance to the stop-loss set at entry, if one was recorded.
    pub risk_per_share: Option<Decimal>,
    /// Execution time of the buy.
    pub time_ms: TimeMs,
    /// Insertion sequence of the buy, the FIFO tie-breaker.
    pub seq: i64,
}

impl Lot {
    /// Derive a fresh lot from a BUY transaction.
    ///
    /// `unit_cost = (price * quantity + commission) / quantity`, computed
    /// once here; the caller has already validated quantity > 0.
    pub fn from_buy(txn: &Transaction) -> Lot {
        let unit_cost = (txn.price * txn.quantity + txn.commission) / txn.quantity;
        let risk_per_share = txn.stop_loss.map(|stop| (txn.price - stop).abs());
        Lot {
            txn: txn.id.clone(),
            original_qty: txn.quantity,
            remaining_qty: txn.quantity,
            unit_cost,
            entry_price: txn.price,
            risk_per_share,
            time_ms: txn.time_ms,
            seq: txn.seq,
        }
    }

    /// True while any quantity remains to be consumed.
    pub fn is_open(&self) -> bool {
        self.remaining_qty.is_positive()
    }
}

/// One sell's draw against one lot.
///
/// Ephemeral: rebuilt on every replay, consumed by the guard's conservation
/// checks, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    /// Index of the consumed lot in the scope's lot arena.
    pub lot_index: usize,
    /// The consuming sell transaction.
    pub sell_txn: TxnId,
    /// Quantity drawn from the lot.
    pub quantity: Decimal,
    /// quantity * lot.unit_cost.
    pub cost: Decimal,
}

/// Computed fields for one SELL transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellComputed {
    /// The sell transaction.
    pub txn: TxnId,
    /// Execution time of the sell.
    pub time_ms: TimeMs,
    /// Quantity sold.
    pub quantity: Decimal,
    /// price * quantity - commission.
    pub proceeds: Decimal,
    /// Sum of consumed cost over the matched portion.
    pub cost_basis: Decimal,
    /// proceeds - cost_basis.
    pub realized_pnl: Decimal,
    /// Quantity matched against lots.
    pub matched_qty: Decimal,
    /// Quantity with no lot to match; positive means over-sell.
    pub unmatched_qty: Decimal,
    /// Quantity-weighted entry risk, when any consumed lot carries one.
    pub initial_risk_amount: Option<Decimal>,
    /// realized_pnl / initial_risk_amount. None means unknown, which is
    /// distinct from a break-even 0.
    pub r_multiple: Option<Decimal>,
}

impl SellComputed {
    /// True when part of the sell found no inventory to match.
    pub fn is_oversold(&self) -> bool {
        self.unmatched_qty.is_positive()
    }
}

/// Complete rebuilt state for one (account, symbol) scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DerivedState {
    pub lots: Vec<Lot>,
    pub sells: Vec<SellComputed>,
    pub consumptions: Vec<Consumption>,
}

impl DerivedState {
    /// Copy with currency amounts rounded to 2 decimal places and ratios to
    /// 4, half-up. Applied exactly once, immediately before persistence, so
    /// rounding error never compounds across a replay.
    pub fn rounded_for_commit(&self) -> DerivedState {
        let lots = self
            .lots
            .iter()
            .map(|lot| Lot {
                unit_cost: lot.unit_cost.round_currency(),
                risk_per_share: lot.risk_per_share.map(|r| r.round_currency()),
                ..lot.clone()
            })
            .collect();

        let sells = self
            .sells
            .iter()
            .map(|sell| SellComputed {
                proceeds: sell.proceeds.round_currency(),
                cost_basis: sell.cost_basis.round_currency(),
                realized_pnl: sell.realized_pnl.round_currency(),
                initial_risk_amount: sell.initial_risk_amount.map(|a| a.round_currency()),
                r_multiple: sell.r_multiple.map(|r| r.round_ratio()),
                ..sell.clone()
            })
            .collect();

        DerivedState {
            lots,
            sells,
            consumptions: self.consumptions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, Side, Symbol};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn buy(qty: &str, price: &str, commission: &str, stop: Option<&str>) -> Transaction {
        Transaction::new(
            AccountId::new("main".to_string()),
            Symbol::new("AAPL".to_string()),
            Side::Buy,
            d(qty),
            d(price),
            d(commission),
            TimeMs::new(1000),
            stop.map(d),
            None,
        )
    }

    #[test]
    fn test_lot_unit_cost_includes_commission() {
        let lot = Lot::from_buy(&buy("10", "100", "5", None));
        // (100 * 10 + 5) / 10
        assert_eq!(lot.unit_cost, d("100.5"));
        assert_eq!(lot.original_qty, d("10"));
        assert_eq!(lot.remaining_qty, d("10"));
        assert!(lot.is_open());
    }

    #[test]
    fn test_lot_risk_per_share_from_stop() {
        let lot = Lot::from_buy(&buy("10", "100", "0", Some("90")));
        assert_eq!(lot.risk_per_share, Some(d("10")));

        // Stop above entry still yields a positive distance.
        let lot = Lot::from_buy(&buy("10", "100", "0", Some("110")));
        assert_eq!(lot.risk_per_share, Some(d("10")));

        let lot = Lot::from_buy(&buy("10", "100", "0", None));
        assert_eq!(lot.risk_per_share, None);
    }

    #[test]
    fn test_rounded_for_commit_scales() {
        let state = DerivedState {
            lots: vec![Lot {
                txn: TxnId::new("b1".to_string()),
                original_qty: d("3"),
                remaining_qty: d("3"),
                unit_cost: d("33.333333"),
                entry_price: d("33.33"),
                risk_per_share: Some(d("1.005")),
                time_ms: TimeMs::new(1),
                seq: 1,
            }],
            sells: vec![SellComputed {
                txn: TxnId::new("s1".to_string()),
                time_ms: TimeMs::new(2),
                quantity: d("1"),
                proceeds: d("10.005"),
                cost_basis: d("3.333"),
                realized_pnl: d("6.672"),
                matched_qty: d("1"),
                unmatched_qty: Decimal::zero(),
                initial_risk_amount: Some(d("1.005")),
                r_multiple: Some(d("6.63880597")),
            }],
            consumptions: vec![],
        };

        let rounded = state.rounded_for_commit();
        assert_eq!(rounded.lots[0].unit_cost, d("33.33"));
        assert_eq!(rounded.lots[0].risk_per_share, Some(d("1.01")));
        assert_eq!(rounded.sells[0].proceeds, d("10.01"));
        assert_eq!(rounded.sells[0].r_multiple, Some(d("6.6388")));
        // Quantities are never rounded.
        assert_eq!(rounded.lots[0].remaining_qty, d("3"));
    }
}
