//! Realized profit-and-loss derivation for a completed allocation.

use crate::domain::{Decimal, Transaction};

/// Net proceeds of a sell: price * quantity - commission.
pub fn proceeds(sell: &Transaction) -> Decimal {
    sell.price * sell.quantity - sell.commission
}

/// Realized PnL: proceeds minus the matched cost basis.
///
/// No rounding here; persisted values are rounded once at commit time.
pub fn realized_pnl(proceeds: Decimal, cost_basis: Decimal) -> Decimal {
    proceeds - cost_basis
}
