//! Full-history replay for one (account, symbol) scope.
//!
//! The replay is the only place lot state mutates, and it mutates a working
//! copy it built itself: raw transactions in, complete `DerivedState` out.
//! Any error discards the working state with no partial effects.

use thiserror::Error;

use crate::domain::ordering::sort_transactions_deterministic;
use crate::domain::{Decimal, Side, Transaction, TxnId, ValidationError};

use super::{allocate, pnl, risk, DerivedState, Lot, SellComputed};

/// What to do when a sell exceeds the open inventory at its point in
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverSellPolicy {
    /// Price the unmatched remainder at zero cost basis and flag the sell.
    #[default]
    ZeroCost,
    /// Fail the replay; nothing is committed.
    Reject,
}

/// A replay that could not produce a committable state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("sell {txn} for {quantity} exceeds open inventory by {unmatched}")]
    OverSell {
        txn: TxnId,
        quantity: Decimal,
        unmatched: Decimal,
    },
}

/// Rebuild the derived state of a scope from its raw transactions.
///
/// Lots are re-derived from their buys with full remaining quantity, then
/// sells run in deterministic (time_ms, seq, id) order: allocate, PnL,
/// risk, and only then the lot decrements. Because buys enter the arena in
/// the same order, a sell can never see a lot dated after it.
///
/// Pure and deterministic: the same snapshot always yields a bit-identical
/// `DerivedState`.
///
/// # Errors
/// All transactions are validated before any work happens. Under
/// `OverSellPolicy::Reject` an over-sell aborts the replay.
pub fn replay(
    transactions: &[Transaction],
    policy: OverSellPolicy,
) -> Result<DerivedState, ReplayError> {
    for txn in transactions {
        txn.validate()?;
    }

    let mut ordered = transactions.to_vec();
    sort_transactions_deterministic(&mut ordered);

    let mut state = DerivedState::default();

    for txn in &ordered {
        match txn.side {
            Side::Buy => state.lots.push(Lot::from_buy(txn)),
            Side::Sell => {
                let allocation = allocate(txn, &state.lots);

                if allocation.unmatched_qty.is_positive() && policy == OverSellPolicy::Reject {
                    return Err(ReplayError::OverSell {
                        txn: txn.id.clone(),
                        quantity: txn.quantity,
                        unmatched: allocation.unmatched_qty,
                    });
                }

                let proceeds = pnl::proceeds(txn);
                let realized = pnl::realized_pnl(proceeds, allocation.total_cost_basis);
                let figures =
                    risk::risk_figures(&allocation.consumptions, &state.lots, txn.quantity, realized);

                // Allocation complete; apply the decrements in one pass.
                for consumption in &allocation.consumptions {
                    let lot = &mut state.lots[consumption.lot_index];
                    lot.remaining_qty = lot.remaining_qty - consumption.quantity;
                }

                state.sells.push(SellComputed {
                    txn: txn.id.clone(),
                    time_ms: txn.time_ms,
                    quantity: txn.quantity,
                    proceeds,
                    cost_basis: allocation.total_cost_basis,
                    realized_pnl: realized,
                    matched_qty: allocation.matched_qty(txn.quantity),
                    unmatched_qty: allocation.unmatched_qty,
                    initial_risk_amount: figures.initial_risk_amount,
                    r_multiple: figures.r_multiple,
                });
                state.consumptions.extend(allocation.consumptions);
            }
        }
    }

    Ok(state)
}
