//! Post-replay invariant verification.
//!
//! Runs between replay and commit. A violation here means a defect in the
//! allocation logic, not bad user input: the working state is clamped where
//! that is safe, the defect is logged, and the commit for the scope aborts.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::{Decimal, TxnId};

use super::DerivedState;

/// A broken invariant in a freshly replayed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("lot {lot} has negative remaining quantity {remaining}")]
    NegativeRemaining { lot: TxnId, remaining: Decimal },
    #[error("lot {lot} remaining {remaining} exceeds original {original}")]
    RemainingExceedsOriginal {
        lot: TxnId,
        remaining: Decimal,
        original: Decimal,
    },
    #[error("lot {lot} consumed {consumed} but its quantity dropped by {depleted}")]
    ConservationMismatch {
        lot: TxnId,
        consumed: Decimal,
        depleted: Decimal,
    },
    #[error("sell {sell} cost basis {cost_basis} differs from consumed cost {consumed_cost}")]
    CostBasisMismatch {
        sell: TxnId,
        cost_basis: Decimal,
        consumed_cost: Decimal,
    },
    #[error("sell {sell} consumed lots out of first-in-first-out order")]
    ConsumptionOrder { sell: TxnId },
}

/// Verify a replayed state against the ledger invariants.
///
/// Negative remaining quantities are clamped to zero before returning the
/// violation, so a later inspection of the aborted state does not show
/// impossible inventory.
///
/// # Errors
/// Returns the first violation found; the caller must abort the commit.
pub fn verify(state: &mut DerivedState) -> Result<(), InvariantViolation> {
    let mut first: Option<InvariantViolation> = None;

    for lot in &mut state.lots {
        if lot.remaining_qty.is_negative() {
            tracing::error!(
                lot = %lot.txn,
                remaining = %lot.remaining_qty,
                "negative remaining quantity; clamping to zero"
            );
            let violation = InvariantViolation::NegativeRemaining {
                lot: lot.txn.clone(),
                remaining: lot.remaining_qty,
            };
            lot.remaining_qty = Decimal::zero();
            first.get_or_insert(violation);
        } else if lot.remaining_qty > lot.original_qty {
            first.get_or_insert(InvariantViolation::RemainingExceedsOriginal {
                lot: lot.txn.clone(),
                remaining: lot.remaining_qty,
                original: lot.original_qty,
            });
        }
    }
    if let Some(violation) = first {
        return Err(violation);
    }

    verify_conservation(state)?;
    verify_cost_basis(state)?;
    verify_consumption_order(state)?;
    Ok(())
}

/// Each lot's depletion must equal the total quantity consumed from it.
fn verify_conservation(state: &DerivedState) -> Result<(), InvariantViolation> {
    let mut consumed_by_lot: HashMap<usize, Decimal> = HashMap::new();
    for consumption in &state.consumptions {
        let entry = consumed_by_lot
            .entry(consumption.lot_index)
            .or_insert_with(Decimal::zero);
        *entry = *entry + consumption.quantity;
    }

    for (index, lot) in state.lots.iter().enumerate() {
        let consumed = consumed_by_lot
            .get(&index)
            .copied()
            .unwrap_or_else(Decimal::zero);
        let depleted = lot.original_qty - lot.remaining_qty;
        if consumed != depleted {
            return Err(InvariantViolation::ConservationMismatch {
                lot: lot.txn.clone(),
                consumed,
                depleted,
            });
        }
    }
    Ok(())
}

/// A sell's cost basis must be exactly the sum of its consumed cost.
fn verify_cost_basis(state: &DerivedState) -> Result<(), InvariantViolation> {
    for sell in &state.sells {
        let mut consumed_cost = Decimal::zero();
        for consumption in state.consumptions.iter().filter(|c| c.sell_txn == sell.txn) {
            consumed_cost = consumed_cost + consumption.cost;
        }
        if consumed_cost != sell.cost_basis {
            return Err(InvariantViolation::CostBasisMismatch {
                sell: sell.txn.clone(),
                cost_basis: sell.cost_basis,
                consumed_cost,
            });
        }
    }
    Ok(())
}

/// Each sell must have consumed lots in ascending (time, seq) order, and
/// never a lot dated after the sell itself.
fn verify_consumption_order(state: &DerivedState) -> Result<(), InvariantViolation> {
    let sell_times: HashMap<&TxnId, i64> = state
        .sells
        .iter()
        .map(|s| (&s.txn, s.time_ms.as_i64()))
        .collect();

    let mut last_key_by_sell: HashMap<&TxnId, (i64, i64)> = HashMap::new();
    for consumption in &state.consumptions {
        let lot = &state.lots[consumption.lot_index];
        let key = (lot.time_ms.as_i64(), lot.seq);

        if let Some(sell_time) = sell_times.get(&consumption.sell_txn) {
            if lot.time_ms.as_i64() > *sell_time {
                return Err(InvariantViolation::ConsumptionOrder {
                    sell: consumption.sell_txn.clone(),
                });
            }
        }

        if let Some(last) = last_key_by_sell.get(&consumption.sell_txn) {
            if key <= *last {
                return Err(InvariantViolation::ConsumptionOrder {
                    sell: consumption.sell_txn.clone(),
                });
            }
        }
        last_key_by_sell.insert(&consumption.sell_txn, key);
    }
    Ok(())
}
