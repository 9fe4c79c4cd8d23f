//! FIFO allocation of a sell quantity against open lots.

use crate::domain::{Decimal, Transaction};

use super::{Consumption, Lot};

/// Result of matching one sell against the scope's lot arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Draws against individual lots, in consumption order.
    pub consumptions: Vec<Consumption>,
    /// Sum of consumed cost over the matched portion.
    pub total_cost_basis: Decimal,
    /// Quantity left unmatched after all open lots were exhausted.
    /// Positive means over-sell.
    pub unmatched_qty: Decimal,
}

impl Allocation {
    /// Quantity matched against lots.
    pub fn matched_qty(&self, sell_qty: Decimal) -> Decimal {
        sell_qty - self.unmatched_qty
    }
}

/// Match a sell's quantity against open lots, oldest first.
///
/// `lots` is the scope's lot arena in (time_ms, seq) order; the replay only
/// creates lots from buys already processed, so every lot here is dated at
/// or before the sell. Consumption records reference lots by arena index.
///
/// Pure: the lots are read, never mutated. The replay applies the
/// decrements in one pass after the allocation completes.
pub fn allocate(sell: &Transaction, lots: &[Lot]) -> Allocation {
    let mut consumptions = Vec::new();
    let mut total_cost_basis = Decimal::zero();
    let mut needed = sell.quantity;

    for (lot_index, lot) in lots.iter().enumerate() {
        if !needed.is_positive() {
            break;
        }
        if !lot.is_open() {
            continue;
        }

        let take = lot.remaining_qty.min(needed);
        let cost = take * lot.unit_cost;

        consumptions.push(Consumption {
            lot_index,
            sell_txn: sell.id.clone(),
            quantity: take,
            cost,
        });

        total_cost_basis = total_cost_basis + cost;
        needed = needed - take;
    }

    Allocation {
        consumptions,
        total_cost_basis,
        unmatched_qty: needed,
    }
}
