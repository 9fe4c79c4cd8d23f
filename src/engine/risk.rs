//! Entry-risk and R-multiple derivation for a sell.

use crate::domain::Decimal;

use super::{Consumption, Lot};

/// Risk figures attached to a computed sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskFigures {
    /// initial_risk_per_share * sell quantity, when known.
    pub initial_risk_amount: Option<Decimal>,
    /// realized_pnl / initial_risk_amount, when the amount is positive.
    pub r_multiple: Option<Decimal>,
}

/// Quantity-weighted average entry risk per share over the consumed lots
/// that carry stop-loss data.
///
/// Lots without risk data contribute nothing to the average. Returns None
/// when no consumed lot has risk data; a None R-multiple means unknown and
/// must never collapse into 0, which is a valid break-even result.
pub fn initial_risk_per_share(consumptions: &[Consumption], lots: &[Lot]) -> Option<Decimal> {
    let mut weighted = Decimal::zero();
    let mut qty_with_risk = Decimal::zero();

    for consumption in consumptions {
        if let Some(risk) = lots[consumption.lot_index].risk_per_share {
            weighted = weighted + consumption.quantity * risk;
            qty_with_risk = qty_with_risk + consumption.quantity;
        }
    }

    if qty_with_risk.is_positive() {
        Some(weighted / qty_with_risk)
    } else {
        None
    }
}

/// Derive the full risk figures for a sell.
pub fn risk_figures(
    consumptions: &[Consumption],
    lots: &[Lot],
    sell_qty: Decimal,
    realized_pnl: Decimal,
) -> RiskFigures {
    let per_share = initial_risk_per_share(consumptions, lots);
    let initial_risk_amount = per_share.map(|r| r * sell_qty);
    let r_multiple = match initial_risk_amount {
        Some(amount) if amount.is_positive() => Some(realized_pnl / amount),
        _ => None,
    };

    RiskFigures {
        initial_risk_amount,
        r_multiple,
    }
}
