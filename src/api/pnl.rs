//! Realized-PnL read endpoint with summary aggregates.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_account, parse_symbol, AppState};
use crate::domain::Decimal;
use crate::engine::SellComputed;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlQuery {
    pub account: String,
    pub symbol: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellDto {
    pub txn_id: String,
    pub time_ms: i64,
    pub quantity: String,
    pub proceeds: String,
    pub cost_basis: String,
    pub realized_pnl: String,
    pub matched_qty: String,
    pub unmatched_qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_risk_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_multiple: Option<String>,
    pub oversold: bool,
}

impl SellDto {
    fn from_sell(sell: &SellComputed) -> Self {
        SellDto {
            txn_id: sell.txn.as_str().to_string(),
            time_ms: sell.time_ms.as_i64(),
            quantity: sell.quantity.to_canonical_string(),
            proceeds: sell.proceeds.to_canonical_string(),
            cost_basis: sell.cost_basis.to_canonical_string(),
            realized_pnl: sell.realized_pnl.to_canonical_string(),
            matched_qty: sell.matched_qty.to_canonical_string(),
            unmatched_qty: sell.unmatched_qty.to_canonical_string(),
            initial_risk_amount: sell.initial_risk_amount.map(|a| a.to_canonical_string()),
            r_multiple: sell.r_multiple.map(|r| r.to_canonical_string()),
            oversold: sell.is_oversold(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSummary {
    pub realized_pnl: String,
    pub sell_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate_pct: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_r_multiple: Option<String>,
    pub oversold_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResponse {
    pub sells: Vec<SellDto>,
    pub summary: PnlSummary,
}

pub async fn get_pnl(
    Query(params): Query<PnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<PnlResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let symbol = parse_symbol(&params.symbol)?;

    let sells = state.repo.query_sell_results(&account, &symbol).await?;

    let mut realized_pnl = Decimal::zero();
    let mut win_count = 0usize;
    let mut loss_count = 0usize;
    let mut oversold_count = 0usize;
    let mut r_sum = Decimal::zero();
    let mut r_count = 0usize;

    for sell in &sells {
        realized_pnl = realized_pnl + sell.realized_pnl;
        if sell.realized_pnl.is_positive() {
            win_count += 1;
        } else if sell.realized_pnl.is_negative() {
            loss_count += 1;
        }
        if sell.is_oversold() {
            oversold_count += 1;
        }
        if let Some(r) = sell.r_multiple {
            r_sum = r_sum + r;
            r_count += 1;
        }
    }

    let win_rate_pct = if sells.is_empty() {
        Decimal::zero()
    } else {
        let wins = Decimal::from_str_canonical(&win_count.to_string())
            .expect("usize is a valid decimal");
        let total = Decimal::from_str_canonical(&sells.len().to_string())
            .expect("usize is a valid decimal");
        (wins / total * Decimal::hundred()).round_ratio()
    };

    let avg_r_multiple = if r_count > 0 {
        let count = Decimal::from_str_canonical(&r_count.to_string())
            .expect("usize is a valid decimal");
        Some((r_sum / count).round_ratio())
    } else {
        None
    };

    Ok(Json(PnlResponse {
        sells: sells.iter().map(SellDto::from_sell).collect(),
        summary: PnlSummary {
            realized_pnl: realized_pnl.to_canonical_string(),
            sell_count: sells.len(),
            win_count,
            loss_count,
            win_rate_pct: win_rate_pct.to_canonical_string(),
            avg_r_multiple: avg_r_multiple.map(|r| r.to_canonical_string()),
            oversold_count,
        },
    }))
}
