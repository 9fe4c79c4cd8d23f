//! Open-inventory read endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_account, parse_symbol, AppState};
use crate::domain::Decimal;
use crate::engine::Lot;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotsQuery {
    pub account: String,
    pub symbol: String,
    pub open_only: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDto {
    pub txn_id: String,
    pub original_qty: String,
    pub remaining_qty: String,
    pub unit_cost: String,
    pub entry_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_share: Option<String>,
    pub time_ms: i64,
}

impl LotDto {
    fn from_lot(lot: &Lot) -> Self {
        LotDto {
            txn_id: lot.txn.as_str().to_string(),
            original_qty: lot.original_qty.to_canonical_string(),
            remaining_qty: lot.remaining_qty.to_canonical_string(),
            unit_cost: lot.unit_cost.to_canonical_string(),
            entry_price: lot.entry_price.to_canonical_string(),
            risk_per_share: lot.risk_per_share.map(|r| r.to_canonical_string()),
            time_ms: lot.time_ms.as_i64(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotsResponse {
    pub lots: Vec<LotDto>,
    pub open_quantity: String,
}

pub async fn get_lots(
    Query(params): Query<LotsQuery>,
    State(state): State<AppState>,
) -> Result<Json<LotsResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let symbol = parse_symbol(&params.symbol)?;
    let open_only = params.open_only.unwrap_or(false);

    let lots = state.repo.query_lots(&account, &symbol, open_only).await?;

    let mut open_quantity = Decimal::zero();
    for lot in &lots {
        open_quantity = open_quantity + lot.remaining_qty;
    }

    Ok(Json(LotsResponse {
        lots: lots.iter().map(LotDto::from_lot).collect(),
        open_quantity: open_quantity.to_canonical_string(),
    }))
}
