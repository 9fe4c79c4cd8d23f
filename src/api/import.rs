//! CSV import of journal rows.
//!
//! Rows carry a content-hash import key, so re-posting the same file only
//! inserts what is new. Every scope touched by the import is recomputed
//! afterward.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::api::AppState;
use crate::domain::{AccountId, Decimal, Side, Symbol, TimeMs, Transaction};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("csv parse error: {0}")]
    Csv(String),
    #[error("row {row}: {message}")]
    Row { row: usize, message: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub rows: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub scopes_recomputed: usize,
}

/// Parse the CSV body into validated transactions.
///
/// Expected header: account,symbol,side,quantity,price,commission,time_ms,
/// stop_loss,take_profit (the last three may be empty per row).
pub fn parse_csv(csv_bytes: &[u8]) -> Result<Vec<Transaction>, ImportError> {
    #[derive(Debug, serde::Deserialize)]
    struct Row {
        account: String,
        symbol: String,
        side: String,
        quantity: String,
        price: String,
        commission: Option<String>,
        time_ms: i64,
        stop_loss: Option<String>,
        take_profit: Option<String>,
    }

    fn parse_side(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "buy" => Some(Side::Buy),
            "s" | "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    fn parse_decimal(row: usize, name: &str, value: &str) -> Result<Decimal, ImportError> {
        Decimal::from_str_canonical(value.trim()).map_err(|e| ImportError::Row {
            row,
            message: format!("invalid {}: {}", name, e),
        })
    }

    fn parse_optional(
        row: usize,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<Decimal>, ImportError> {
        match value.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => parse_decimal(row, name, s).map(Some),
            None => Ok(None),
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_bytes);

    let mut txns = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        let row_no = index + 1;
        let row = record.map_err(|e| ImportError::Csv(e.to_string()))?;

        let side = parse_side(&row.side).ok_or_else(|| ImportError::Row {
            row: row_no,
            message: format!("invalid side: {}", row.side),
        })?;
        let quantity = parse_decimal(row_no, "quantity", &row.quantity)?;
        let price = parse_decimal(row_no, "price", &row.price)?;
        let commission = parse_optional(row_no, "commission", row.commission.as_deref())?
            .unwrap_or_else(Decimal::zero);
        let stop_loss = parse_optional(row_no, "stop_loss", row.stop_loss.as_deref())?;
        let take_profit = parse_optional(row_no, "take_profit", row.take_profit.as_deref())?;

        let txn = Transaction::new(
            AccountId::new(row.account.trim().to_string()),
            Symbol::new(row.symbol.trim().to_string()),
            side,
            quantity,
            price,
            commission,
            TimeMs::new(row.time_ms),
            stop_loss,
            take_profit,
        );
        txn.validate().map_err(|e| ImportError::Row {
            row: row_no,
            message: e.to_string(),
        })?;
        txns.push(txn);
    }

    Ok(txns)
}

pub async fn import_csv(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<ImportResponse>), AppError> {
    let txns = parse_csv(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if txns.is_empty() {
        return Err(AppError::BadRequest("no rows to import".to_string()));
    }

    let inserted = state.repo.insert_transactions_batch(&txns).await?;

    let scopes: BTreeSet<(AccountId, Symbol)> = txns
        .iter()
        .map(|t| (t.account.clone(), t.symbol.clone()))
        .collect();

    for (account, symbol) in &scopes {
        state.recomputer.recompute(account, symbol).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            rows: txns.len(),
            inserted,
            duplicates: txns.len() - inserted,
            scopes_recomputed: scopes.len(),
        }),
    ))
}
