//! Journal CRUD endpoints. Every mutation triggers a full recompute of the
//! affected scope(s); a failed recompute rolls the row change back so the
//! journal and the derived tables never drift apart.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{parse_account, parse_symbol, AppState};
use crate::domain::{AccountId, Decimal, Side, Symbol, TimeMs, Transaction, TxnId};
use crate::error::AppError;
use crate::orchestration::RecomputeSummary;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    pub account: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub commission: Option<String>,
    pub time_ms: i64,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    pub account: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub commission: String,
    pub time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<String>,
}

impl TransactionDto {
    pub fn from_txn(txn: &Transaction) -> Self {
        TransactionDto {
            id: txn.id.as_str().to_string(),
            account: txn.account.as_str().to_string(),
            symbol: txn.symbol.as_str().to_string(),
            side: txn.side.to_string(),
            quantity: txn.quantity.to_canonical_string(),
            price: txn.price.to_canonical_string(),
            commission: txn.commission.to_canonical_string(),
            time_ms: txn.time_ms.as_i64(),
            stop_loss: txn.stop_loss.map(|d| d.to_canonical_string()),
            take_profit: txn.take_profit.map(|d| d.to_canonical_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeDto {
    pub transactions: usize,
    pub lots: usize,
    pub sells: usize,
    pub oversold_sells: usize,
}

impl RecomputeDto {
    pub fn from_summary(summary: &RecomputeSummary) -> Self {
        RecomputeDto {
            transactions: summary.transactions,
            lots: summary.lots,
            sells: summary.sells,
            oversold_sells: summary.oversold_sells,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub transaction: TransactionDto,
    pub recompute: RecomputeDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: bool,
    pub recompute: RecomputeDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub account: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub transactions: Vec<TransactionDto>,
}

fn parse_decimal_field(name: &str, value: &str) -> Result<Decimal, AppError> {
    Decimal::from_str_canonical(value.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid decimal for {}", name)))
}

fn body_to_transaction(body: &TransactionBody) -> Result<Transaction, AppError> {
    let account = parse_account(&body.account)?;
    let symbol = parse_symbol(&body.symbol)?;
    let side = Side::parse(body.side.trim())
        .ok_or_else(|| AppError::BadRequest("side must be buy or sell".to_string()))?;

    let quantity = parse_decimal_field("quantity", &body.quantity)?;
    let price = parse_decimal_field("price", &body.price)?;
    let commission = body
        .commission
        .as_deref()
        .map(|s| parse_decimal_field("commission", s))
        .transpose()?
        .unwrap_or_else(Decimal::zero);
    let stop_loss = body
        .stop_loss
        .as_deref()
        .map(|s| parse_decimal_field("stopLoss", s))
        .transpose()?;
    let take_profit = body
        .take_profit
        .as_deref()
        .map(|s| parse_decimal_field("takeProfit", s))
        .transpose()?;

    let txn = Transaction::new(
        account,
        symbol,
        side,
        quantity,
        price,
        commission,
        TimeMs::new(body.time_ms),
        stop_loss,
        take_profit,
    );
    txn.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(txn)
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(body): Json<TransactionBody>,
) -> Result<(StatusCode, Json<MutationResponse>), AppError> {
    let mut txn = body_to_transaction(&body)?;

    let seq = state
        .repo
        .insert_transaction(&txn, None)
        .await?
        .ok_or_else(|| AppError::Internal("insert affected no rows".to_string()))?;
    txn.seq = seq;

    match state.recomputer.recompute(&txn.account, &txn.symbol).await {
        Ok(summary) => Ok((
            StatusCode::CREATED,
            Json(MutationResponse {
                transaction: TransactionDto::from_txn(&txn),
                recompute: RecomputeDto::from_summary(&summary),
            }),
        )),
        Err(err) => {
            // A failed recompute committed nothing; undoing the row keeps
            // journal and derived tables consistent.
            if let Err(undo_err) = state.repo.delete_transaction(&txn.id).await {
                warn!(txn = %txn.id, error = %undo_err, "failed to undo insert after aborted recompute");
            }
            Err(err.into())
        }
    }
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TransactionBody>,
) -> Result<Json<MutationResponse>, AppError> {
    let id = TxnId::new(id);
    let existing = state
        .repo
        .get_transaction(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

    let mut updated = body_to_transaction(&body)?;
    updated.id = existing.id.clone();
    updated.seq = existing.seq;

    if !state.repo.update_transaction(&updated).await? {
        return Err(AppError::NotFound(format!("transaction {}", id)));
    }

    let mut scopes = vec![(updated.account.clone(), updated.symbol.clone())];
    let old_scope = (existing.account.clone(), existing.symbol.clone());
    if old_scope != scopes[0] {
        scopes.push(old_scope);
    }

    match recompute_scopes(&state, &scopes).await {
        Ok(summary) => Ok(Json(MutationResponse {
            transaction: TransactionDto::from_txn(&updated),
            recompute: RecomputeDto::from_summary(&summary),
        })),
        Err(err) => {
            if let Err(undo_err) = state.repo.update_transaction(&existing).await {
                warn!(txn = %id, error = %undo_err, "failed to undo edit after aborted recompute");
            } else {
                restore_scopes(&state, &scopes).await;
            }
            Err(err)
        }
    }
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = TxnId::new(id);
    let existing = state
        .repo
        .get_transaction(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

    if !state.repo.delete_transaction(&id).await? {
        return Err(AppError::NotFound(format!("transaction {}", id)));
    }

    match state
        .recomputer
        .recompute(&existing.account, &existing.symbol)
        .await
    {
        Ok(summary) => Ok(Json(DeleteResponse {
            deleted: true,
            recompute: RecomputeDto::from_summary(&summary),
        })),
        Err(err) => {
            if let Err(undo_err) = state.repo.restore_transaction(&existing).await {
                warn!(txn = %id, error = %undo_err, "failed to undo delete after aborted recompute");
            }
            Err(err.into())
        }
    }
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let symbol = params
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Symbol::new(s.to_string()));

    let txns = state
        .repo
        .query_transactions(&account, symbol.as_ref())
        .await?;

    Ok(Json(ListResponse {
        transactions: txns.iter().map(TransactionDto::from_txn).collect(),
    }))
}

/// Recompute a set of scopes, returning the first scope's summary.
async fn recompute_scopes(
    state: &AppState,
    scopes: &[(AccountId, Symbol)],
) -> Result<RecomputeSummary, AppError> {
    let mut first: Option<RecomputeSummary> = None;
    for (account, symbol) in scopes {
        let summary = state.recomputer.recompute(account, symbol).await?;
        first.get_or_insert(summary);
    }
    first.ok_or_else(|| AppError::Internal("no scope to recompute".to_string()))
}

/// Best-effort re-derivation after a rolled-back edit, so scopes already
/// committed with the edited row go back to the restored journal.
async fn restore_scopes(state: &AppState, scopes: &[(AccountId, Symbol)]) {
    for (account, symbol) in scopes {
        if let Err(err) = state.recomputer.recompute(account, symbol).await {
            warn!(
                account = %account,
                symbol = %symbol,
                error = %err,
                "failed to re-derive scope after rollback"
            );
        }
    }
}
