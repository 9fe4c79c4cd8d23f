pub mod health;
pub mod import;
pub mod lots;
pub mod pnl;
pub mod transactions;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::Recomputer;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::domain::{AccountId, Symbol};
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub recomputer: Arc<Recomputer>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, recomputer: Arc<Recomputer>) -> Self {
        Self {
            repo,
            config,
            recomputer,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/v1/transactions/:id",
            put(transactions::update_transaction).delete(transactions::delete_transaction),
        )
        .route("/v1/lots", get(lots::get_lots))
        .route("/v1/pnl", get(pnl::get_pnl))
        .route("/v1/import", post(import::import_csv))
        .layer(cors)
        .with_state(state)
}

/// Parse a required non-empty account query/body field.
pub(crate) fn parse_account(input: &str) -> Result<AccountId, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("account must not be empty".to_string()));
    }
    Ok(AccountId::new(trimmed.to_string()))
}

/// Parse a required non-empty symbol query/body field.
pub(crate) fn parse_symbol(input: &str) -> Result<Symbol, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("symbol must not be empty".to_string()));
    }
    Ok(Symbol::new(trimmed.to_string()))
}
