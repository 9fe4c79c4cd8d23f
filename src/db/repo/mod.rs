//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `transactions.rs` - journal entry CRUD and scope queries
//! - `derived.rs` - lot and sell-result reads
//!
//! Decimals are stored as canonical strings and summed in Rust; SQLite's
//! SUM aggregate returns REAL and would lose precision.

mod derived;
mod transactions;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use crate::domain::{AccountId, Decimal, Symbol, Transaction};
use crate::engine::DerivedState;
use crate::store::{LedgerStore, StoreError};

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Parse a stored decimal column, warning and defaulting on corruption.
    pub(crate) fn parse_decimal(context: &str, raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap_or_else(|e| {
            warn!(
                context = context,
                value = raw,
                error = %e,
                "Failed to parse stored decimal, using default"
            );
            Decimal::default()
        })
    }

    // =========================================================================
    // Derived-state commit (spans lots and sell_results)
    // =========================================================================

    /// Replace a scope's derived rows with a freshly computed state, in a
    /// single transaction.
    ///
    /// Readers see either the previous scope state or the new one in full;
    /// a failure rolls the whole batch back.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is committed.
    pub async fn replace_derived_state(
        &self,
        account: &AccountId,
        symbol: &Symbol,
        state: &DerivedState,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM lots WHERE account = ? AND symbol = ?")
            .bind(account.as_str())
            .bind(symbol.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sell_results WHERE account = ? AND symbol = ?")
            .bind(account.as_str())
            .bind(symbol.as_str())
            .execute(&mut *tx)
            .await?;

        for lot in &state.lots {
            sqlx::query(
                r#"
                INSERT INTO lots
                (txn_id, account, symbol, original_qty, remaining_qty, unit_cost,
                 entry_price, risk_per_share, time_ms, seq)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(lot.txn.as_str())
            .bind(account.as_str())
            .bind(symbol.as_str())
            .bind(lot.original_qty.to_canonical_string())
            .bind(lot.remaining_qty.to_canonical_string())
            .bind(lot.unit_cost.to_canonical_string())
            .bind(lot.entry_price.to_canonical_string())
            .bind(lot.risk_per_share.map(|r| r.to_canonical_string()))
            .bind(lot.time_ms.as_i64())
            .bind(lot.seq)
            .execute(&mut *tx)
            .await?;
        }

        for sell in &state.sells {
            sqlx::query(
                r#"
                INSERT INTO sell_results
                (txn_id, account, symbol, quantity, proceeds, cost_basis,
                 realized_pnl, matched_qty, unmatched_qty, initial_risk_amount,
                 r_multiple, oversold, time_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(sell.txn.as_str())
            .bind(account.as_str())
            .bind(symbol.as_str())
            .bind(sell.quantity.to_canonical_string())
            .bind(sell.proceeds.to_canonical_string())
            .bind(sell.cost_basis.to_canonical_string())
            .bind(sell.realized_pnl.to_canonical_string())
            .bind(sell.matched_qty.to_canonical_string())
            .bind(sell.unmatched_qty.to_canonical_string())
            .bind(sell.initial_risk_amount.map(|a| a.to_canonical_string()))
            .bind(sell.r_multiple.map(|r| r.to_canonical_string()))
            .bind(sell.is_oversold() as i64)
            .bind(sell.time_ms.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn load_scope(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.query_scope(account, symbol).await.map_err(Into::into)
    }

    async fn replace_derived(
        &self,
        account: &AccountId,
        symbol: &Symbol,
        state: &DerivedState,
    ) -> Result<(), StoreError> {
        self.replace_derived_state(account, symbol, state)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Side, TimeMs, TxnId};
    use crate::engine::{Lot, SellComputed};
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn scope() -> (AccountId, Symbol) {
        (
            AccountId::new("main".to_string()),
            Symbol::new("AAPL".to_string()),
        )
    }

    fn sample_state() -> DerivedState {
        DerivedState {
            lots: vec![Lot {
                txn: TxnId::new("b1".to_string()),
                original_qty: d("10"),
                remaining_qty: d("5"),
                unit_cost: d("10"),
                entry_price: d("10"),
                risk_per_share: Some(d("1")),
                time_ms: TimeMs::new(1000),
                seq: 1,
            }],
            sells: vec![SellComputed {
                txn: TxnId::new("s1".to_string()),
                time_ms: TimeMs::new(2000),
                quantity: d("5"),
                proceeds: d("75"),
                cost_basis: d("50"),
                realized_pnl: d("25"),
                matched_qty: d("5"),
                unmatched_qty: Decimal::zero(),
                initial_risk_amount: Some(d("5")),
                r_multiple: Some(d("5")),
            }],
            consumptions: vec![],
        }
    }

    #[tokio::test]
    async fn test_replace_derived_state_round_trip() {
        let (repo, _temp) = setup_test_db().await;
        let (account, symbol) = scope();

        repo.replace_derived_state(&account, &symbol, &sample_state())
            .await
            .unwrap();

        let lots = repo.query_lots(&account, &symbol, false).await.unwrap();
        assert_eq!(lots, sample_state().lots);

        let sells = repo.query_sell_results(&account, &symbol).await.unwrap();
        assert_eq!(sells, sample_state().sells);
    }

    #[tokio::test]
    async fn test_replace_derived_state_overwrites_previous() {
        let (repo, _temp) = setup_test_db().await;
        let (account, symbol) = scope();

        repo.replace_derived_state(&account, &symbol, &sample_state())
            .await
            .unwrap();

        let mut next = sample_state();
        next.lots[0].remaining_qty = Decimal::zero();
        next.sells.clear();
        repo.replace_derived_state(&account, &symbol, &next)
            .await
            .unwrap();

        let lots = repo.query_lots(&account, &symbol, false).await.unwrap();
        assert!(lots[0].remaining_qty.is_zero());
        let sells = repo.query_sell_results(&account, &symbol).await.unwrap();
        assert!(sells.is_empty());
    }

    #[tokio::test]
    async fn test_replace_derived_state_scoped() {
        let (repo, _temp) = setup_test_db().await;
        let (account, symbol) = scope();
        let other_symbol = Symbol::new("MSFT".to_string());

        repo.replace_derived_state(&account, &symbol, &sample_state())
            .await
            .unwrap();
        repo.replace_derived_state(&account, &other_symbol, &DerivedState::default())
            .await
            .unwrap();

        // Clearing MSFT must not touch AAPL rows.
        let lots = repo.query_lots(&account, &symbol, false).await.unwrap();
        assert_eq!(lots.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_store_impl_loads_ordered_scope() {
        let (repo, _temp) = setup_test_db().await;
        let (account, symbol) = scope();

        let t1 = Transaction::new(
            account.clone(),
            symbol.clone(),
            Side::Buy,
            d("1"),
            d("100"),
            Decimal::zero(),
            TimeMs::new(2000),
            None,
            None,
        );
        let t2 = Transaction::new(
            account.clone(),
            symbol.clone(),
            Side::Buy,
            d("1"),
            d("100"),
            Decimal::zero(),
            TimeMs::new(1000),
            None,
            None,
        );
        repo.insert_transaction(&t1, None).await.unwrap();
        repo.insert_transaction(&t2, None).await.unwrap();

        let store: &dyn LedgerStore = &repo;
        let txns = store.load_scope(&account, &symbol).await.unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].time_ms, TimeMs::new(1000));
        assert_eq!(txns[1].time_ms, TimeMs::new(2000));
    }
}
