//! Reads over the derived lot and sell-result tables.

use sqlx::Row;

use crate::domain::{AccountId, Symbol, TimeMs, TxnId};
use crate::engine::{Lot, SellComputed};

use super::Repository;

impl Repository {
    /// Load a scope's lots in FIFO order, optionally only those still open.
    pub async fn query_lots(
        &self,
        account: &AccountId,
        symbol: &Symbol,
        open_only: bool,
    ) -> Result<Vec<Lot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT txn_id, original_qty, remaining_qty, unit_cost, entry_price,
                   risk_per_share, time_ms, seq
            FROM lots
            WHERE account = ? AND symbol = ?
            ORDER BY time_ms ASC, seq ASC
            "#,
        )
        .bind(account.as_str())
        .bind(symbol.as_str())
        .fetch_all(self.pool())
        .await?;

        let lots: Vec<Lot> = rows
            .iter()
            .map(|row| {
                let original_qty: String = row.get("original_qty");
                let remaining_qty: String = row.get("remaining_qty");
                let unit_cost: String = row.get("unit_cost");
                let entry_price: String = row.get("entry_price");
                let risk_per_share: Option<String> = row.get("risk_per_share");

                Lot {
                    txn: TxnId::new(row.get::<String, _>("txn_id")),
                    original_qty: Self::parse_decimal("lots.original_qty", &original_qty),
                    remaining_qty: Self::parse_decimal("lots.remaining_qty", &remaining_qty),
                    unit_cost: Self::parse_decimal("lots.unit_cost", &unit_cost),
                    entry_price: Self::parse_decimal("lots.entry_price", &entry_price),
                    risk_per_share: risk_per_share
                        .as_deref()
                        .map(|s| Self::parse_decimal("lots.risk_per_share", s)),
                    time_ms: TimeMs::new(row.get("time_ms")),
                    seq: row.get("seq"),
                }
            })
            .collect();

        if open_only {
            Ok(lots.into_iter().filter(|l| l.is_open()).collect())
        } else {
            Ok(lots)
        }
    }

    /// Load a scope's computed sell rows in time order.
    pub async fn query_sell_results(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<Vec<SellComputed>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT txn_id, quantity, proceeds, cost_basis, realized_pnl,
                   matched_qty, unmatched_qty, initial_risk_amount, r_multiple,
                   time_ms
            FROM sell_results
            WHERE account = ? AND symbol = ?
            ORDER BY time_ms ASC, txn_id ASC
            "#,
        )
        .bind(account.as_str())
        .bind(symbol.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let quantity: String = row.get("quantity");
                let proceeds: String = row.get("proceeds");
                let cost_basis: String = row.get("cost_basis");
                let realized_pnl: String = row.get("realized_pnl");
                let matched_qty: String = row.get("matched_qty");
                let unmatched_qty: String = row.get("unmatched_qty");
                let initial_risk_amount: Option<String> = row.get("initial_risk_amount");
                let r_multiple: Option<String> = row.get("r_multiple");

                SellComputed {
                    txn: TxnId::new(row.get::<String, _>("txn_id")),
                    time_ms: TimeMs::new(row.get("time_ms")),
                    quantity: Self::parse_decimal("sell_results.quantity", &quantity),
                    proceeds: Self::parse_decimal("sell_results.proceeds", &proceeds),
                    cost_basis: Self::parse_decimal("sell_results.cost_basis", &cost_basis),
                    realized_pnl: Self::parse_decimal("sell_results.realized_pnl", &realized_pnl),
                    matched_qty: Self::parse_decimal("sell_results.matched_qty", &matched_qty),
                    unmatched_qty: Self::parse_decimal(
                        "sell_results.unmatched_qty",
                        &unmatched_qty,
                    ),
                    initial_risk_amount: initial_risk_amount
                        .as_deref()
                        .map(|s| Self::parse_decimal("sell_results.initial_risk_amount", s)),
                    r_multiple: r_multiple
                        .as_deref()
                        .map(|s| Self::parse_decimal("sell_results.r_multiple", s)),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::Decimal;
    use crate::engine::DerivedState;
    use std::str::FromStr;
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

    fn lot(id: &str, remaining: &str, time_ms: i64, seq: i64) -> Lot {
        Lot {
            txn: TxnId::new(id.to_string()),
            original_qty: d("10"),
            remaining_qty: d(remaining),
            unit_cost: d("10"),
            entry_price: d("10"),
            risk_per_share: None,
            time_ms: TimeMs::new(time_ms),
            seq,
        }
    }

    #[tokio::test]
    async fn test_query_lots_open_only_filter() {
        let (repo, _temp) = setup_test_db().await;
        let account = AccountId::new("main".to_string());
        let symbol = Symbol::new("AAPL".to_string());

        let state = DerivedState {
            lots: vec![lot("b1", "0", 1000, 1), lot("b2", "5", 2000, 2)],
            sells: vec![],
            consumptions: vec![],
        };
        repo.replace_derived_state(&account, &symbol, &state)
            .await
            .unwrap();

        let all = repo.query_lots(&account, &symbol, false).await.unwrap();
        assert_eq!(all.len(), 2);

        let open = repo.query_lots(&account, &symbol, true).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].txn, TxnId::new("b2".to_string()));
    }

    #[tokio::test]
    async fn test_query_lots_fifo_order() {
        let (repo, _temp) = setup_test_db().await;
        let account = AccountId::new("main".to_string());
        let symbol = Symbol::new("AAPL".to_string());

        let state = DerivedState {
            lots: vec![
                lot("late", "1", 2000, 3),
                lot("tie2", "1", 1000, 2),
                lot("tie1", "1", 1000, 1),
            ],
            sells: vec![],
            consumptions: vec![],
        };
        repo.replace_derived_state(&account, &symbol, &state)
            .await
            .unwrap();

        let lots = repo.query_lots(&account, &symbol, false).await.unwrap();
        assert_eq!(lots[0].txn, TxnId::new("tie1".to_string()));
        assert_eq!(lots[1].txn, TxnId::new("tie2".to_string()));
        assert_eq!(lots[2].txn, TxnId::new("late".to_string()));
    }

    #[tokio::test]
    async fn test_query_sell_results_none_fields_survive() {
        let (repo, _temp) = setup_test_db().await;
        let account = AccountId::new("main".to_string());
        let symbol = Symbol::new("AAPL".to_string());

        let state = DerivedState {
            lots: vec![],
            sells: vec![SellComputed {
                txn: TxnId::new("s1".to_string()),
                time_ms: TimeMs::new(3000),
                quantity: d("5"),
                proceeds: d("75"),
                cost_basis: d("50"),
                realized_pnl: d("25"),
                matched_qty: d("5"),
                unmatched_qty: Decimal::zero(),
                initial_risk_amount: None,
                r_multiple: None,
            }],
            consumptions: vec![],
        };
        repo.replace_derived_state(&account, &symbol, &state)
            .await
            .unwrap();

        let sells = repo.query_sell_results(&account, &symbol).await.unwrap();
        assert_eq!(sells.len(), 1);
        // Unknown risk stays unknown through the database round trip.
        assert_eq!(sells[0].initial_risk_amount, None);
        assert_eq!(sells[0].r_multiple, None);
    }
}
