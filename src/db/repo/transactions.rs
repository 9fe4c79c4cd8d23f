//! Journal entry CRUD and scope queries.

use sqlx::Row;

use crate::domain::{AccountId, Side, Symbol, TimeMs, Transaction, TxnId};

use super::Repository;

impl Repository {
    /// Insert a journal entry, assigning its insertion sequence.
    ///
    /// With an `import_key`, re-inserting the same imported row is a no-op.
    /// Returns the assigned sequence, or None when deduplicated away.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_transaction(
        &self,
        txn: &Transaction,
        import_key: Option<&str>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                txn_id, account, symbol, side, quantity, price, commission,
                time_ms, stop_loss, take_profit, import_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(import_key) DO NOTHING
            "#,
        )
        .bind(txn.id.as_str())
        .bind(txn.account.as_str())
        .bind(txn.symbol.as_str())
        .bind(txn.side.to_string())
        .bind(txn.quantity.to_canonical_string())
        .bind(txn.price.to_canonical_string())
        .bind(txn.commission.to_canonical_string())
        .bind(txn.time_ms.as_i64())
        .bind(txn.stop_loss.map(|d| d.to_canonical_string()))
        .bind(txn.take_profit.map(|d| d.to_canonical_string()))
        .bind(import_key)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;

        if result.rows_affected() > 0 {
            Ok(Some(result.last_insert_rowid()))
        } else {
            Ok(None)
        }
    }

    /// Insert many imported rows in one transaction, deduplicating on their
    /// import keys. Returns the number of newly inserted rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no row is kept.
    pub async fn insert_transactions_batch(
        &self,
        txns: &[Transaction],
    ) -> Result<usize, sqlx::Error> {
        if txns.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool().begin().await?;

        for txn in txns {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions (
                    txn_id, account, symbol, side, quantity, price, commission,
                    time_ms, stop_loss, take_profit, import_key, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(import_key) DO NOTHING
                "#,
            )
            .bind(txn.id.as_str())
            .bind(txn.account.as_str())
            .bind(txn.symbol.as_str())
            .bind(txn.side.to_string())
            .bind(txn.quantity.to_canonical_string())
            .bind(txn.price.to_canonical_string())
            .bind(txn.commission.to_canonical_string())
            .bind(txn.time_ms.as_i64())
            .bind(txn.stop_loss.map(|d| d.to_canonical_string()))
            .bind(txn.take_profit.map(|d| d.to_canonical_string()))
            .bind(txn.import_key())
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Fetch a journal entry by id.
    pub async fn get_transaction(&self, id: &TxnId) -> Result<Option<Transaction>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT seq, txn_id, account, symbol, side, quantity, price,
                   commission, time_ms, stop_loss, take_profit
            FROM transactions
            WHERE txn_id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| Self::row_to_transaction(&r)))
    }

    /// Update a journal entry's raw fields, keeping its id and insertion
    /// sequence. Returns false when no such entry exists.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_transaction(&self, txn: &Transaction) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                account = ?, symbol = ?, side = ?, quantity = ?, price = ?,
                commission = ?, time_ms = ?, stop_loss = ?, take_profit = ?
            WHERE txn_id = ?
            "#,
        )
        .bind(txn.account.as_str())
        .bind(txn.symbol.as_str())
        .bind(txn.side.to_string())
        .bind(txn.quantity.to_canonical_string())
        .bind(txn.price.to_canonical_string())
        .bind(txn.commission.to_canonical_string())
        .bind(txn.time_ms.as_i64())
        .bind(txn.stop_loss.map(|d| d.to_canonical_string()))
        .bind(txn.take_profit.map(|d| d.to_canonical_string()))
        .bind(txn.id.as_str())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-insert a previously deleted entry under its original sequence,
    /// undoing a delete whose recompute aborted.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn restore_transaction(&self, txn: &Transaction) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                seq, txn_id, account, symbol, side, quantity, price, commission,
                time_ms, stop_loss, take_profit, import_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(txn.seq)
        .bind(txn.id.as_str())
        .bind(txn.account.as_str())
        .bind(txn.symbol.as_str())
        .bind(txn.side.to_string())
        .bind(txn.quantity.to_canonical_string())
        .bind(txn.price.to_canonical_string())
        .bind(txn.commission.to_canonical_string())
        .bind(txn.time_ms.as_i64())
        .bind(txn.stop_loss.map(|d| d.to_canonical_string()))
        .bind(txn.take_profit.map(|d| d.to_canonical_string()))
        .bind(None::<String>)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Delete a journal entry. Returns false when no such entry exists.
    pub async fn delete_transaction(&self, id: &TxnId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM transactions WHERE txn_id = ?")
            .bind(id.as_str())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load one scope's full history in deterministic replay order.
    pub async fn query_scope(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT seq, txn_id, account, symbol, side, quantity, price,
                   commission, time_ms, stop_loss, take_profit
            FROM transactions
            WHERE account = ? AND symbol = ?
            ORDER BY time_ms ASC, seq ASC
            "#,
        )
        .bind(account.as_str())
        .bind(symbol.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(Self::row_to_transaction).collect())
    }

    /// List an account's journal entries, optionally narrowed to one symbol.
    pub async fn query_transactions(
        &self,
        account: &AccountId,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = match symbol {
            Some(symbol) => {
                sqlx::query(
                    r#"
                    SELECT seq, txn_id, account, symbol, side, quantity, price,
                           commission, time_ms, stop_loss, take_profit
                    FROM transactions
                    WHERE account = ? AND symbol = ?
                    ORDER BY time_ms ASC, seq ASC
                    "#,
                )
                .bind(account.as_str())
                .bind(symbol.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT seq, txn_id, account, symbol, side, quantity, price,
                           commission, time_ms, stop_loss, take_profit
                    FROM transactions
                    WHERE account = ?
                    ORDER BY time_ms ASC, seq ASC
                    "#,
                )
                .bind(account.as_str())
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.iter().map(Self::row_to_transaction).collect())
    }

    /// Distinct symbols an account has journal entries for.
    pub async fn query_account_symbols(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Symbol>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol FROM transactions WHERE account = ? ORDER BY symbol ASC",
        )
        .bind(account.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|r| Symbol::new(r.get::<String, _>("symbol")))
            .collect())
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Transaction {
        let side_str: String = row.get("side");
        let quantity: String = row.get("quantity");
        let price: String = row.get("price");
        let commission: String = row.get("commission");
        let stop_loss: Option<String> = row.get("stop_loss");
        let take_profit: Option<String> = row.get("take_profit");

        Transaction {
            id: TxnId::new(row.get::<String, _>("txn_id")),
            account: AccountId::new(row.get::<String, _>("account")),
            symbol: Symbol::new(row.get::<String, _>("symbol")),
            // The side column is CHECK-constrained; an unknown value means a
            // hand-edited database and is treated as a buy after a warning.
            side: Side::parse(&side_str).unwrap_or_else(|| {
                tracing::warn!(side = %side_str, "unknown side in storage, defaulting to buy");
                Side::Buy
            }),
            quantity: Self::parse_decimal("transactions.quantity", &quantity),
            price: Self::parse_decimal("transactions.price", &price),
            commission: Self::parse_decimal("transactions.commission", &commission),
            time_ms: TimeMs::new(row.get("time_ms")),
            stop_loss: stop_loss
                .as_deref()
                .map(|s| Self::parse_decimal("transactions.stop_loss", s)),
            take_profit: take_profit
                .as_deref()
                .map(|s| Self::parse_decimal("transactions.take_profit", s)),
            seq: row.get("seq"),
        }
    }
}
