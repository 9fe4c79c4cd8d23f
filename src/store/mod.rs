//! Adapter boundary between the engine and the transaction store.
//!
//! The orchestration layer talks to this trait only; `db::Repository` is
//! the SQLite implementation and `MemoryStore` the in-memory test double.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AccountId, Symbol, Transaction};
use crate::engine::DerivedState;

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("store failure: {0}")]
    Internal(String),
}

/// The transaction-store adapter the recompute pipeline runs against.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the full ordered transaction history of one scope.
    async fn load_scope(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Replace the scope's derived rows with a freshly committed state.
    ///
    /// Must be atomic: readers see either the previous state or the new one,
    /// never a partial write.
    async fn replace_derived(
        &self,
        account: &AccountId,
        symbol: &Symbol,
        state: &DerivedState,
    ) -> Result<(), StoreError>;
}

/// In-memory store for engine and orchestration tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    transactions: Vec<Transaction>,
    derived: std::collections::HashMap<(AccountId, Symbol), DerivedState>,
    next_seq: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction, assigning its insertion sequence.
    pub async fn push(&self, mut txn: Transaction) -> Transaction {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        txn.seq = inner.next_seq;
        inner.transactions.push(txn.clone());
        txn
    }

    /// Remove a transaction by id. Returns true if one was removed.
    pub async fn remove(&self, id: &crate::domain::TxnId) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.transactions.len();
        inner.transactions.retain(|t| &t.id != id);
        inner.transactions.len() != before
    }

    /// Read back the last committed state for a scope, if any.
    pub async fn derived(&self, account: &AccountId, symbol: &Symbol) -> Option<DerivedState> {
        let inner = self.inner.read().await;
        inner
            .derived
            .get(&(account.clone(), symbol.clone()))
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_scope(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<Vec<Transaction>, StoreError> {
        let inner = self.inner.read().await;
        let mut txns: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| &t.account == account && &t.symbol == symbol)
            .cloned()
            .collect();
        crate::domain::ordering::sort_transactions_deterministic(&mut txns);
        Ok(txns)
    }

    async fn replace_derived(
        &self,
        account: &AccountId,
        symbol: &Symbol,
        state: &DerivedState,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .derived
            .insert((account.clone(), symbol.clone()), state.clone());
        Ok(())
    }
}
