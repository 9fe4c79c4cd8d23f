//! Full-scope recompute pipeline.
//!
//! Every create, edit, or delete of a transaction funnels through
//! `Recomputer::recompute` for its scope. There is no incremental path: an
//! earlier-dated buy can change which lots satisfy already-processed sells,
//! so the scope's history is always replayed whole.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info};

use crate::domain::{AccountId, Symbol, TxnId, ValidationError};
use crate::engine::{replay, verify, InvariantViolation, OverSellPolicy, ReplayError};
use crate::store::{LedgerStore, StoreError};

/// Outcome of a committed recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub transactions: usize,
    pub lots: usize,
    pub sells: usize,
    pub oversold_sells: usize,
}

/// A recompute that aborted; the previously committed state is untouched.
#[derive(Debug, Error)]
pub enum RecomputeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("over-sell rejected for {txn}")]
    OverSellRejected { txn: TxnId },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ReplayError> for RecomputeError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Validation(e) => RecomputeError::Validation(e),
            ReplayError::OverSell { txn, .. } => RecomputeError::OverSellRejected { txn },
        }
    }
}

/// Rebuilds the derived state of a scope from its raw transactions.
pub struct Recomputer {
    store: Arc<dyn LedgerStore>,
    policy: OverSellPolicy,
    locks: Mutex<HashMap<(AccountId, Symbol), Arc<tokio::sync::Mutex<()>>>>,
}

impl Recomputer {
    pub fn new(store: Arc<dyn LedgerStore>, policy: OverSellPolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replay one scope end to end and commit the result atomically.
    ///
    /// Mutating operations on a scope serialize on a per-scope mutex; two
    /// concurrent replays would race on the working lot state. Reads of
    /// committed rows do not take this lock.
    ///
    /// Running twice with no intervening changes commits bit-identical
    /// fields both times.
    ///
    /// # Errors
    /// Any failure aborts before the commit; the store keeps the previous
    /// state.
    pub async fn recompute(
        &self,
        account: &AccountId,
        symbol: &Symbol,
    ) -> Result<RecomputeSummary, RecomputeError> {
        let scope_lock = self.scope_lock(account, symbol);
        let _guard = scope_lock.lock().await;

        let transactions = self.store.load_scope(account, symbol).await?;

        let mut state = replay(&transactions, self.policy)?;

        if let Err(violation) = verify(&mut state) {
            error!(
                account = %account,
                symbol = %symbol,
                %violation,
                "invariant violation; aborting commit"
            );
            return Err(violation.into());
        }

        let committed = state.rounded_for_commit();
        self.store
            .replace_derived(account, symbol, &committed)
            .await?;

        let summary = RecomputeSummary {
            transactions: transactions.len(),
            lots: committed.lots.len(),
            sells: committed.sells.len(),
            oversold_sells: committed.sells.iter().filter(|s| s.is_oversold()).count(),
        };

        info!(
            account = %account,
            symbol = %symbol,
            transactions = summary.transactions,
            lots = summary.lots,
            sells = summary.sells,
            oversold = summary.oversold_sells,
            "scope recomputed"
        );

        Ok(summary)
    }

    fn scope_lock(&self, account: &AccountId, symbol: &Symbol) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("scope lock registry poisoned");
        locks
            .entry((account.clone(), symbol.clone()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
