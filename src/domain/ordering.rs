//! Stable transaction ordering for deterministic replay.

use crate::domain::Transaction;

/// Stable ordering key for transactions.
///
/// Ensures deterministic ordering of transactions with the same timestamp.
/// Ordering: time_ms -> insertion seq -> id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxnOrderingKey {
    /// Execution time in milliseconds (primary sort).
    pub time_ms: i64,
    /// Store insertion sequence (secondary sort).
    pub seq: i64,
    /// Transaction id (fallback sort).
    pub id: String,
}

impl TxnOrderingKey {
    /// Create an ordering key from a Transaction.
    pub fn from_txn(txn: &Transaction) -> Self {
        TxnOrderingKey {
            time_ms: txn.time_ms.as_i64(),
            seq: txn.seq,
            id: txn.id.as_str().to_string(),
        }
    }
}

/// Sort transactions deterministically.
pub fn sort_transactions_deterministic(txns: &mut [Transaction]) {
    txns.sort_by(|a, b| {
        let key_a = TxnOrderingKey::from_txn(a);
        let key_b = TxnOrderingKey::from_txn(b);
        key_a.cmp(&key_b)
    });
}
