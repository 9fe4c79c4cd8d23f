//! Transaction type representing a single journal entry.

use crate::domain::{AccountId, Decimal, Side, Symbol, TimeMs};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub String);

impl TxnId {
    /// Generate a fresh random id for a newly recorded transaction.
    pub fn generate() -> Self {
        TxnId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (e.g., read back from the store).
    pub fn new(id: String) -> Self {
        TxnId(id)
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rejected transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction {txn} has non-positive quantity {quantity}")]
    NonPositiveQuantity { txn: TxnId, quantity: Decimal },
    #[error("transaction {txn} has non-positive price {price}")]
    NonPositivePrice { txn: TxnId, price: Decimal },
    #[error("transaction {txn} has negative commission {commission}")]
    NegativeCommission { txn: TxnId, commission: Decimal },
}

/// A single BUY or SELL journal entry.
///
/// Raw fields only; every derived value (unit cost, cost basis, PnL,
/// R-multiple) lives in the engine's working state and is rebuilt on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable unique identifier.
    pub id: TxnId,
    /// Owning account.
    pub account: AccountId,
    /// Traded instrument.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Number of units traded (> 0).
    pub quantity: Decimal,
    /// Price per unit (> 0).
    pub price: Decimal,
    /// Commission paid (>= 0).
    pub commission: Decimal,
    /// Execution time in milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Stop-loss price set at entry, if any.
    pub stop_loss: Option<Decimal>,
    /// Take-profit price set at entry, if any.
    pub take_profit: Option<Decimal>,
    /// Insertion sequence assigned by the store; ties on time_ms break by
    /// this value so replays are stable.
    pub seq: i64,
}

impl Transaction {
    /// Create a new transaction with a fresh id and unassigned sequence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
        time_ms: TimeMs,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        Transaction {
            id: TxnId::generate(),
            account,
            symbol,
            side,
            quantity,
            price,
            commission,
            time_ms,
            stop_loss,
            take_profit,
            seq: 0,
        }
    }

    /// Check raw field constraints.
    ///
    /// # Errors
    /// Returns the first violated constraint; nothing is mutated on failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity {
                txn: self.id.clone(),
                quantity: self.quantity,
            });
        }
        if !self.price.is_positive() {
            return Err(ValidationError::NonPositivePrice {
                txn: self.id.clone(),
                price: self.price,
            });
        }
        if self.commission.is_negative() {
            return Err(ValidationError::NegativeCommission {
                txn: self.id.clone(),
                commission: self.commission,
            });
        }
        Ok(())
    }

    /// Deterministic content key for imported rows.
    ///
    /// Re-importing the same CSV must not duplicate journal entries, so the
    /// key hashes every raw field rather than using the random id.
    pub fn import_key(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.account.as_str());
        hasher.update(self.symbol.as_str());
        hasher.update(if self.side == Side::Buy { b"B" } else { b"S" });
        hasher.update(self.time_ms.as_i64().to_le_bytes());
        hasher.update(self.quantity.to_canonical_string());
        hasher.update(self.price.to_canonical_string());
        hasher.update(self.commission.to_canonical_string());
        if let Some(stop) = &self.stop_loss {
            hasher.update(stop.to_canonical_string());
        }
        if let Some(target) = &self.take_profit {
            hasher.update(target.to_canonical_string());
        }
        let hash = hasher.finalize();
        format!("import:{}", hex::encode(&hash[..16]))
    }
}
