//! Domain types and determinism layer for the lot ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, AccountId, Symbol, Side
//! - Transaction record with validation and canonical import keys
//! - Stable transaction ordering key helper for deterministic replay

pub mod decimal;
pub mod ordering;
pub mod primitives;
pub mod transaction;

pub use decimal::Decimal;
pub use ordering::TxnOrderingKey;
pub use primitives::{AccountId, Side, Symbol, TimeMs};
pub use transaction::{Transaction, TxnId, ValidationError};
