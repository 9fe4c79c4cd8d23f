pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{AccountId, Decimal, Side, Symbol, TimeMs, Transaction, TxnId};
pub use engine::{DerivedState, Lot, OverSellPolicy, SellComputed};
pub use error::AppError;
pub use orchestration::Recomputer;
pub use store::{LedgerStore, MemoryStore};
