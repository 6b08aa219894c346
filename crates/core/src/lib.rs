//! giftledger core library.
//!
//! This crate provides the corporate gift-card ledger: the card identifier
//! codec, directory lookups, the company and transaction stores (SQLite or
//! legacy JSON files), the balance ledger with its compensation protocols,
//! and company administration.

pub mod admin;
pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod identifier;
pub mod ledger;
pub mod models;
pub mod store;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use ledger::{BalanceLedger, CompensationOutcome, LedgerSettings};
pub use store::{JsonFileStore, StoreHandles};
