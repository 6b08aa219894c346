//! Error types for the giftledger core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

// ---------------------------------------------------------------------------
// Identifier errors
// ---------------------------------------------------------------------------

/// Reasons a gift-card identifier could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier did not split into exactly `<slug>_<index>`.
    #[error("identifier '{0}' must have the form <slug>_<index>")]
    Malformed(String),

    /// The index suffix is not a non-negative integer.
    #[error("identifier '{identifier}' has an invalid member index '{index}'")]
    InvalidIndex { identifier: String, index: String },
}

// ---------------------------------------------------------------------------
// Ledger errors (debit / credit)
// ---------------------------------------------------------------------------

/// Hard failures of the debit and credit paths. No state is changed when
/// one of these is returned.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, missing, or not finite.
    #[error("{0}")]
    InvalidAmount(String),

    /// The gift-card identifier resolves to no company/member.
    #[error("gift card '{0}' not found")]
    IdentifierNotFound(String),

    /// No company with the given id exists.
    #[error("company '{0}' not found")]
    CompanyNotFound(String),

    /// The company exists but has no member with this email.
    #[error("member '{email}' not found in company '{company_id}'")]
    MemberNotFound { company_id: String, email: String },

    /// The company balance cannot cover the requested debit.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: f64, requested: f64 },

    /// A store read or write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Compensation rejections
// ---------------------------------------------------------------------------

/// Validation failures of a settlement or cancellation request.
///
/// These are never returned as `Err`: the ledger records them as a
/// zero-amount transaction and reports them to the caller. The `Display`
/// output is the message written to the ledger and sent on the wire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompensationError {
    #[error("Invalid value in request body")]
    InvalidAmount,

    #[error("Gift card not found")]
    GiftCardNotFound,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Transaction does not correspond to the specified gift card")]
    TransactionMismatch,

    #[error("Transaction is not a purchase. Only purchase transactions can be cancelled")]
    TransactionTypeInvalid,

    #[error("Amount mismatch. Expected: {expected}, Received: {received}")]
    AmountMismatch { expected: f64, received: f64 },

    #[error("Transaction has already been settled")]
    AlreadySettled,

    #[error("Transaction has already been cancelled")]
    AlreadyCancelled,
}

// ---------------------------------------------------------------------------
// Administration errors
// ---------------------------------------------------------------------------

/// Errors from company and member administration.
#[derive(Debug, Error)]
pub enum AdminError {
    /// A request field is missing or malformed. The message is user-facing.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Company name already exists")]
    CompanyNameTaken(String),

    /// Another company already normalizes to the same card slug.
    #[error("Company name collides with '{existing}' on card prefix '{slug}'")]
    SlugConflict { slug: String, existing: String },

    #[error("Company not found")]
    CompanyNotFound(String),

    #[error("Member not found")]
    MemberNotFound(String),

    #[error("User already exists in this company")]
    MemberExists(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the company and transaction stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A persisted row could not be decoded into the domain model.
    #[error("corrupt {entity} record '{id}': {detail}")]
    Corrupt {
        entity: String,
        id: String,
        detail: String,
    },

    /// JSON encoding or decoding of a store file failed.
    #[error("store file '{path}' is not valid JSON: {detail}")]
    Json { path: String, detail: String },

    /// A paired write failed and restoring the other store failed too;
    /// the company and transaction stores may disagree.
    #[error("stores diverged after a failed write: {0}")]
    Diverged(String),

    /// Generic I/O error (e.g. file permissions).
    #[error("storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
