//! Error types for the lootcase core
//!
//! Each component owns a typed error enum so callers (and the HTTP layer)
//! can tell a user-facing outcome like `InsufficientFunds` apart from an
//! operational failure. `LootError` is the root type used at process level.

use crate::cases::types::CaseId;
use thiserror::Error;

/// Root error type for all lootcase operations
#[derive(Debug, Error)]
pub enum LootError {
    /// Malformed catalog; halts startup
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Top-up error: {0}")]
    TopUp(#[from] TopUpError),

    #[error("Spin error: {0}")]
    Spin(#[from] SpinError),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Catalog validation failures. These are the fatal configuration errors:
/// raised once while loading, never per request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog defines no cases")]
    Empty,

    #[error("Case {0} has no items")]
    EmptyCase(CaseId),

    #[error("Case {0} has price zero")]
    ZeroPrice(CaseId),

    #[error("Case id {0} is declared more than once")]
    DuplicateCase(CaseId),

    #[error("Case {case_id} declares item id {item_id} more than once")]
    DuplicateItem { case_id: CaseId, item_id: u32 },

    #[error("Case {case_id} item {item_id} has zero weight")]
    ZeroWeight { case_id: CaseId, item_id: u32 },

    #[error("Case {0} total weight overflows")]
    WeightOverflow(CaseId),

    #[error("Failed to load catalog: {0}")]
    LoadFailed(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Balance ledger errors. Every variant leaves the account untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    #[error("Transaction amount must be positive")]
    ZeroAmount,

    #[error("Balance overflow crediting {amount} to {balance}")]
    BalanceOverflow { balance: u64, amount: u64 },

    #[error("Ledger write failed: {0}")]
    Storage(String),
}

/// Transaction log persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open transaction log {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Corrupted log entry at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },
}

/// Top-up request errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopUpError {
    #[error("Invalid top-up amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    #[error("Idempotency key must not be empty")]
    InvalidIdempotencyKey,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Spin session outcomes other than a revealed item
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpinError {
    #[error("Insufficient funds: balance {balance}, case price {price}")]
    InsufficientFunds { balance: u64, price: u64 },

    #[error("A spin is already in progress for this session")]
    SpinAlreadyInProgress,

    #[error("Unknown case: {0}")]
    UnknownCase(CaseId),

    #[error("No case selected")]
    NoCaseSelected,

    #[error(transparent)]
    Ledger(LedgerError),
}

impl SpinError {
    /// Stable snake_case label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SpinError::InsufficientFunds { .. } => "insufficient_funds",
            SpinError::SpinAlreadyInProgress => "spin_already_in_progress",
            SpinError::UnknownCase(_) => "unknown_case",
            SpinError::NoCaseSelected => "no_case_selected",
            SpinError::Ledger(_) => "ledger_failure",
        }
    }
}

impl From<LedgerError> for SpinError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { balance, requested } => SpinError::InsufficientFunds {
                balance,
                price: requested,
            },
            other => SpinError::Ledger(other),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::WriteFailed(e.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<prometheus::Error> for LootError {
    fn from(e: prometheus::Error) -> Self {
        LootError::Metrics(e.to_string())
    }
}

// Convenience type alias for Results
pub type LootResult<T> = Result<T, LootError>;
