//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every mutating operation validates its input before touching the store and
/// fails fast with one of the specific kinds below. `PersistenceError` is the
/// only kind raised by the store itself; when it is returned the in-flight
/// transaction has already been rolled back.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// A referenced item, position, department, vendor or receipt is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catalog uniqueness violated.
    #[error("sku already exists: {0}")]
    DuplicateSku(String),

    /// Vendor registry uniqueness violated.
    #[error("tax id already registered: {0}")]
    DuplicateTaxId(String),

    /// Negative quantity, or non-positive where a positive one is required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A transfer asked for more than the origin position holds.
    #[error("insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity { requested: f64, available: f64 },

    /// Required fields are missing on a create/finalize call.
    #[error("incomplete input: {0}")]
    IncompleteInput(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The store failed to commit.
    #[error("persistence failed: {0}")]
    PersistenceError(String),
}

impl LedgerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn duplicate_sku(sku: impl Into<String>) -> Self {
        Self::DuplicateSku(sku.into())
    }

    pub fn duplicate_tax_id(tax_id: impl Into<String>) -> Self {
        Self::DuplicateTaxId(tax_id.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn insufficient(requested: f64, available: f64) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::IncompleteInput(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    /// Stable machine-readable code for callers that shape responses.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::DuplicateSku(_) => "duplicate_sku",
            LedgerError::DuplicateTaxId(_) => "duplicate_tax_id",
            LedgerError::InvalidQuantity(_) => "invalid_quantity",
            LedgerError::InsufficientQuantity { .. } => "insufficient_quantity",
            LedgerError::IncompleteInput(_) => "incomplete_input",
            LedgerError::InvalidId(_) => "invalid_id",
            LedgerError::PersistenceError(_) => "persistence_error",
        }
    }
}
