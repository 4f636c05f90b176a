//! Common error types for SteelTrack

use thiserror::Error;

/// Common result type for SteelTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the SteelTrack services
///
/// The domain variants (InvalidTransition, Forbidden, OverReceipt, ...) are
/// all recoverable by the caller: retry, correct the input, or surface the
/// named rule to the user. None of them indicate corrupted persistent state.
#[derive(Error, Debug)]
pub enum Error {
    /// State machine rule violated: the proposed (from, to) pair is not a
    /// single forward or backward step
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Authorization rule violated; `rule` names the specific policy entry
    /// that failed, never a generic denial
    #[error("Forbidden: {rule}")]
    Forbidden { rule: String },

    /// Location updates are rejected once a piece mark reaches installed
    #[error("Location is locked once status is installed")]
    LocationLockedAfterInstall,

    /// Cumulative received quantity across all deliveries would exceed the
    /// piece mark's total quantity
    #[error("Over-receipt for piece mark {mark}: cumulative {cumulative} exceeds quantity {expected}")]
    OverReceipt {
        mark: String,
        expected: i64,
        cumulative: i64,
    },

    /// Optimistic version check lost; the caller must retry against fresh state
    #[error("Concurrent modification, retry against fresh state")]
    ConcurrentModification,

    /// Attempted to finalize a delivery while items still lack an outcome
    #[error("Incomplete reconciliation: {missing} item(s) without an outcome")]
    IncompleteReconciliation { missing: usize },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind, used in HTTP error bodies so clients
    /// and tests can assert on the exact cause
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Forbidden { .. } => "forbidden",
            Error::LocationLockedAfterInstall => "location_locked_after_install",
            Error::OverReceipt { .. } => "over_receipt",
            Error::ConcurrentModification => "concurrent_modification",
            Error::IncompleteReconciliation { .. } => "incomplete_reconciliation",
            Error::NotFound(_) => "not_found",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
            Error::Internal(_) => "internal",
        }
    }
}
