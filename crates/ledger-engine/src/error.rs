//! Error types for ledger operations.

use ledger_store::StoreError;
use rust_decimal::Decimal;

/// Errors returned by [`LedgerEngine`](crate::LedgerEngine) operations.
///
/// Validation failures are rejected here before any storage interaction;
/// everything else is the store's typed failure, passed through so callers
/// can distinguish not-found from insufficient-funds from internal errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The amount is not strictly positive.
    #[error("amount must be positive: {amount}")]
    InvalidAmount {
        /// The offending amount.
        amount: Decimal,
    },

    /// A transfer was requested without a recipient.
    #[error("transfer requires a recipient")]
    MissingRecipient,

    /// A failure from the storage layer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True when the operation failed because a balance was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }

    /// True when the operation failed the sufficiency check.
    #[must_use]
    pub const fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::Store(StoreError::InsufficientFunds { .. }))
    }
}
