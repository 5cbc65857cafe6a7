//! Error types for the ledger storage layer.

use ledger_core::UserId;
use rust_decimal::Decimal;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// None of these leave partial state behind: a failed atomic operation
/// writes nothing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No balance exists for the account.
    #[error("balance not found: {user_id}")]
    BalanceNotFound {
        /// The account that has no balance.
        user_id: UserId,
    },

    /// A transfer's sender has no balance.
    #[error("sender balance not found: {user_id}")]
    SenderNotFound {
        /// The sender account that has no balance.
        user_id: UserId,
    },

    /// A transfer's recipient has no balance.
    #[error("recipient balance not found: {user_id}")]
    RecipientNotFound {
        /// The recipient account that has no balance.
        user_id: UserId,
    },

    /// The balance cannot cover the requested amount.
    #[error("insufficient funds: balance={balance}, requested={requested}")]
    InsufficientFunds {
        /// Balance at the time the check-and-write ran.
        balance: Decimal,
        /// The requested amount.
        requested: Decimal,
    },

    /// A balance already exists for the account.
    #[error("balance already exists: {user_id}")]
    AlreadyExists {
        /// The account that already has a balance.
        user_id: UserId,
    },

    /// The amount is not strictly positive.
    #[error("amount must be positive: {amount}")]
    InvalidAmount {
        /// The offending amount.
        amount: Decimal,
    },
}

impl StoreError {
    /// True for the not-found family of failures.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BalanceNotFound { .. }
                | Self::SenderNotFound { .. }
                | Self::RecipientNotFound { .. }
        )
    }
}
