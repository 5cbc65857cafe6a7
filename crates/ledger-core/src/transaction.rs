//! Ledger transaction records.
//!
//! Every committed balance mutation creates exactly one transaction record.
//! Records are append-only: once written they are never updated or deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// An immutable record of one committed balance mutation.
///
/// For credits and debits `from_user` and `to_user` both name the acting
/// account; for transfers they name the sender and the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction ID (ULID, assigned at commit time).
    pub id: TransactionId,

    /// The account the amount was taken from.
    pub from_user: UserId,

    /// The account the amount was given to.
    pub to_user: UserId,

    /// The amount moved. Always strictly positive.
    pub amount: Decimal,

    /// What kind of mutation this record describes.
    pub kind: TransactionKind,

    /// Completion status. Failed attempts produce no record at all, so every
    /// stored record is completed.
    pub status: TransactionStatus,

    /// When the transaction was committed.
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Create a credit record for `user_id`.
    #[must_use]
    pub fn credit(user_id: UserId, amount: Decimal) -> Self {
        Self {
            id: TransactionId::generate(),
            from_user: user_id,
            to_user: user_id,
            amount,
            kind: TransactionKind::Credit,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }

    /// Create a debit record for `user_id`.
    #[must_use]
    pub fn debit(user_id: UserId, amount: Decimal) -> Self {
        Self {
            id: TransactionId::generate(),
            from_user: user_id,
            to_user: user_id,
            amount,
            kind: TransactionKind::Debit,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }

    /// Create a transfer record from `from_user` to `to_user`.
    #[must_use]
    pub fn transfer(from_user: UserId, to_user: UserId, amount: Decimal) -> Self {
        Self {
            id: TransactionId::generate(),
            from_user,
            to_user,
            amount,
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }

    /// The signed effect this transaction had on `user`'s balance.
    ///
    /// Credits count toward `to_user`, debits against `from_user`, and
    /// transfers against the sender and toward the recipient. Accounts the
    /// transaction does not touch get zero. A self-transfer nets to zero.
    #[must_use]
    pub fn delta_for(&self, user: &UserId) -> Decimal {
        let mut delta = Decimal::ZERO;
        match self.kind {
            TransactionKind::Credit => {
                if self.to_user == *user {
                    delta += self.amount;
                }
            }
            TransactionKind::Debit => {
                if self.from_user == *user {
                    delta -= self.amount;
                }
            }
            TransactionKind::Transfer => {
                if self.from_user == *user {
                    delta -= self.amount;
                }
                if self.to_user == *user {
                    delta += self.amount;
                }
            }
        }
        delta
    }
}

/// The kind of balance mutation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Amount added to a single account.
    Credit,

    /// Amount removed from a single account.
    Debit,

    /// Amount moved between two accounts.
    Transfer,
}

impl TransactionKind {
    /// Check if this kind adds to the acting account's balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Credit)
    }

    /// Check if this kind removes from the acting account's balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Debit)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// Completion status of a stored transaction.
///
/// The ledger never persists pending or failed attempts; a failed operation
/// leaves no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// The mutation committed.
    Completed,
}
