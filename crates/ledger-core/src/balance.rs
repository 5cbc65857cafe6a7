//! Account balance records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The monetary balance of a single account.
///
/// One record exists per account. The balance is owned exclusively by the
/// ledger store and is only mutated inside an atomic commit that also writes
/// the paired [`LedgerTransaction`](crate::LedgerTransaction) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// The account this balance belongs to (unique key).
    pub user_id: UserId,

    /// Current amount. Never driven below zero by any debit or transfer.
    pub amount: Decimal,

    /// When the balance was last mutated.
    pub last_updated: DateTime<Utc>,
}

impl Balance {
    /// Create a new balance with a zero amount.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self::with_amount(user_id, Decimal::ZERO)
    }

    /// Create a new balance with an opening amount.
    #[must_use]
    pub fn with_amount(user_id: UserId, amount: Decimal) -> Self {
        Self {
            user_id,
            amount,
            last_updated: Utc::now(),
        }
    }

    /// Check whether the balance can cover a requested amount.
    #[must_use]
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.amount >= amount
    }
}
