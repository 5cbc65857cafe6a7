//! Asynchronous ledger jobs.
//!
//! A [`Job`] is a transient, in-memory request to perform one atomic ledger
//! operation. Jobs are created by callers, queued on the transaction
//! processor, dequeued by exactly one worker, and consumed; they are never
//! re-queued and never retried automatically.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The operation a job asks the ledger to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOp {
    /// Add to one account's balance.
    Credit,

    /// Remove from one account's balance.
    Debit,

    /// Move between two accounts.
    Transfer,
}

impl std::fmt::Display for JobOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// One unit of asynchronous work for the transaction processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// The requested operation.
    pub op: JobOp,

    /// The acting account (the sender, for transfers).
    pub user_id: UserId,

    /// The recipient account. Required for transfers, ignored otherwise.
    pub to_user: Option<UserId>,

    /// The amount to move. Must be strictly positive to be admitted.
    pub amount: Decimal,
}

impl Job {
    /// Build a credit job.
    #[must_use]
    pub const fn credit(user_id: UserId, amount: Decimal) -> Self {
        Self {
            op: JobOp::Credit,
            user_id,
            to_user: None,
            amount,
        }
    }

    /// Build a debit job.
    #[must_use]
    pub const fn debit(user_id: UserId, amount: Decimal) -> Self {
        Self {
            op: JobOp::Debit,
            user_id,
            to_user: None,
            amount,
        }
    }

    /// Build a transfer job.
    #[must_use]
    pub const fn transfer(from_user: UserId, to_user: UserId, amount: Decimal) -> Self {
        Self {
            op: JobOp::Transfer,
            user_id: from_user,
            to_user: Some(to_user),
            amount,
        }
    }

    /// Check the submission-time amount requirement.
    #[must_use]
    pub fn has_valid_amount(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn constructors_set_op_and_parties() {
        let a = UserId::generate();
        let b = UserId::generate();

        let credit = Job::credit(a, dec!(1.00));
        assert_eq!(credit.op, JobOp::Credit);
        assert!(credit.to_user.is_none());

        let transfer = Job::transfer(a, b, dec!(2.00));
        assert_eq!(transfer.op, JobOp::Transfer);
        assert_eq!(transfer.user_id, a);
        assert_eq!(transfer.to_user, Some(b));
    }

    #[test]
    fn amount_must_be_strictly_positive() {
        let user = UserId::generate();
        assert!(Job::credit(user, dec!(0.01)).has_valid_amount());
        assert!(!Job::credit(user, Decimal::ZERO).has_valid_amount());
        assert!(!Job::debit(user, dec!(-5.00)).has_valid_amount());
    }
}
