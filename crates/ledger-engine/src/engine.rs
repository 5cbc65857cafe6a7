//! The atomic operation engine.
//!
//! [`LedgerEngine`] is a thin orchestration layer over the store's atomic
//! primitives. It validates requests before any storage interaction, and
//! after a successful commit emits one best-effort audit entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use ledger_core::{Balance, LedgerTransaction, TransactionId, UserId};
use ledger_store::{Store, StoreError};

use crate::audit::AuditSink;
use crate::error::EngineError;

/// Orchestrates atomic ledger operations against an injected store and
/// audit sink.
///
/// Cheap to share: hold it in an `Arc` and pass references. All balance
/// mutations go through the store's atomic primitives, so concurrent callers
/// get the same guarantees as the synchronous path.
pub struct LedgerEngine {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
}

impl LedgerEngine {
    /// Create an engine over a store and an audit sink.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    // =========================================================================
    // Atomic Operations
    // =========================================================================

    /// Add `amount` to an account.
    ///
    /// Returns the new balance amount and the created transaction record.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidAmount` for a non-positive amount, otherwise the
    /// store's typed failure.
    pub fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction), EngineError> {
        ensure_positive(amount)?;
        let (new_amount, tx) = self.store.credit_atomic(&user_id, amount)?;
        tracing::info!(
            user_id = %user_id,
            amount = %amount,
            new_amount = %new_amount,
            "credit committed"
        );
        self.record_audit(&tx, "credit", &format!("credited {amount}"));
        Ok((new_amount, tx))
    }

    /// Remove `amount` from an account.
    ///
    /// Returns the new balance amount and the created transaction record.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidAmount` for a non-positive amount, otherwise the
    /// store's typed failure (`BalanceNotFound`, `InsufficientFunds`, ...).
    pub fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction), EngineError> {
        ensure_positive(amount)?;
        let (new_amount, tx) = self.store.debit_atomic(&user_id, amount)?;
        tracing::info!(
            user_id = %user_id,
            amount = %amount,
            new_amount = %new_amount,
            "debit committed"
        );
        self.record_audit(&tx, "debit", &format!("debited {amount}"));
        Ok((new_amount, tx))
    }

    /// Move `amount` from one account to another.
    ///
    /// Returns the sender's and recipient's new amounts and the created
    /// transaction record.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidAmount` for a non-positive amount, otherwise the
    /// store's typed failure (`SenderNotFound`, `RecipientNotFound`,
    /// `InsufficientFunds`, ...).
    pub fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal, LedgerTransaction), EngineError> {
        ensure_positive(amount)?;
        let (from_amount, to_amount, tx) =
            self.store.transfer_atomic(&from_user, &to_user, amount)?;
        tracing::info!(
            from_user = %from_user,
            to_user = %to_user,
            amount = %amount,
            from_new = %from_amount,
            to_new = %to_amount,
            "transfer committed"
        );
        self.record_audit(
            &tx,
            "transfer",
            &format!("transferred {amount} from {from_user} to {to_user}"),
        );
        Ok((from_amount, to_amount, tx))
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Get an account's balance.
    ///
    /// # Errors
    ///
    /// `StoreError::BalanceNotFound` if the account has no balance.
    pub fn balance(&self, user_id: UserId) -> Result<Balance, EngineError> {
        let balance = self
            .store
            .get_balance(&user_id)?
            .ok_or(StoreError::BalanceNotFound { user_id })?;
        Ok(balance)
    }

    /// Create a zero balance for a new account.
    ///
    /// # Errors
    ///
    /// `StoreError::AlreadyExists` if the account already has a balance.
    pub fn open_account(&self, user_id: UserId) -> Result<Balance, EngineError> {
        self.open_account_with(user_id, Decimal::ZERO)
    }

    /// Create a balance with an opening amount for a new account.
    ///
    /// # Errors
    ///
    /// `StoreError::AlreadyExists` if the account already has a balance.
    pub fn open_account_with(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Balance, EngineError> {
        let balance = Balance::with_amount(user_id, amount);
        self.store.create_balance(&balance)?;
        tracing::info!(user_id = %user_id, amount = %amount, "account opened");
        Ok(balance)
    }

    /// Reconstruct an account's balance as of a past instant by replaying its
    /// committed transactions.
    ///
    /// The replay starts from zero, so the result only covers mutations that
    /// went through the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction listing fails.
    pub fn balance_at(&self, user_id: UserId, at: DateTime<Utc>) -> Result<Decimal, EngineError> {
        let transactions = self
            .store
            .list_transactions_by_user(&user_id, usize::MAX, 0)?;

        let mut amount = Decimal::ZERO;
        for tx in &transactions {
            if tx.created_at <= at {
                amount += tx.delta_for(&user_id);
            }
        }
        Ok(amount)
    }

    // =========================================================================
    // Transaction Queries
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<LedgerTransaction>, EngineError> {
        Ok(self.store.get_transaction(transaction_id)?)
    }

    /// List transactions touching a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn transactions(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>, EngineError> {
        Ok(self
            .store
            .list_transactions_by_user(&user_id, limit, offset)?)
    }

    /// Emit the post-commit audit entry; failures are logged and swallowed.
    fn record_audit(&self, tx: &LedgerTransaction, action: &str, details: &str) {
        if let Err(err) =
            self.audit
                .log_action("transaction", &tx.id.to_string(), action, details)
        {
            tracing::warn!(
                transaction_id = %tx.id,
                action,
                error = %err,
                "audit entry dropped"
            );
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), EngineError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(EngineError::InvalidAmount { amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditError;
    use ledger_store::RocksStore;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every entry it receives.
    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<(String, String, String, String)>>,
    }

    impl AuditSink for RecordingSink {
        fn log_action(
            &self,
            entity_type: &str,
            entity_id: &str,
            action: &str,
            details: &str,
        ) -> Result<(), AuditError> {
            self.entries.lock().unwrap().push((
                entity_type.into(),
                entity_id.into(),
                action.into(),
                details.into(),
            ));
            Ok(())
        }
    }

    /// Fails every entry.
    struct FailingSink;

    impl AuditSink for FailingSink {
        fn log_action(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), AuditError> {
            Err(AuditError("sink offline".into()))
        }
    }

    fn engine_with_sink(sink: Arc<dyn AuditSink>) -> (LedgerEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (LedgerEngine::new(store, sink), dir)
    }

    #[test]
    fn credit_emits_one_audit_entry() {
        let sink = Arc::new(RecordingSink::default());
        let (engine, _dir) = engine_with_sink(Arc::clone(&sink) as Arc<dyn AuditSink>);

        let user = UserId::generate();
        engine.open_account(user).unwrap();
        let (_, tx) = engine.credit(user, dec!(25.00)).unwrap();

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let (entity_type, entity_id, action, details) = &entries[0];
        assert_eq!(entity_type, "transaction");
        assert_eq!(entity_id, &tx.id.to_string());
        assert_eq!(action, "credit");
        assert!(details.contains("25.00"));
    }

    #[test]
    fn failing_audit_sink_does_not_fail_the_operation() {
        let (engine, _dir) = engine_with_sink(Arc::new(FailingSink));

        let user = UserId::generate();
        engine.open_account(user).unwrap();
        let (new_amount, _) = engine.credit(user, dec!(10.00)).unwrap();
        assert_eq!(new_amount, dec!(10.00));

        // The commit is visible despite the sink failure.
        assert_eq!(engine.balance(user).unwrap().amount, dec!(10.00));
    }

    #[test]
    fn failed_operations_emit_no_audit_entry() {
        let sink = Arc::new(RecordingSink::default());
        let (engine, _dir) = engine_with_sink(Arc::clone(&sink) as Arc<dyn AuditSink>);

        let user = UserId::generate();
        engine.open_account_with(user, dec!(5.00)).unwrap();
        assert!(engine.debit(user, dec!(50.00)).is_err());
        assert!(engine.credit(UserId::generate(), dec!(1.00)).is_err());

        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_amount_is_rejected_before_the_store() {
        let sink = Arc::new(RecordingSink::default());
        let (engine, _dir) = engine_with_sink(Arc::clone(&sink) as Arc<dyn AuditSink>);

        let user = UserId::generate();
        // No account exists; validation must fire before the not-found path.
        let err = engine.credit(user, dec!(-1.00)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));

        let err = engine.transfer(user, UserId::generate(), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[test]
    fn transfer_moves_funds_between_accounts() {
        let (engine, _dir) = engine_with_sink(Arc::new(crate::NoopAuditSink));

        let a = UserId::generate();
        let b = UserId::generate();
        engine.open_account_with(a, dec!(100.00)).unwrap();
        engine.open_account_with(b, dec!(10.00)).unwrap();

        let (from_amount, to_amount, tx) = engine.transfer(a, b, dec!(50.00)).unwrap();
        assert_eq!(from_amount, dec!(50.00));
        assert_eq!(to_amount, dec!(60.00));
        assert_eq!(tx.amount, dec!(50.00));

        assert!(engine.transfer(a, b, dec!(500.00)).unwrap_err().is_insufficient_funds());
    }

    #[test]
    fn balance_reports_not_found() {
        let (engine, _dir) = engine_with_sink(Arc::new(crate::NoopAuditSink));
        let err = engine.balance(UserId::generate()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn balance_at_replays_history() {
        let (engine, _dir) = engine_with_sink(Arc::new(crate::NoopAuditSink));

        let user = UserId::generate();
        engine.open_account(user).unwrap();
        engine.credit(user, dec!(10.00)).unwrap();
        engine.debit(user, dec!(3.00)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let checkpoint = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));

        engine.credit(user, dec!(5.00)).unwrap();

        assert_eq!(engine.balance_at(user, checkpoint).unwrap(), dec!(7.00));
        assert_eq!(engine.balance(user).unwrap().amount, dec!(12.00));
    }

    #[test]
    fn transaction_lookup_round_trips() {
        let (engine, _dir) = engine_with_sink(Arc::new(crate::NoopAuditSink));

        let user = UserId::generate();
        engine.open_account(user).unwrap();
        let (_, tx) = engine.credit(user, dec!(1.00)).unwrap();

        let fetched = engine.transaction(&tx.id).unwrap().unwrap();
        assert_eq!(fetched.id, tx.id);

        let listed = engine.transactions(user, 10, 0).unwrap();
        assert_eq!(listed.len(), 1);
    }
}
