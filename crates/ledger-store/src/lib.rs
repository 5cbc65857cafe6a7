//! `RocksDB` storage layer for the ledger service.
//!
//! This crate provides durable storage for balances and the append-only
//! transaction ledger, and exposes the transactional read-modify-write
//! primitives every balance mutation must go through.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `balances`: balance records, keyed by `user_id`
//! - `transactions`: ledger transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: index for listing transactions by party
//!
//! # Atomicity
//!
//! The `*_atomic` operations run their sufficiency check and their write
//! inside one per-account critical section and commit all rows with a single
//! `WriteBatch`, so a mutation and its transaction record land together or
//! not at all.
//!
//! # Example
//!
//! ```no_run
//! use ledger_store::{RocksStore, Store};
//! use ledger_core::{Balance, UserId};
//! use rust_decimal::Decimal;
//!
//! let store = RocksStore::open("/tmp/ledger-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_balance(&Balance::new(user_id)).unwrap();
//!
//! let (new_amount, tx) = store.credit_atomic(&user_id, Decimal::from(5)).unwrap();
//! assert_eq!(new_amount, tx.amount);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use ledger_core::{Balance, LedgerTransaction, TransactionId, UserId};
use rust_decimal::Decimal;

/// The storage trait defining all ledger database operations.
///
/// This trait abstracts the storage layer so callers can substitute
/// implementations; it is the only path allowed to write balances or
/// transactions.
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Create a balance record for an account that has none.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a balance exists for the
    /// account, or an error if the database operation fails.
    fn create_balance(&self, balance: &Balance) -> Result<()>;

    /// Get a balance by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>>;

    // =========================================================================
    // Atomic Operations
    // =========================================================================

    /// Add `amount` to an account and record the credit atomically.
    ///
    /// Returns the new balance amount and the created transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not strictly positive.
    /// - `StoreError::BalanceNotFound` if the account has no balance.
    fn credit_atomic(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction)>;

    /// Remove `amount` from an account and record the debit atomically.
    ///
    /// The sufficiency check and the decrement run as one critical section:
    /// two concurrent debits can never both pass a check computed from a
    /// stale read.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not strictly positive.
    /// - `StoreError::BalanceNotFound` if the account has no balance.
    /// - `StoreError::InsufficientFunds` if the balance cannot cover the
    ///   amount; the balance and the transaction table are left unchanged.
    fn debit_atomic(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction)>;

    /// Move `amount` between two accounts and record the transfer atomically.
    ///
    /// Returns the sender's and recipient's new amounts and the created
    /// transaction. Both legs and the record commit together or not at all;
    /// there is no observable intermediate state.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not strictly positive.
    /// - `StoreError::SenderNotFound` / `StoreError::RecipientNotFound` if
    ///   either side has no balance.
    /// - `StoreError::InsufficientFunds` if the sender cannot cover the
    ///   amount.
    fn transfer_atomic(
        &self,
        from_user: &UserId,
        to_user: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal, LedgerTransaction)>;

    // =========================================================================
    // Transaction Queries
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId)
        -> Result<Option<LedgerTransaction>>;

    /// List transactions touching a user, newest first.
    ///
    /// Transfers appear in both parties' listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>>;
}
