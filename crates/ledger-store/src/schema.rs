//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Balance records, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by party, keyed by `user_id || transaction_id`.
    /// Value is empty (index only). Transfers are indexed under both the
    /// sender and the recipient.
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::BALANCES, cf::TRANSACTIONS, cf::TRANSACTIONS_BY_USER]
}
