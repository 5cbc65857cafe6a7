//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use rust_decimal::Decimal;

use ledger_core::{Balance, LedgerTransaction, TransactionId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// Number of account lock shards.
const LOCK_SHARDS: usize = 64;

/// Sharded per-account write locks.
///
/// Every balance mutation holds its account's shard for the whole
/// read-check-write section, which is what makes the sufficiency check and
/// the decrement one atomic unit. Transfers take both shards in index order
/// so opposite-direction transfers cannot deadlock.
struct AccountLocks {
    shards: Vec<Mutex<()>>,
}

impl AccountLocks {
    fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_of(user_id: &UserId) -> usize {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user_id.hash(&mut hasher);
        (hasher.finish() as usize) % LOCK_SHARDS
    }

    fn lock(&self, user_id: &UserId) -> MutexGuard<'_, ()> {
        self.acquire(Self::shard_of(user_id))
    }

    fn lock_pair(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> (MutexGuard<'_, ()>, Option<MutexGuard<'_, ()>>) {
        let (i, j) = (Self::shard_of(a), Self::shard_of(b));
        if i == j {
            (self.acquire(i), None)
        } else {
            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            (self.acquire(lo), Some(self.acquire(hi)))
        }
    }

    fn acquire(&self, index: usize) -> MutexGuard<'_, ()> {
        // A poisoned shard only means a panicked writer; the guard data is ().
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: AccountLocks,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            locks: AccountLocks::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Commit updated balance rows plus one transaction record and its index
    /// entries in a single atomic batch.
    fn commit(&self, balances: &[&Balance], tx: &LedgerTransaction) -> Result<()> {
        let cf_balances = self.cf(cf::BALANCES)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let mut batch = WriteBatch::default();
        for balance in balances {
            batch.put_cf(
                &cf_balances,
                keys::balance_key(&balance.user_id),
                Self::serialize(balance)?,
            );
        }
        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), Self::serialize(tx)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&tx.from_user, &tx.id),
            [],
        );
        if tx.to_user != tx.from_user {
            batch.put_cf(
                &cf_by_user,
                keys::user_transaction_key(&tx.to_user, &tx.id),
                [],
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(StoreError::InvalidAmount { amount })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn create_balance(&self, balance: &Balance) -> Result<()> {
        let _guard = self.locks.lock(&balance.user_id);

        if self.read_balance(&balance.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                user_id: balance.user_id,
            });
        }

        let cf = self.cf(cf::BALANCES)?;
        self.db
            .put_cf(
                &cf,
                keys::balance_key(&balance.user_id),
                Self::serialize(balance)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        self.read_balance(user_id)
    }

    // =========================================================================
    // Atomic Operations
    // =========================================================================

    fn credit_atomic(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction)> {
        ensure_positive(amount)?;
        let _guard = self.locks.lock(user_id);

        let mut balance = self
            .read_balance(user_id)?
            .ok_or(StoreError::BalanceNotFound { user_id: *user_id })?;

        balance.amount += amount;
        balance.last_updated = Utc::now();

        let tx = LedgerTransaction::credit(*user_id, amount);
        self.commit(&[&balance], &tx)?;

        Ok((balance.amount, tx))
    }

    fn debit_atomic(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, LedgerTransaction)> {
        ensure_positive(amount)?;
        let _guard = self.locks.lock(user_id);

        let mut balance = self
            .read_balance(user_id)?
            .ok_or(StoreError::BalanceNotFound { user_id: *user_id })?;

        if !balance.can_cover(amount) {
            return Err(StoreError::InsufficientFunds {
                balance: balance.amount,
                requested: amount,
            });
        }

        balance.amount -= amount;
        balance.last_updated = Utc::now();

        let tx = LedgerTransaction::debit(*user_id, amount);
        self.commit(&[&balance], &tx)?;

        Ok((balance.amount, tx))
    }

    fn transfer_atomic(
        &self,
        from_user: &UserId,
        to_user: &UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal, LedgerTransaction)> {
        ensure_positive(amount)?;
        let _guards = self.locks.lock_pair(from_user, to_user);

        let mut from_balance = self
            .read_balance(from_user)?
            .ok_or(StoreError::SenderNotFound {
                user_id: *from_user,
            })?;

        if from_user == to_user {
            // Self-transfer nets to zero but still needs cover and a record.
            if !from_balance.can_cover(amount) {
                return Err(StoreError::InsufficientFunds {
                    balance: from_balance.amount,
                    requested: amount,
                });
            }
            from_balance.last_updated = Utc::now();
            let tx = LedgerTransaction::transfer(*from_user, *to_user, amount);
            self.commit(&[&from_balance], &tx)?;
            return Ok((from_balance.amount, from_balance.amount, tx));
        }

        let mut to_balance = self
            .read_balance(to_user)?
            .ok_or(StoreError::RecipientNotFound { user_id: *to_user })?;

        if !from_balance.can_cover(amount) {
            return Err(StoreError::InsufficientFunds {
                balance: from_balance.amount,
                requested: amount,
            });
        }

        let now = Utc::now();
        from_balance.amount -= amount;
        from_balance.last_updated = now;
        to_balance.amount += amount;
        to_balance.last_updated = now;

        let tx = LedgerTransaction::transfer(*from_user, *to_user, amount);
        self.commit(&[&from_balance, &to_balance], &tx)?;

        Ok((from_balance.amount, to_balance.amount, tx))
    }

    // =========================================================================
    // Transaction Queries
    // =========================================================================

    fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // Index keys are time-ordered within the prefix; collect then reverse
        // for newest-first listing.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }
}
