//! Core types for the ledger service.
//!
//! This crate provides the foundational types used throughout the ledger
//! workspace:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Balances**: `Balance`
//! - **Transactions**: `LedgerTransaction`, `TransactionKind`,
//!   `TransactionStatus`
//! - **Jobs**: `Job`, `JobOp` (asynchronous work submitted to the
//!   transaction processor)
//!
//! # Amounts
//!
//! All monetary values are `rust_decimal::Decimal`. Balances are never
//! allowed below zero by any debit or transfer path; transaction amounts are
//! always strictly positive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod ids;
pub mod job;
pub mod transaction;

pub use balance::Balance;
pub use ids::{IdError, TransactionId, UserId};
pub use job::{Job, JobOp};
pub use transaction::{LedgerTransaction, TransactionKind, TransactionStatus};
