//! Atomic ledger operations and the asynchronous transaction processor.
//!
//! This crate sits on top of [`ledger_store`] and provides:
//!
//! - [`LedgerEngine`]: credit, debit, and transfer as single atomic
//!   operations, with best-effort audit logging after each commit
//! - [`TransactionProcessor`]: a long-lived worker pool draining a bounded
//!   job queue with backpressure and graceful stop
//! - [`run_batch`]: a transient fan-out that processes one finite job list
//!   under a cancellation token
//!
//! Both the synchronous engine path and the asynchronous job paths funnel
//! into the same store primitives, so the correctness guarantees are uniform
//! regardless of entry point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod processor;

pub use audit::{AuditError, AuditSink, NoopAuditSink, TracingAuditSink};
pub use batch::{run_batch, BatchOutcome};
pub use config::EngineConfig;
pub use engine::LedgerEngine;
pub use error::EngineError;
pub use processor::{
    EnqueueError, ProcessorConfig, ProcessorState, Stats, TransactionProcessor,
};
