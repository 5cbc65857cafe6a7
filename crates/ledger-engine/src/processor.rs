//! The long-lived transaction processor.
//!
//! A fixed pool of workers drains one shared bounded job queue and drives
//! each job through the [`LedgerEngine`]. The queue is the only
//! synchronization between producers and workers; statistics are independent
//! atomic counters.
//!
//! # Lifecycle
//!
//! `Created -> Running -> Stopping -> Stopped`. [`TransactionProcessor::stop`]
//! signals every worker and joins them; it does not drain the queue, so jobs
//! still buffered at that point are discarded. Callers that need a full
//! drain stop enqueuing, wait for the queue to empty through normal
//! processing (observable via [`TransactionProcessor::stats`]), then stop.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use ledger_core::{Job, JobOp};

use crate::engine::LedgerEngine;
use crate::error::EngineError;

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default job queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Processor construction parameters.
///
/// Both values are clamped to at least 1.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Number of long-lived workers.
    pub workers: usize,

    /// Bounded job queue capacity.
    pub queue_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Observable processor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Constructed, workers not yet spawned.
    Created,
    /// Workers are draining the queue.
    Running,
    /// Stop was requested; workers are being joined.
    Stopping,
    /// All workers have exited.
    Stopped,
}

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// A point-in-time read of the processor counters.
///
/// The counters are loaded independently, so a snapshot taken while workers
/// are active may observe them at slightly different logical times. Fine for
/// monitoring, not meant for cross-field invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Jobs admitted to the queue.
    pub enqueued: u64,
    /// Jobs pulled by a worker and dispatched.
    pub processed: u64,
    /// Jobs whose operation committed.
    pub succeeded: u64,
    /// Jobs whose operation failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Errors returned by [`TransactionProcessor::enqueue`].
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The job's amount is not strictly positive.
    #[error("amount must be positive: {amount}")]
    InvalidAmount {
        /// The offending amount.
        amount: Decimal,
    },

    /// The processor is stopping or stopped.
    #[error("processor is not accepting jobs")]
    NotAccepting,
}

/// A worker pool processing ledger jobs from a bounded queue.
pub struct TransactionProcessor {
    engine: Arc<LedgerEngine>,
    jobs_tx: mpsc::Sender<Job>,
    jobs_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    stop_tx: watch::Sender<bool>,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    state: AtomicU8,
    counters: Arc<Counters>,
}

impl TransactionProcessor {
    /// Create a processor over `engine` with the given worker count and
    /// queue capacity (each clamped to at least 1). Workers are not spawned
    /// until [`start`](Self::start).
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>, config: ProcessorConfig) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (stop_tx, _) = watch::channel(false);

        Self {
            engine,
            jobs_tx,
            jobs_rx: Arc::new(tokio::sync::Mutex::new(jobs_rx)),
            stop_tx,
            workers: config.workers.max(1),
            handles: Mutex::new(Vec::new()),
            state: AtomicU8::new(STATE_CREATED),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn the worker pool. Only legal from `Created`; later calls are
    /// ignored with a warning.
    pub fn start(&self) {
        if self
            .state
            .compare_exchange(
                STATE_CREATED,
                STATE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!("processor start ignored: workers already spawned or stopped");
            return;
        }

        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for worker_id in 0..self.workers {
            let engine = Arc::clone(&self.engine);
            let jobs_rx = Arc::clone(&self.jobs_rx);
            let counters = Arc::clone(&self.counters);
            let mut stop_rx = self.stop_tx.subscribe();

            handles.push(tokio::spawn(async move {
                tracing::debug!(worker_id, "worker started");
                loop {
                    // The stop signal is checked between jobs, never
                    // mid-operation: an operation in flight always runs to
                    // completion or rollback.
                    let job = {
                        let mut jobs_rx = jobs_rx.lock().await;
                        tokio::select! {
                            _ = stop_rx.changed() => break,
                            job = jobs_rx.recv() => job,
                        }
                    };
                    let Some(job) = job else { break };
                    handle_job(&engine, &counters, &job);
                }
                tracing::debug!(worker_id, "worker stopped");
            }));
        }
        tracing::info!(workers = self.workers, "processor started");
    }

    /// Enqueue a job, waiting for queue capacity (backpressure).
    ///
    /// # Errors
    ///
    /// - `EnqueueError::InvalidAmount` for a non-positive amount, rejected
    ///   before it counts toward the `enqueued` statistic.
    /// - `EnqueueError::NotAccepting` once the processor is stopping or
    ///   stopped.
    pub async fn enqueue(&self, job: Job) -> Result<(), EnqueueError> {
        if !job.has_valid_amount() {
            return Err(EnqueueError::InvalidAmount { amount: job.amount });
        }
        if !self.accepting() {
            return Err(EnqueueError::NotAccepting);
        }
        self.jobs_tx
            .send(job)
            .await
            .map_err(|_| EnqueueError::NotAccepting)?;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Try to enqueue without blocking.
    ///
    /// Returns `false` when the job is invalid, the queue is full, or the
    /// processor is no longer accepting jobs. Used by callers that must not
    /// block.
    pub fn try_enqueue(&self, job: Job) -> bool {
        if !job.has_valid_amount() || !self.accepting() {
            return false;
        }
        if self.jobs_tx.try_send(job).is_ok() {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Signal every worker and wait for all of them to exit.
    ///
    /// The queue is neither closed nor drained: jobs buffered but undelivered
    /// are discarded.
    pub async fn stop(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // Never started: nothing to join.
            let _ = self.state.compare_exchange(
                STATE_CREATED,
                STATE_STOPPED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return;
        }

        let _ = self.stop_tx.send(true);

        let handles: Vec<_> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }

        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        tracing::info!("processor stopped");
    }

    /// Read the shared counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => ProcessorState::Running,
            STATE_STOPPING => ProcessorState::Stopping,
            STATE_STOPPED => ProcessorState::Stopped,
            _ => ProcessorState::Created,
        }
    }

    fn accepting(&self) -> bool {
        matches!(
            self.state(),
            ProcessorState::Created | ProcessorState::Running
        )
    }
}

/// Process one dequeued job and update the counters.
fn handle_job(engine: &LedgerEngine, counters: &Counters, job: &Job) {
    counters.processed.fetch_add(1, Ordering::Relaxed);
    match dispatch_job(engine, job) {
        Ok(()) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(op = %job.op, user_id = %job.user_id, amount = %job.amount, "job succeeded");
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                op = %job.op,
                user_id = %job.user_id,
                amount = %job.amount,
                error = %err,
                "job failed"
            );
        }
    }
}

/// Dispatch a job to the engine. A transfer without a recipient fails here
/// without reaching the store.
pub(crate) fn dispatch_job(engine: &LedgerEngine, job: &Job) -> Result<(), EngineError> {
    match job.op {
        JobOp::Credit => engine.credit(job.user_id, job.amount).map(|_| ()),
        JobOp::Debit => engine.debit(job.user_id, job.amount).map(|_| ()),
        JobOp::Transfer => {
            let to_user = job.to_user.ok_or(EngineError::MissingRecipient)?;
            engine.transfer(job.user_id, to_user, job.amount).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use ledger_core::UserId;
    use ledger_store::{RocksStore, Store};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_processor(config: ProcessorConfig) -> (TransactionProcessor, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let engine = Arc::new(LedgerEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(NoopAuditSink),
        ));
        (
            TransactionProcessor::new(engine, config),
            store,
            dir,
        )
    }

    async fn wait_until(processor: &TransactionProcessor, check: impl Fn(Stats) -> bool) {
        for _ in 0..500 {
            if check(processor.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached, stats: {:?}", processor.stats());
    }

    #[tokio::test]
    async fn try_enqueue_reports_queue_full() {
        let (processor, _store, _dir) = test_processor(ProcessorConfig {
            workers: 1,
            queue_capacity: 2,
        });
        let user = UserId::generate(); // no balance: jobs fail fast

        // Workers not started yet, so the two buffered jobs stay put.
        assert!(processor.try_enqueue(Job::credit(user, dec!(10.00))));
        assert!(processor.try_enqueue(Job::credit(user, dec!(10.00))));
        assert!(!processor.try_enqueue(Job::credit(user, dec!(10.00))));
        assert_eq!(processor.stats().enqueued, 2);

        // Once the worker drains the buffer a slot frees up again.
        processor.start();
        wait_until(&processor, |stats| stats.processed == 2).await;
        assert!(processor.try_enqueue(Job::credit(user, dec!(10.00))));

        wait_until(&processor, |stats| stats.processed == 3).await;
        processor.stop().await;
    }

    #[tokio::test]
    async fn invalid_jobs_are_rejected_before_counting() {
        let (processor, _store, _dir) = test_processor(ProcessorConfig::default());
        let user = UserId::generate();

        let err = processor.enqueue(Job::credit(user, Decimal::ZERO)).await;
        assert!(matches!(err, Err(EnqueueError::InvalidAmount { .. })));
        assert!(!processor.try_enqueue(Job::debit(user, dec!(-1.00))));

        assert_eq!(processor.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn stats_count_mixed_outcomes() {
        let (processor, store, _dir) = test_processor(ProcessorConfig {
            workers: 2,
            queue_capacity: 16,
        });
        let user = UserId::generate();
        store
            .create_balance(&ledger_core::Balance::with_amount(user, dec!(100.00)))
            .unwrap();

        processor.start();
        processor.enqueue(Job::credit(user, dec!(10.00))).await.unwrap();
        processor.enqueue(Job::debit(user, dec!(500.00))).await.unwrap(); // insufficient
        processor
            .enqueue(Job::credit(UserId::generate(), dec!(1.00))) // no balance
            .await
            .unwrap();
        processor
            .enqueue(Job {
                op: JobOp::Transfer,
                user_id: user,
                to_user: None, // malformed: fails without reaching the store
                amount: dec!(1.00),
            })
            .await
            .unwrap();

        wait_until(&processor, |stats| stats.processed == 4).await;
        processor.stop().await;

        let stats = processor.stats();
        assert_eq!(stats.enqueued, 4);
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 3);

        let balance = store.get_balance(&user).unwrap().unwrap();
        assert_eq!(balance.amount, dec!(110.00));
    }

    #[tokio::test]
    async fn stop_without_start_discards_buffered_jobs() {
        let (processor, _store, _dir) = test_processor(ProcessorConfig {
            workers: 2,
            queue_capacity: 8,
        });
        let user = UserId::generate();

        processor.enqueue(Job::credit(user, dec!(1.00))).await.unwrap();
        processor.enqueue(Job::credit(user, dec!(2.00))).await.unwrap();
        assert_eq!(processor.state(), ProcessorState::Created);

        processor.stop().await;
        assert_eq!(processor.state(), ProcessorState::Stopped);

        let stats = processor.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.processed, 0);

        // A stopped processor refuses new work.
        assert!(!processor.try_enqueue(Job::credit(user, dec!(3.00))));
        assert!(matches!(
            processor.enqueue(Job::credit(user, dec!(3.00))).await,
            Err(EnqueueError::NotAccepting)
        ));
    }

    #[tokio::test]
    async fn stop_joins_all_workers() {
        let (processor, store, _dir) = test_processor(ProcessorConfig {
            workers: 4,
            queue_capacity: 32,
        });
        let user = UserId::generate();
        store
            .create_balance(&ledger_core::Balance::new(user))
            .unwrap();

        processor.start();
        assert_eq!(processor.state(), ProcessorState::Running);

        for _ in 0..10 {
            processor.enqueue(Job::credit(user, dec!(1.00))).await.unwrap();
        }
        wait_until(&processor, |stats| stats.processed == 10).await;

        processor.stop().await;
        assert_eq!(processor.state(), ProcessorState::Stopped);
        // Idempotent.
        processor.stop().await;
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_spawns_one_pool() {
        let (processor, _store, _dir) = test_processor(ProcessorConfig {
            workers: 1,
            queue_capacity: 4,
        });
        processor.start();
        processor.start();
        assert_eq!(processor.state(), ProcessorState::Running);
        processor.stop().await;
    }

    #[tokio::test]
    async fn config_clamps_to_minimums() {
        let (processor, _store, _dir) = test_processor(ProcessorConfig {
            workers: 0,
            queue_capacity: 0,
        });
        let user = UserId::generate();

        // Capacity clamped to 1: one job buffers, the next is refused.
        assert!(processor.try_enqueue(Job::credit(user, dec!(1.00))));
        assert!(!processor.try_enqueue(Job::credit(user, dec!(1.00))));

        processor.start();
        wait_until(&processor, |stats| stats.processed == 1).await;
        processor.stop().await;
    }
}
