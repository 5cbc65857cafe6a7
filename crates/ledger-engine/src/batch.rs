//! Ad hoc concurrent batch processing.
//!
//! Unlike the long-lived [`TransactionProcessor`](crate::TransactionProcessor),
//! [`run_batch`] is scoped to one call: it spins up a transient pool, feeds
//! it a finite job list, and returns once every job is consumed or the
//! cancellation token fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ledger_core::Job;

use crate::engine::LedgerEngine;
use crate::processor::dispatch_job;

/// Aggregate result of one batch run.
///
/// Jobs abandoned by cancellation are counted as neither success nor
/// failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Jobs whose operation committed.
    pub succeeded: u64,
    /// Jobs whose operation failed.
    pub failed: u64,
}

/// Process `jobs` with a transient pool of `concurrency` workers (clamped to
/// at least 1).
///
/// One producer pushes the list's jobs in order over a rendezvous-sized
/// channel; each worker dispatches jobs exactly like the long-lived
/// processor. The producer checks `cancel` before each push and the workers
/// check it while waiting to receive, so a fired token stops delivery
/// promptly; jobs already being dispatched run to completion.
pub async fn run_batch(
    engine: &Arc<LedgerEngine>,
    jobs: Vec<Job>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let concurrency = concurrency.max(1);
    let total = jobs.len();

    let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(1);
    let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));

    let succeeded = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let engine = Arc::clone(engine);
        let jobs_rx = Arc::clone(&jobs_rx);
        let cancel = cancel.clone();
        let succeeded = Arc::clone(&succeeded);
        let failed = Arc::clone(&failed);

        workers.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut jobs_rx = jobs_rx.lock().await;
                    // Biased so a fired token wins over a ready job.
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        job = jobs_rx.recv() => job,
                    }
                };
                let Some(job) = job else { break };
                match dispatch_job(&engine, &job) {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(op = %job.op, error = %err, "batch job failed");
                    }
                }
            }
        }));
    }

    let producer_cancel = cancel.clone();
    let producer = tokio::spawn(async move {
        for job in jobs {
            // Biased: cancellation is checked before each push.
            tokio::select! {
                biased;
                () = producer_cancel.cancelled() => break,
                sent = jobs_tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        // Dropping the sender closes the channel, so idle workers drain out.
    });

    if let Err(err) = producer.await {
        tracing::error!(error = %err, "batch producer panicked");
    }
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "batch worker panicked");
        }
    }

    let outcome = BatchOutcome {
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    };
    tracing::info!(
        total,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        cancelled = cancel.is_cancelled(),
        "batch finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use ledger_core::{Balance, UserId};
    use ledger_store::{RocksStore, Store};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_engine() -> (Arc<LedgerEngine>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let engine = Arc::new(LedgerEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(NoopAuditSink),
        ));
        (engine, store, dir)
    }

    #[tokio::test]
    async fn empty_batch_returns_zeroes() {
        let (engine, _store, _dir) = test_engine();
        let outcome = run_batch(&engine, Vec::new(), 4, &CancellationToken::new()).await;
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test]
    async fn mixed_batch_counts_outcomes() {
        let (engine, store, _dir) = test_engine();
        let user = UserId::generate();
        store
            .create_balance(&Balance::with_amount(user, dec!(100.00)))
            .unwrap();

        let jobs = vec![
            Job::credit(user, dec!(10.00)),
            Job::debit(user, dec!(50.00)),
            Job::debit(user, dec!(1000.00)),          // insufficient
            Job::credit(UserId::generate(), dec!(1.00)), // no balance
        ];
        let outcome = run_batch(&engine, jobs, 3, &CancellationToken::new()).await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 2);

        let balance = store.get_balance(&user).unwrap().unwrap();
        assert_eq!(balance.amount, dec!(60.00));
    }

    #[tokio::test]
    async fn cancelled_token_abandons_undelivered_jobs() {
        let (engine, store, _dir) = test_engine();
        let user = UserId::generate();
        store
            .create_balance(&Balance::with_amount(user, dec!(100.00)))
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let jobs = (0..10).map(|_| Job::credit(user, dec!(1.00))).collect();
        let outcome = run_batch(&engine, jobs, 2, &cancel).await;

        // Nothing was delivered: counted as neither success nor failure.
        assert_eq!(outcome, BatchOutcome::default());
        let balance = store.get_balance(&user).unwrap().unwrap();
        assert_eq!(balance.amount, dec!(100.00));
    }

    #[tokio::test]
    async fn mid_run_cancellation_still_returns() {
        let (engine, store, _dir) = test_engine();
        let user = UserId::generate();
        store.create_balance(&Balance::new(user)).unwrap();

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                cancel.cancel();
            })
        };

        let jobs = (0..200).map(|_| Job::credit(user, dec!(1.00))).collect();
        let outcome = run_batch(&engine, jobs, 2, &cancel).await;
        canceller.await.unwrap();

        // Every counted job actually committed; abandoned jobs are neither.
        let processed = outcome.succeeded + outcome.failed;
        assert!(processed <= 200);
        let balance = store.get_balance(&user).unwrap().unwrap();
        assert_eq!(balance.amount, Decimal::from(outcome.succeeded));
    }

    #[tokio::test]
    async fn concurrency_above_job_count_is_fine() {
        let (engine, store, _dir) = test_engine();
        let user = UserId::generate();
        store.create_balance(&Balance::new(user)).unwrap();

        let jobs = vec![Job::credit(user, dec!(2.00)); 3];
        let outcome = run_batch(&engine, jobs, 16, &CancellationToken::new()).await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(
            store.get_balance(&user).unwrap().unwrap().amount,
            dec!(6.00)
        );
    }
}
