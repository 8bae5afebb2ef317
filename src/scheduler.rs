//! Bounded-concurrency batch execution with per-record isolation.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::DEFAULT_CONCURRENCY;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome<T> {
    Processed(T),
    Skipped,
}

/// Collected outcomes of a batch. Processed results are in completion order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub processed: Vec<T>,
    pub skipped: usize,
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped
    }
}

/// Runs one task per record with at most `concurrency` in flight.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    concurrency: usize,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BatchScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` over every record. A record whose task returns `None` or
    /// panics is counted as skipped; the batch itself never fails.
    pub async fn run<R, T, F, Fut>(&self, label: &str, records: Vec<R>, work: F) -> BatchReport<T>
    where
        R: Send + 'static,
        T: Send + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let total = records.len();
        info!("{}: processing {} records, concurrency {}", label, total, self.concurrency);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let finished = Arc::new(AtomicUsize::new(0));
        let work = Arc::new(work);
        let mut tasks = JoinSet::new();

        for (index, record) in records.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let finished = finished.clone();
            let work = work.clone();
            let label = label.to_string();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return RecordOutcome::Skipped;
                };

                // Inner task so a panic in `work` stays inside this record.
                let outcome = match tokio::spawn(async move { (*work)(record).await }).await {
                    Ok(Some(value)) => RecordOutcome::Processed(value),
                    Ok(None) => {
                        warn!("{}: record {} skipped", label, index + 1);
                        RecordOutcome::Skipped
                    }
                    Err(e) => {
                        warn!("{}: record {} skipped, task failed: {}", label, index + 1, e);
                        RecordOutcome::Skipped
                    }
                };

                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                info!("{}: {}/{} done", label, done, total);
                outcome
            });
        }

        let mut report = BatchReport {
            processed: Vec::with_capacity(total),
            skipped: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(RecordOutcome::Processed(value)) => report.processed.push(value),
                Ok(RecordOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!("{}: record task aborted: {}", label, e);
                    report.skipped += 1;
                }
            }
        }

        info!(
            "{}: finished, {} processed, {} skipped",
            label,
            report.processed.len(),
            report.skipped
        );
        report
    }
}
