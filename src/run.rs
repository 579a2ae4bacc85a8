use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::error;

use crate::configuration::{
    BatchConfig, DurabilityMode, KeyMode, ParallelConfig, SequentialConfig, Sink,
};
use crate::request::{RngGen, SequenceCounter, WriteRequest};

/// Why a single submission did not succeed.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The sink reported an error for this request or batch.
    #[error("sink rejected submission: {0:#}")]
    Rejected(anyhow::Error),

    /// The sink did not answer within the configured request timeout.
    #[error("submission timed out after {0:?}")]
    TimedOut(Duration),
}

/// One failed submission, identified by its zero-based submission index
/// (for batch runs, the iteration index).
#[derive(Debug)]
pub struct FailedSubmission {
    pub index: u64,
    pub error: SubmitError,
}

/// What a run accomplished.
///
/// `attempted` counts submissions actually issued to the sink, so for a
/// halted sequential run it is smaller than the configured operation count.
/// Failures carry their submission index; in parallel runs the list order
/// follows worker completion, not index order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: u64,
    pub successes: u64,
    pub failures: Vec<FailedSubmission>,
}

impl RunSummary {
    fn record_success(&mut self) {
        self.attempted += 1;
        self.successes += 1;
    }

    fn record_failure(&mut self, index: u64, error: SubmitError) {
        self.attempted += 1;
        self.failures.push(FailedSubmission { index, error });
    }

    fn merge(&mut self, other: RunSummary) {
        self.attempted += other.attempted;
        self.successes += other.successes;
        self.failures.extend(other.failures);
    }
}

enum KeySource {
    Sequential(SequenceCounter),
    Random,
}

impl KeySource {
    fn new(mode: KeyMode) -> Self {
        match mode {
            KeyMode::Sequential => KeySource::Sequential(SequenceCounter::new()),
            KeyMode::Random => KeySource::Random,
        }
    }

    fn next_request(&self, field: &'static str, gen: &mut RngGen) -> WriteRequest {
        match self {
            KeySource::Sequential(counter) => WriteRequest::sequential(field, counter.next()),
            KeySource::Random => WriteRequest::random(field, gen),
        }
    }
}

// Represents shareable state and configuration of a worker.
struct WorkerContext {
    // Submission indices are issued from this counter until `operations`
    // have been handed out; workers pull work dynamically instead of
    // being statically sharded.
    submission_counter: AtomicU64,
    operations: u64,

    sink: Arc<dyn Sink>,
    durability: DurabilityMode,
    key_source: KeySource,
    key_field: &'static str,

    // When set, a batch of this many random-keyed requests is built and
    // submitted per iteration instead of a single request.
    batch_size: Option<usize>,

    // Caps simultaneously outstanding submissions; a permit is held for
    // the whole duration of one sink call.
    gate: Option<Semaphore>,
    request_timeout: Option<Duration>,

    // Sequential runs stop at the first failure; parallel runs keep
    // going and report every failure at the end.
    halt_on_error: bool,
}

impl WorkerContext {
    // Issues the next submission index, or `None` once `operations`
    // submissions have been handed out.
    fn issue_submission_index(&self) -> Option<u64> {
        let index = self.submission_counter.fetch_add(1, Ordering::Relaxed);
        (index < self.operations).then(|| index)
    }

    // Repeatedly submits writes until the work counter is exhausted,
    // or until the first failure if `halt_on_error` is set.
    async fn run_worker(&self) -> RunSummary {
        let mut gen = RngGen::new(rand::thread_rng().gen());
        let mut summary = RunSummary::default();

        while let Some(index) = self.issue_submission_index() {
            // The gate is owned by this run and never closed, so acquire
            // only fails after the context is dropped, which cannot
            // happen while a worker is still running.
            let _permit = match &self.gate {
                Some(gate) => Some(gate.acquire().await.expect("concurrency gate closed")),
                None => None,
            };

            let result = match self.batch_size {
                None => {
                    let request = self.key_source.next_request(self.key_field, &mut gen);
                    self.submit(self.sink.insert(request, self.durability)).await
                }
                Some(size) => {
                    let batch: Vec<_> = (0..size)
                        .map(|_| WriteRequest::random(self.key_field, &mut gen))
                        .collect();
                    self.submit(self.sink.insert_batch(batch, self.durability, size, size))
                        .await
                }
            };

            match result {
                Ok(()) => summary.record_success(),
                Err(error) => {
                    error!(
                        error = %error,
                        submission_index = index,
                        "write failed",
                    );
                    summary.record_failure(index, error);
                    if self.halt_on_error {
                        break;
                    }
                }
            }
        }

        summary
    }

    async fn submit<F>(&self, submission: F) -> Result<(), SubmitError>
    where
        F: Future<Output = Result<()>>,
    {
        let result = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, submission).await {
                Ok(result) => result,
                Err(_) => return Err(SubmitError::TimedOut(limit)),
            },
            None => submission.await,
        };

        result.map_err(SubmitError::Rejected)
    }
}

/// Performs `config.operations` writes one at a time, each awaited before
/// the next is issued. Stops at the first failure; the summary then holds
/// that single failure and the writes that were never attempted are not
/// counted.
pub async fn run_sequential(config: SequentialConfig, sink: Arc<dyn Sink>) -> RunSummary {
    let ctx = WorkerContext {
        submission_counter: AtomicU64::new(0),
        operations: config.operations,
        sink,
        durability: config.durability,
        key_source: KeySource::new(config.key_mode),
        key_field: config.key_field,
        batch_size: None,
        gate: None,
        request_timeout: config.request_timeout,
        halt_on_error: true,
    };

    ctx.run_worker().await
}

/// Performs `config.operations` writes across `config.parallelism`
/// concurrent workers, optionally gated so that at most
/// `config.max_in_flight` submissions are outstanding at once.
///
/// Failures do not halt the run; every worker drains its share of the
/// work counter and all failures are reported together. Returns only
/// after every spawned worker has finished, so the summary accounts for
/// all issued submissions.
pub async fn run_parallel(config: ParallelConfig, sink: Arc<dyn Sink>) -> Result<RunSummary> {
    config.validate()?;

    let ctx = Arc::new(WorkerContext {
        submission_counter: AtomicU64::new(0),
        operations: config.operations,
        sink,
        durability: config.durability,
        key_source: KeySource::new(config.key_mode),
        key_field: config.key_field,
        batch_size: None,
        gate: config.max_in_flight.map(|permits| Semaphore::new(permits as usize)),
        request_timeout: config.request_timeout,
        halt_on_error: false,
    });

    Ok(join_workers(ctx, config.parallelism).await)
}

/// Performs `config.iterations` bulk submissions across
/// `config.parallelism` concurrent workers. Each iteration builds a fresh
/// batch of exactly `config.batch_size` random-keyed requests and asks the
/// sink to treat it as one unit of exactly that size. A failed batch fails
/// that iteration only.
pub async fn run_batch(config: BatchConfig, sink: Arc<dyn Sink>) -> Result<RunSummary> {
    config.validate()?;

    let ctx = Arc::new(WorkerContext {
        submission_counter: AtomicU64::new(0),
        operations: config.iterations,
        sink,
        durability: config.durability,
        key_source: KeySource::Random,
        key_field: config.key_field,
        batch_size: Some(config.batch_size),
        gate: None,
        request_timeout: config.request_timeout,
        halt_on_error: false,
    });

    Ok(join_workers(ctx, config.parallelism).await)
}

// Spawns the worker tasks and merges their summaries. Awaits every
// worker before returning, so no submission is left in flight when the
// run is declared complete.
async fn join_workers(ctx: Arc<WorkerContext>, parallelism: u64) -> RunSummary {
    let mut workers = (0..parallelism)
        .map(|_| {
            let ctx_clone = Arc::clone(&ctx);
            let (fut, handle) = async move { ctx_clone.run_worker().await }.remote_handle();
            tokio::task::spawn(fut);
            handle
        })
        .collect::<FuturesUnordered<_>>();

    let mut summary = RunSummary::default();
    while let Some(worker_summary) = workers.next().await {
        summary.merge(worker_summary);
    }

    summary
}
