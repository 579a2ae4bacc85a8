use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use crate::configuration::{DurabilityMode, Sink};
use crate::request::WriteRequest;

// Opt-in via RUST_LOG, e.g. RUST_LOG=write_stress=error.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct BatchRecord {
    pub requests: Vec<WriteRequest>,
    pub durability: DurabilityMode,
    pub min_batch_rows: usize,
    pub max_batch_rows: usize,
}

/// Accepts every submission and remembers what it was given.
#[derive(Default)]
pub struct RecordingSink {
    pub inserts: Mutex<Vec<(WriteRequest, DurabilityMode)>>,
    pub batches: Mutex<Vec<BatchRecord>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn insert(&self, request: WriteRequest, durability: DurabilityMode) -> Result<()> {
        self.inserts.lock().push((request, durability));
        Ok(())
    }

    async fn insert_batch(
        &self,
        requests: Vec<WriteRequest>,
        durability: DurabilityMode,
        min_batch_rows: usize,
        max_batch_rows: usize,
    ) -> Result<()> {
        self.batches.lock().push(BatchRecord {
            requests,
            durability,
            min_batch_rows,
            max_batch_rows,
        });
        Ok(())
    }
}

/// Rejects every submission whose 1-based arrival number satisfies the
/// predicate, accepting the rest.
pub struct FailingSink {
    calls: AtomicU64,
    fail_when: fn(u64) -> bool,
}

impl FailingSink {
    pub fn new(fail_when: fn(u64) -> bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail_when,
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        anyhow::ensure!(!(self.fail_when)(call), "injected failure on call {}", call);
        Ok(())
    }
}

#[async_trait]
impl Sink for FailingSink {
    async fn insert(&self, _request: WriteRequest, _durability: DurabilityMode) -> Result<()> {
        self.check()
    }

    async fn insert_batch(
        &self,
        _requests: Vec<WriteRequest>,
        _durability: DurabilityMode,
        _min_batch_rows: usize,
        _max_batch_rows: usize,
    ) -> Result<()> {
        self.check()
    }
}

/// Tracks how many submissions are in flight at once and keeps the
/// high-water mark. Each call parks briefly so concurrent submissions
/// actually overlap.
#[derive(Default)]
pub struct GaugeSink {
    in_flight: AtomicU64,
    high_water: AtomicU64,
}

impl GaugeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn high_water(&self) -> u64 {
        self.high_water.load(Ordering::SeqCst)
    }

    async fn track(&self) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Sink for GaugeSink {
    async fn insert(&self, _request: WriteRequest, _durability: DurabilityMode) -> Result<()> {
        self.track().await
    }

    async fn insert_batch(
        &self,
        _requests: Vec<WriteRequest>,
        _durability: DurabilityMode,
        _min_batch_rows: usize,
        _max_batch_rows: usize,
    ) -> Result<()> {
        self.track().await
    }
}

/// Never answers. Exercises the request timeout path.
pub struct StalledSink;

#[async_trait]
impl Sink for StalledSink {
    async fn insert(&self, _request: WriteRequest, _durability: DurabilityMode) -> Result<()> {
        futures::future::pending().await
    }

    async fn insert_batch(
        &self,
        _requests: Vec<WriteRequest>,
        _durability: DurabilityMode,
        _min_batch_rows: usize,
        _max_batch_rows: usize,
    ) -> Result<()> {
        futures::future::pending().await
    }
}
