use std::time::Duration;

use anyhow::Result;

use crate::request::WriteRequest;

/// The default name of the single attribute carried by every write request.
pub const DEFAULT_KEY_FIELD: &str = "customer_id";

/// Decides how keys are assigned to write requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Keys are taken from a shared counter, so across a whole run they
    /// form the exact set `1..=operations` with no duplicates and no gaps,
    /// regardless of parallelism.
    Sequential,

    /// Each key is drawn independently by the submitting worker.
    /// Duplicates are possible and are not treated as an error here;
    /// uniqueness enforcement, if any, belongs to the sink.
    Random,
}

/// Decides how hard the sink is asked to try before acknowledging a write.
///
/// This is an opaque hint forwarded to the sink with every submission;
/// the driver implements neither guarantee itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// The sink should acknowledge only once the write is persisted.
    Durable,

    /// The sink may acknowledge before the write is persisted.
    Soft,
}

/// Defines a single-threaded write run.
pub struct SequentialConfig {
    /// The number of writes to perform. May be zero.
    pub operations: u64,

    /// How keys are assigned.
    pub key_mode: KeyMode,

    /// Durability hint forwarded with every submission.
    pub durability: DurabilityMode,

    /// The maximum time to wait for a single submission.
    /// If `None`, a submission may block indefinitely.
    pub request_timeout: Option<Duration>,

    /// The attribute name under which the key is written.
    pub key_field: &'static str,
}

/// Defines a fan-out write run.
pub struct ParallelConfig {
    /// The total number of writes to perform across all workers.
    pub operations: u64,

    /// The number of concurrent worker tasks. Must not be zero.
    ///
    /// Workers pull work dynamically from a shared counter until
    /// `operations` submissions have been issued; there is no static
    /// partitioning, so `parallelism > operations` simply leaves some
    /// workers with nothing to do.
    pub parallelism: u64,

    /// An additional ceiling on simultaneously outstanding submissions.
    ///
    /// When set, at most this many requests are in flight at any instant,
    /// even if `parallelism` is larger. If `None`, the only bound is
    /// `parallelism` itself.
    pub max_in_flight: Option<u64>,

    /// How keys are assigned.
    pub key_mode: KeyMode,

    /// Durability hint forwarded with every submission.
    pub durability: DurabilityMode,

    /// The maximum time to wait for a single submission.
    pub request_timeout: Option<Duration>,

    /// The attribute name under which the key is written.
    pub key_field: &'static str,
}

/// Defines a bulk write run.
pub struct BatchConfig {
    /// The number of batch submissions to perform.
    pub iterations: u64,

    /// The number of requests in every batch. Must not be zero.
    ///
    /// The batch is rebuilt from scratch each iteration, and the sink is
    /// asked to treat it as a single unit of exactly this size.
    pub batch_size: usize,

    /// The number of concurrent worker tasks. Must not be zero.
    pub parallelism: u64,

    /// Durability hint forwarded with every submission.
    pub durability: DurabilityMode,

    /// The maximum time to wait for a single batch submission.
    pub request_timeout: Option<Duration>,

    /// The attribute name under which the keys are written.
    pub key_field: &'static str,
}

impl ParallelConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.parallelism > 0, "Parallelism must be greater than zero");
        Ok(())
    }
}

impl BatchConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.parallelism > 0, "Parallelism must be greater than zero");
        anyhow::ensure!(self.batch_size > 0, "Batch size must be greater than zero");
        Ok(())
    }
}

/// The external collaborator every write is submitted to.
///
/// Implementations wrap a concrete database client and its connection
/// pool; the driver never opens or closes connections itself. The sink is
/// constructed once by the caller and shared across a whole run.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Submits a single record.
    async fn insert(&self, request: WriteRequest, durability: DurabilityMode) -> Result<()>;

    /// Submits a batch of records as one unit.
    ///
    /// `min_batch_rows` and `max_batch_rows` are hints about how the sink
    /// may chunk the batch internally; the driver always passes both equal
    /// to the batch length, asking the sink to neither split nor coalesce.
    async fn insert_batch(
        &self,
        requests: Vec<WriteRequest>,
        durability: DurabilityMode,
        min_batch_rows: usize,
        max_batch_rows: usize,
    ) -> Result<()>;
}
