use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand_pcg::Pcg64Mcg;

/// The generator used for random key assignment. Each worker owns one,
/// independently seeded, so no run ever shares a generator between tasks.
pub type RngGen = Pcg64Mcg;

/// The key carried by a write request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// A counter-assigned integer key.
    Sequential(u64),

    /// A randomly drawn non-negative 63-bit integer, encoded in decimal.
    Random(String),
}

/// A single logical record: one attribute holding one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub field: &'static str,
    pub key: KeyValue,
}

impl WriteRequest {
    pub fn sequential(field: &'static str, key: u64) -> Self {
        Self {
            field,
            key: KeyValue::Sequential(key),
        }
    }

    pub fn random(field: &'static str, gen: &mut RngGen) -> Self {
        let key = gen.gen_range(0..=i64::MAX);
        Self {
            field,
            key: KeyValue::Random(key.to_string()),
        }
    }
}

/// Hands out the keys `1, 2, 3, ...` under concurrent access.
///
/// Shared by all workers of a sequential-key run; the atomic increment is
/// the only way to obtain a key, so the keys assigned over a whole run are
/// unique and gap-free no matter how the workers interleave.
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
