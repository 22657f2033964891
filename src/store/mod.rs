//! Keyed record store that doubles as the single-run gate
//!
//! A dataset lives under one logical name. While it is fresh (finalized and
//! inside its TTL) or while a run holds the name's lease, no other run may
//! start; [`await_available`] polls until the name frees up and claims it.
//!
//! A claim hands back a [`LeaseToken`]. Every write made on behalf of the run
//! carries it, and a store refuses writes whose token no longer holds the
//! lease, so a run whose lease lapsed cannot touch its successor's data.

pub mod clock;
pub mod gate;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{await_available, WaitPolicy};
pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

use crate::error::Result;
use crate::screener::PageBatch;
use indexmap::IndexMap;
use std::fmt;
use std::time::Duration;

/// Symbol → serialized quote record
pub type Dataset = IndexMap<String, String>;

/// Whether a new run may start under a dataset name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No fresh dataset and no run in progress
    Open,
    /// A run holds the lease and has not finalized yet
    Running,
    /// A finalized dataset is still inside its TTL
    Fresh { remaining: Duration },
}

/// Identifies the run holding a dataset name's lease
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// A fresh random token
    pub fn generate() -> Self {
        Self(format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage operations the pipeline needs.
///
/// Implementations are the sole authority on expiry: an expired dataset reads
/// as empty and no longer blocks the gate. Writes taking a [`LeaseToken`] fail
/// with `LeaseLost` once that token no longer holds the lease.
pub trait RecordStore: Send + Sync {
    fn gate_state(&self, name: &str) -> Result<GateState>;

    /// Atomically take the run lease for `name` if the gate is open
    fn try_claim(&self, name: &str, lease: Duration) -> Result<Option<LeaseToken>>;

    /// Replace whatever is stored under `name` with an empty dataset
    fn begin_run(&self, name: &str, token: &LeaseToken) -> Result<()>;

    /// Insert every row of `batch`; a key already present is overwritten
    fn merge_batch(&self, name: &str, token: &LeaseToken, batch: &PageBatch) -> Result<()>;

    /// Mark the dataset fresh for `ttl` and release the run lease
    fn finalize_run(&self, name: &str, token: &LeaseToken, ttl: Duration) -> Result<()>;

    /// Drop an unfinished dataset and release the lease without touching any TTL.
    ///
    /// A no-op when another run has since taken the lease.
    fn abandon_run(&self, name: &str, token: &LeaseToken) -> Result<()>;

    /// Snapshot of the dataset; empty when absent or expired
    fn read_all(&self, name: &str) -> Result<Dataset>;
}

/// Serialized `(key, record)` pairs for a batch, in row order
pub(crate) fn batch_records(batch: &PageBatch) -> Result<Vec<(String, String)>> {
    batch.rows.iter().map(|row| Ok((row.key.clone(), row.payload.to_record()?))).collect()
}
