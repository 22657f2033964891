use crate::error::{Result, ScreenerError};
use crate::screener::PageBatch;
use crate::store::{batch_records, Clock, Dataset, GateState, LeaseToken, RecordStore, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Entry {
    records: Dataset,
    /// Set once the run finalizes
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct Lease {
    token: LeaseToken,
    until: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    datasets: HashMap<String, Entry>,
    leases: HashMap<String, Lease>,
}

impl Inner {
    /// Forget expired datasets and lapsed leases for `name`
    fn purge(&mut self, name: &str, now: Instant) {
        let expired = self
            .datasets
            .get(name)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            log::debug!("Dataset '{}' expired", name);
            self.datasets.remove(name);
        }

        if self.leases.get(name).is_some_and(|lease| lease.until <= now) {
            log::warn!("Run lease on '{}' lapsed without finalizing", name);
            self.leases.remove(name);
        }
    }

    fn fresh_for(&self, name: &str, now: Instant) -> Option<Duration> {
        self.datasets.get(name).and_then(|e| e.expires_at).map(|at| at.saturating_duration_since(now))
    }

    fn holds(&self, name: &str, token: &LeaseToken) -> bool {
        self.leases.get(name).is_some_and(|lease| lease.token == *token)
    }

    fn require_lease(&self, name: &str, token: &LeaseToken) -> Result<()> {
        if self.holds(name, token) {
            Ok(())
        } else {
            Err(ScreenerError::LeaseLost(name.to_string()))
        }
    }
}

/// In-process [`RecordStore`].
///
/// Expiry follows the injected [`Clock`], so a [`crate::store::ManualClock`]
/// makes TTL behaviour deterministic.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { inner: Mutex::new(Inner::default()), clock }
    }

    /// Lock the state with `name`'s expired entries already purged
    fn lock_purged(&self, name: &str) -> Result<MutexGuard<'_, Inner>> {
        let now = self.clock.now();
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| ScreenerError::StoreUnavailable(format!("Memory store poisoned: {}", e)))?;
        inner.purge(name, now);
        Ok(inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn gate_state(&self, name: &str) -> Result<GateState> {
        let inner = self.lock_purged(name)?;

        if let Some(remaining) = inner.fresh_for(name, self.clock.now()) {
            return Ok(GateState::Fresh { remaining });
        }
        if inner.leases.contains_key(name) {
            return Ok(GateState::Running);
        }
        Ok(GateState::Open)
    }

    fn try_claim(&self, name: &str, lease: Duration) -> Result<Option<LeaseToken>> {
        let mut inner = self.lock_purged(name)?;
        let now = self.clock.now();

        if inner.fresh_for(name, now).is_some() || inner.leases.contains_key(name) {
            return Ok(None);
        }

        let token = LeaseToken::generate();
        inner.leases.insert(name.to_string(), Lease { token: token.clone(), until: now + lease });
        Ok(Some(token))
    }

    fn begin_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        let mut inner = self.lock_purged(name)?;
        inner.require_lease(name, token)?;
        inner.datasets.insert(name.to_string(), Entry::default());
        Ok(())
    }

    fn merge_batch(&self, name: &str, token: &LeaseToken, batch: &PageBatch) -> Result<()> {
        let records = batch_records(batch)?;
        let mut inner = self.lock_purged(name)?;
        inner.require_lease(name, token)?;
        let entry = inner.datasets.entry(name.to_string()).or_default();
        entry.records.extend(records);
        Ok(())
    }

    fn finalize_run(&self, name: &str, token: &LeaseToken, ttl: Duration) -> Result<()> {
        let mut inner = self.lock_purged(name)?;
        inner.require_lease(name, token)?;
        let expires_at = self.clock.now() + ttl;
        inner.datasets.entry(name.to_string()).or_default().expires_at = Some(expires_at);
        inner.leases.remove(name);
        Ok(())
    }

    fn abandon_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        let mut inner = self.lock_purged(name)?;

        let owned = inner.holds(name, token);
        if !owned && inner.leases.contains_key(name) {
            log::warn!("Run lease on '{}' is held by another run, leaving it alone", name);
            return Ok(());
        }

        let unfinished = inner.datasets.get(name).is_some_and(|e| e.expires_at.is_none());
        if unfinished {
            inner.datasets.remove(name);
        }
        if owned {
            inner.leases.remove(name);
        }
        Ok(())
    }

    fn read_all(&self, name: &str) -> Result<Dataset> {
        let inner = self.lock_purged(name)?;
        Ok(inner.datasets.get(name).map(|e| e.records.clone()).unwrap_or_default())
    }
}
