use crate::error::{Result, ScreenerError};
use crate::store::{Clock, GateState, LeaseToken, RecordStore};
use std::time::Duration;

/// How to wait for a dataset name to become available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// First pause between checks
    pub poll_interval: Duration,
    /// Pauses double up to this cap
    pub max_poll_interval: Duration,
    /// Give up with `RunBlockedTimeout` after this long
    pub max_wait: Duration,
    /// Lease taken on success; an unfinished run loses the gate after it
    pub run_lease: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
            run_lease: Duration::from_secs(600),
        }
    }
}

/// Block until no fresh dataset or live run holds `name`, then claim it.
///
/// The returned token must accompany every write the run makes.
///
/// Returns immediately when the gate is open. Otherwise polls with a
/// doubling pause (never sleeping past a fresh dataset's expiry or the
/// wait bound) and fails with `RunBlockedTimeout` once `max_wait` is spent.
pub fn await_available(
    store: &dyn RecordStore,
    name: &str,
    policy: &WaitPolicy,
    clock: &dyn Clock,
) -> Result<LeaseToken> {
    let started = clock.now();
    let mut interval = policy.poll_interval;

    loop {
        if let Some(token) = store.try_claim(name, policy.run_lease)? {
            return Ok(token);
        }

        let waited = clock.now().duration_since(started);
        if waited >= policy.max_wait {
            log::warn!("Gave up waiting for dataset '{}' after {:?}", name, waited);
            return Err(ScreenerError::RunBlockedTimeout { dataset: name.to_string(), waited });
        }

        let mut pause = interval.min(policy.max_wait - waited);
        match store.gate_state(name)? {
            GateState::Fresh { remaining } => {
                log::info!("Dataset '{}' is fresh for another {:?}, waiting", name, remaining);
                pause = pause.min(remaining.max(Duration::from_millis(1)));
            }
            GateState::Running => log::info!("Another run holds dataset '{}', waiting", name),
            GateState::Open => {}
        }

        clock.sleep(pause);
        interval = (interval * 2).min(policy.max_poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};
    use std::sync::Arc;

    fn policy(max_wait_secs: u64) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(max_wait_secs),
            run_lease: Duration::from_secs(60),
        }
    }

    fn setup() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::with_clock(clock.clone());
        (clock, store)
    }

    /// Leave a finalized dataset under `name`, fresh for `ttl`
    fn finalized(store: &MemoryStore, name: &str, ttl: Duration) {
        let token = store.try_claim(name, Duration::from_secs(60)).unwrap().unwrap();
        store.begin_run(name, &token).unwrap();
        store.finalize_run(name, &token, ttl).unwrap();
    }

    #[test]
    fn test_returns_immediately_when_absent() {
        let (clock, store) = setup();

        let token = await_available(&store, "stocks", &policy(10), clock.as_ref()).unwrap();

        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(store.gate_state("stocks").unwrap(), GateState::Running);

        store.finalize_run("stocks", &token, Duration::from_secs(30)).unwrap();
        assert!(matches!(store.gate_state("stocks").unwrap(), GateState::Fresh { .. }));
    }

    #[test]
    fn test_blocks_while_fresh_then_times_out() {
        let (clock, store) = setup();
        finalized(&store, "stocks", Duration::from_secs(193));

        let err = await_available(&store, "stocks", &policy(30), clock.as_ref()).unwrap_err();

        match err {
            ScreenerError::RunBlockedTimeout { dataset, waited } => {
                assert_eq!(dataset, "stocks");
                assert_eq!(waited, Duration::from_secs(30));
            }
            other => panic!("Expected RunBlockedTimeout, got {:?}", other),
        }
        assert!(matches!(store.gate_state("stocks").unwrap(), GateState::Fresh { .. }));
    }

    #[test]
    fn test_proceeds_once_ttl_elapses() {
        let (clock, store) = setup();
        finalized(&store, "stocks", Duration::from_secs(5));

        await_available(&store, "stocks", &policy(60), clock.as_ref()).unwrap();

        assert!(clock.elapsed() >= Duration::from_secs(5));
        assert!(clock.elapsed() < Duration::from_secs(7));
    }

    #[test]
    fn test_running_lease_blocks_second_claim() {
        let (clock, store) = setup();
        await_available(&store, "stocks", &policy(10), clock.as_ref()).unwrap();

        let second = await_available(&store, "stocks", &policy(3), clock.as_ref());

        assert!(matches!(second, Err(ScreenerError::RunBlockedTimeout { .. })));
    }

    #[test]
    fn test_backoff_is_capped() {
        let (clock, store) = setup();
        finalized(&store, "stocks", Duration::from_secs(3600));
        let policy = policy(10);

        let _ = await_available(&store, "stocks", &policy, clock.as_ref());

        // 0.1 + 0.2 + 0.4 + 0.8 then 1s steps up to the 10s bound
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }
}
