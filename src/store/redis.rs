use crate::error::{Result, ScreenerError};
use crate::screener::PageBatch;
use crate::store::{batch_records, Dataset, GateState, LeaseToken, RecordStore};
use redis::{Commands, Connection, Script};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// Keys for every script: dataset hash, lease, freshness marker.

/// Claim the lease only when nothing is fresh and nobody holds the lease
const CLAIM_SCRIPT: &str = r#"
if redis.call('PTTL', KEYS[1]) > 0 or redis.call('PTTL', KEYS[3]) > 0 then
    return 0
end
if redis.call('SET', KEYS[2], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return 1
end
return 0
"#;

const BEGIN_SCRIPT: &str = r#"
if redis.call('GET', KEYS[2]) ~= ARGV[1] then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
"#;

/// ARGV[2..] are field/value pairs
const MERGE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[2]) ~= ARGV[1] then
    return 0
end
for i = 2, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// The marker keeps an empty dataset fresh, since an empty hash does not exist
const FINALIZE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[2]) ~= ARGV[1] then
    return 0
end
redis.call('PEXPIRE', KEYS[1], ARGV[2])
redis.call('SET', KEYS[3], '1', 'PX', ARGV[2])
redis.call('DEL', KEYS[2])
return 1
"#;

/// Leave everything alone when another run holds the lease
const ABANDON_SCRIPT: &str = r#"
local holder = redis.call('GET', KEYS[2])
if holder and holder ~= ARGV[1] then
    return 0
end
if redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('DEL', KEYS[1])
end
if holder then
    redis.call('DEL', KEYS[2])
end
return 1
"#;

/// [`RecordStore`] backed by Redis.
///
/// The dataset is the hash `<name>`, the run lease is the string
/// `<name>:lock` holding the owner's token, and `<name>:fresh` marks a
/// finalized dataset for the TTL. Any Redis error surfaces as
/// `StoreUnavailable`.
pub struct RedisStore {
    conn: Mutex<Connection>,
    claim: Script,
    begin: Script,
    merge: Script,
    finalize: Script,
    abandon: Script,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`)
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_with_timeout(Duration::from_secs(5))?;
        log::info!("Connected to Redis at {}", url);
        Ok(Self {
            conn: Mutex::new(conn),
            claim: Script::new(CLAIM_SCRIPT),
            begin: Script::new(BEGIN_SCRIPT),
            merge: Script::new(MERGE_SCRIPT),
            finalize: Script::new(FINALIZE_SCRIPT),
            abandon: Script::new(ABANDON_SCRIPT),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScreenerError::StoreUnavailable(format!("Redis connection poisoned: {}", e)))
    }

    fn lock_key(name: &str) -> String {
        format!("{}:lock", name)
    }

    fn fresh_key(name: &str) -> String {
        format!("{}:fresh", name)
    }

    /// Run `script` against `name`'s keys with the token as ARGV[1], then `args`
    fn invoke(&self, script: &Script, name: &str, token: &str, args: &[String]) -> Result<i64> {
        let mut conn = self.conn()?;
        let mut invocation = script.prepare_invoke();
        invocation.key(name).key(Self::lock_key(name)).key(Self::fresh_key(name)).arg(token);
        for arg in args {
            invocation.arg(arg);
        }
        Ok(invocation.invoke(&mut *conn)?)
    }

    fn owned(name: &str, result: i64) -> Result<()> {
        if result == 1 {
            Ok(())
        } else {
            Err(ScreenerError::LeaseLost(name.to_string()))
        }
    }
}

fn millis(d: Duration) -> String {
    d.as_millis().max(1).to_string()
}

impl RecordStore for RedisStore {
    fn gate_state(&self, name: &str) -> Result<GateState> {
        let mut conn = self.conn()?;
        let data_ttl: i64 = conn.pttl(name)?;
        let marker_ttl: i64 = conn.pttl(Self::fresh_key(name))?;
        let pttl = data_ttl.max(marker_ttl);
        if pttl > 0 {
            return Ok(GateState::Fresh { remaining: Duration::from_millis(pttl as u64) });
        }

        let running: bool = conn.exists(Self::lock_key(name))?;
        Ok(if running { GateState::Running } else { GateState::Open })
    }

    fn try_claim(&self, name: &str, lease: Duration) -> Result<Option<LeaseToken>> {
        let token = LeaseToken::generate();
        let claimed = self.invoke(&self.claim, name, token.as_str(), &[millis(lease)])?;
        Ok((claimed == 1).then_some(token))
    }

    fn begin_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        let result = self.invoke(&self.begin, name, token.as_str(), &[])?;
        Self::owned(name, result)
    }

    fn merge_batch(&self, name: &str, token: &LeaseToken, batch: &PageBatch) -> Result<()> {
        let args: Vec<String> = batch_records(batch)?.into_iter().flat_map(|(k, v)| [k, v]).collect();
        let result = self.invoke(&self.merge, name, token.as_str(), &args)?;
        Self::owned(name, result)
    }

    fn finalize_run(&self, name: &str, token: &LeaseToken, ttl: Duration) -> Result<()> {
        let result = self.invoke(&self.finalize, name, token.as_str(), &[millis(ttl)])?;
        Self::owned(name, result)
    }

    fn abandon_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        if self.invoke(&self.abandon, name, token.as_str(), &[])? == 0 {
            log::warn!("Run lease on '{}' is held by another run, leaving it alone", name);
        }
        Ok(())
    }

    fn read_all(&self, name: &str) -> Result<Dataset> {
        let mut conn = self.conn()?;
        let fields: HashMap<String, String> = conn.hgetall(name)?;

        let mut dataset: Dataset = fields.into_iter().collect();
        dataset.sort_keys();
        Ok(dataset)
    }
}
