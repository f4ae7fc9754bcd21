//! # In-Process Driver
//!
//! Provide a store that answers the same commands as the RESP driver without
//! a network hop. Used for local development and for exercising the cache
//! client in tests.
//!
//! ## Usage
//!
//! - Point a descriptor at `memory://<name>`; every descriptor with the same
//!   name shares one process-wide `MemoryStore`, which models a primary and
//!   its replicas.
//! - `MemoryStore::named` returns the same store for inspection.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Per-shard locks reduce contention under concurrency.
//! 2. **TTL Fast Path**: Expiration is checked on access for O(1) reads;
//!    every `PURGE_INTERVAL`th write to a shard also sweeps that shard, so
//!    keys that are never read again do not pile up.
//! 3. **Atomic Conditional Writes**: `SET .. NX` checks and inserts under one
//!    shard lock.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryStore
//!   └── databases: Mutex<HashMap<u32, Arc<Database>>>
//!         └── Database
//!               └── shards: Vec<Shard>
//!                     └── RwLock<HashMap<Vec<u8>, Entry>>
//!                           └── Entry { value, expires_at }
//! ```

use std::collections::HashMap as StdHashMap;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::descriptor::{ConnectionParams, Endpoint};
use crate::driver::resp::RespValue;
use crate::driver::{Command, Connector, StorePool};
use crate::error::{CacheError, CacheResult, TransportResult};

const DEFAULT_SHARDS: usize = 16;
/// Writes to one shard between two sweeps of its expired entries.
const PURGE_INTERVAL: usize = 256;
/// Largest TTL accepted by `SET .. EX` and `EXPIRE`, as in Redis (the value
/// must still fit when converted to milliseconds).
const MAX_TTL_SECS: i64 = i64::MAX / 1000;

static STORES: Lazy<Mutex<StdHashMap<String, Arc<MemoryStore>>>> =
    Lazy::new(|| Mutex::new(StdHashMap::new()));

/// TTL state of a key, mirroring Redis `TTL` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    // Absolute expiration timestamp.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> Self {
        Entry {
            value,
            expires_at: deadline(now, ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

type EntryMap = HashMap<Vec<u8>, Entry, RandomState>;

/// Absolute expiry for `ttl`. A deadline past the clock's range never comes,
/// so it is stored as no expiry.
fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| now.checked_add(ttl))
}

fn purge(map: &mut EntryMap, now: Instant) -> usize {
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired(now));
    before - map.len()
}

/// Returns the live entry for `key`, dropping it first if it has expired.
fn live<'a>(map: &'a mut EntryMap, key: &[u8], now: Instant) -> Option<&'a mut Entry> {
    if map.get(key).map_or(false, |entry| entry.is_expired(now)) {
        map.remove(key);
        return None;
    }
    map.get_mut(key)
}

#[derive(Debug)]
struct Shard {
    inner: RwLock<EntryMap>,
    writes: AtomicUsize,
}

impl Shard {
    /// Counts one write and sweeps expired entries every `PURGE_INTERVAL`.
    fn note_write(&self, inner: &mut EntryMap, now: Instant) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            purge(inner, now);
        }
    }
}

/// One logical database: a set of lock-sharded maps.
#[derive(Debug)]
pub struct Database {
    shards: Vec<Shard>,
    /// Bitmask for fast shard selection (power-of-two shard count).
    shard_mask: usize,
    hash_state: RandomState,
}

impl Database {
    fn new(shards: usize) -> Self {
        let shard_count = shards.max(1).next_power_of_two();
        let hash_state = RandomState::new();
        let shards = (0..shard_count)
            .map(|_| Shard {
                inner: RwLock::new(HashMap::with_hasher(hash_state.clone())),
                writes: AtomicUsize::new(0),
            })
            .collect();
        Database {
            shards,
            shard_mask: shard_count - 1,
            hash_state,
        }
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        &self.shards[(hasher.finish() as usize) & self.shard_mask]
    }

    /// Returns a copy of the value if the key is live.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.shard_for(key).inner.write();
        live(&mut inner, key, Instant::now()).map(|entry| entry.value.clone())
    }

    /// Stores a value. With `only_if_absent`, nothing happens when a live
    /// entry exists. Returns whether the value was written.
    pub fn set(&self, key: &[u8], value: Vec<u8>, ttl: Option<Duration>, only_if_absent: bool) -> bool {
        let now = Instant::now();
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        if only_if_absent && live(&mut inner, key, now).is_some() {
            return false;
        }
        inner.insert(key.to_vec(), Entry::new(value, ttl, now));
        shard.note_write(&mut inner, now);
        true
    }

    /// Deletes a key and returns whether a live entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut inner = self.shard_for(key).inner.write();
        match inner.remove(key) {
            Some(entry) => !entry.is_expired(Instant::now()),
            None => false,
        }
    }

    /// Returns whether the key is live.
    pub fn exists(&self, key: &[u8]) -> bool {
        let mut inner = self.shard_for(key).inner.write();
        live(&mut inner, key, Instant::now()).is_some()
    }

    /// Sets a TTL on a live key. Returns false when the key is missing.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let now = Instant::now();
        let mut inner = self.shard_for(key).inner.write();
        match live(&mut inner, key, now) {
            Some(entry) => {
                entry.expires_at = deadline(now, Some(ttl));
                true
            }
            None => false,
        }
    }

    /// Clears the TTL of a live key. Returns true only if a TTL was removed.
    pub fn persist(&self, key: &[u8]) -> bool {
        let mut inner = self.shard_for(key).inner.write();
        match live(&mut inner, key, Instant::now()) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    /// Returns TTL state for a key.
    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let now = Instant::now();
        let mut inner = self.shard_for(key).inner.write();
        match live(&mut inner, key, now) {
            None => TtlStatus::Missing,
            Some(Entry { expires_at: None, .. }) => TtlStatus::NoExpiry,
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => TtlStatus::ExpiresIn(deadline.saturating_duration_since(now)),
        }
    }

    /// Adds `delta` to an integer value, creating it from zero when missing.
    /// The TTL of an existing key is kept.
    pub fn incr_by(&self, key: &[u8], delta: i64) -> Result<i64, &'static str> {
        self.apply_delta(key, delta, "increment or decrement would overflow")
    }

    /// Subtracts `delta` from an integer value; see `incr_by`.
    pub fn decr_by(&self, key: &[u8], delta: i64) -> Result<i64, &'static str> {
        let delta = delta.checked_neg().ok_or("decrement would overflow")?;
        self.apply_delta(key, delta, "decrement would overflow")
    }

    fn apply_delta(&self, key: &[u8], delta: i64, overflow: &'static str) -> Result<i64, &'static str> {
        let now = Instant::now();
        let mut inner = self.shard_for(key).inner.write();
        let current = match live(&mut inner, key, now) {
            Some(entry) => parse_int(&entry.value).ok_or("value is not an integer or out of range")?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(overflow)?;
        let value = next.to_string().into_bytes();
        match inner.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                inner.insert(key.to_vec(), Entry::new(value, None, now));
            }
        }
        Ok(next)
    }

    /// Removes every key.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.inner.write().clear();
        }
    }

    /// Counts live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                let inner = shard.inner.read();
                inner.values().filter(|entry| !entry.is_expired(now)).count()
            })
            .sum()
    }

    /// Returns true when no live keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries across all shards.
    ///
    /// This is an O(n) scan intended for long-lived stores.
    pub fn purge_expired(&self, now: Instant) -> usize {
        self.shards
            .iter()
            .map(|shard| purge(&mut shard.inner.write(), now))
            .sum()
    }
}

/// A named in-process store holding numbered databases.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    databases: Mutex<StdHashMap<u32, Arc<Database>>>,
}

impl MemoryStore {
    /// Creates an unregistered store.
    pub fn new(name: impl Into<String>) -> Self {
        MemoryStore {
            name: name.into(),
            databases: Mutex::new(StdHashMap::new()),
        }
    }

    /// Returns the process-wide store registered under `name`, creating it
    /// on first use.
    pub fn named(name: &str) -> Arc<MemoryStore> {
        let mut stores = STORES.lock();
        Arc::clone(
            stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new(name))),
        )
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns database `index`, creating it on first use.
    pub fn database(&self, index: u32) -> Arc<Database> {
        let mut databases = self.databases.lock();
        Arc::clone(
            databases
                .entry(index)
                .or_insert_with(|| Arc::new(Database::new(DEFAULT_SHARDS))),
        )
    }
}

/// Pool handle bound to one database of a `MemoryStore`.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    db: Arc<Database>,
}

impl MemoryPool {
    /// Creates a pool over database `db` of `store`.
    pub fn new(store: &MemoryStore, db: u32) -> Self {
        MemoryPool {
            db: store.database(db),
        }
    }
}

impl StorePool for MemoryPool {
    fn execute(&self, command: &Command) -> TransportResult<RespValue> {
        Ok(dispatch_command(&command.as_args(), &self.db))
    }

    fn execute_pipeline(&self, commands: &[Command]) -> TransportResult<Vec<RespValue>> {
        Ok(commands
            .iter()
            .map(|command| dispatch_command(&command.as_args(), &self.db))
            .collect())
    }
}

/// Creates `MemoryPool`s for `memory://<name>` descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryConnector;

impl MemoryConnector {
    fn store_name(params: &ConnectionParams) -> CacheResult<&str> {
        match &params.endpoint {
            Endpoint::Tcp { host, .. } => Ok(host.as_str()),
            Endpoint::Unix { .. } => Err(CacheError::config(
                "the memory driver needs a store name, not a socket path",
            )),
        }
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    fn validate(&self, params: &ConnectionParams) -> CacheResult<()> {
        Self::store_name(params)?;
        match params.options.keys().next() {
            Some(option) => Err(CacheError::config(format!(
                "unknown connection option {:?} for the memory driver",
                option
            ))),
            None => Ok(()),
        }
    }

    fn connect(&self, params: &ConnectionParams) -> CacheResult<Arc<dyn StorePool>> {
        self.validate(params)?;
        let store = MemoryStore::named(Self::store_name(params)?);
        Ok(Arc::new(MemoryPool::new(&store, params.db)))
    }
}

fn dispatch_command(args: &[&[u8]], db: &Database) -> RespValue {
    let Some((cmd, rest)) = args.split_first() else {
        return resp_error("empty command");
    };

    if cmd.eq_ignore_ascii_case(b"GET") {
        return handle_get(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"SET") {
        return handle_set(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"MGET") {
        return handle_mget(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"MSET") {
        return handle_mset(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"DEL") {
        return count_keys(rest, "DEL", |key| db.delete(key));
    }
    if cmd.eq_ignore_ascii_case(b"EXISTS") {
        return count_keys(rest, "EXISTS", |key| db.exists(key));
    }
    if cmd.eq_ignore_ascii_case(b"EXPIRE") {
        return handle_expire(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"PERSIST") {
        return match rest {
            [key] => RespValue::Integer(db.persist(key) as i64),
            _ => wrong_args("PERSIST"),
        };
    }
    if cmd.eq_ignore_ascii_case(b"TTL") {
        return handle_ttl(rest, db);
    }
    if cmd.eq_ignore_ascii_case(b"INCRBY") {
        return handle_delta(rest, "INCRBY", |key, delta| db.incr_by(key, delta));
    }
    if cmd.eq_ignore_ascii_case(b"DECRBY") {
        return handle_delta(rest, "DECRBY", |key, delta| db.decr_by(key, delta));
    }
    if cmd.eq_ignore_ascii_case(b"FLUSHDB") {
        db.flush();
        return RespValue::ok();
    }

    resp_error("unknown command")
}

fn handle_get(args: &[&[u8]], db: &Database) -> RespValue {
    match args {
        [key] => RespValue::Bulk(db.get(key)),
        _ => wrong_args("GET"),
    }
}

fn handle_set(args: &[&[u8]], db: &Database) -> RespValue {
    let [key, value, options @ ..] = args else {
        return wrong_args("SET");
    };

    let mut ttl = None;
    let mut only_if_absent = false;
    let mut idx = 0;
    while idx < options.len() {
        let option = options[idx];
        if option.eq_ignore_ascii_case(b"NX") {
            only_if_absent = true;
            idx += 1;
        } else if option.eq_ignore_ascii_case(b"EX") {
            match options.get(idx + 1).and_then(|raw| parse_int(raw)) {
                Some(secs) if secs > 0 && secs <= MAX_TTL_SECS => ttl = Some(Duration::from_secs(secs as u64)),
                _ => return resp_error("invalid expire time in 'set' command"),
            }
            idx += 2;
        } else {
            return resp_error("syntax error");
        }
    }

    if db.set(key, value.to_vec(), ttl, only_if_absent) {
        RespValue::ok()
    } else {
        RespValue::Bulk(None)
    }
}

fn handle_mget(args: &[&[u8]], db: &Database) -> RespValue {
    if args.is_empty() {
        return wrong_args("MGET");
    }
    RespValue::Array(args.iter().map(|key| RespValue::Bulk(db.get(key))).collect())
}

fn handle_mset(args: &[&[u8]], db: &Database) -> RespValue {
    if args.is_empty() || args.len() % 2 != 0 {
        return wrong_args("MSET");
    }
    for pair in args.chunks_exact(2) {
        db.set(pair[0], pair[1].to_vec(), None, false);
    }
    RespValue::ok()
}

fn handle_expire(args: &[&[u8]], db: &Database) -> RespValue {
    let [key, seconds] = args else {
        return wrong_args("EXPIRE");
    };
    match parse_int(seconds) {
        // Non-positive TTLs delete the key, as Redis does.
        Some(secs) if secs <= 0 => RespValue::Integer(db.delete(key) as i64),
        Some(secs) if secs > MAX_TTL_SECS => resp_error("invalid expire time in 'expire' command"),
        Some(secs) => RespValue::Integer(db.expire(key, Duration::from_secs(secs as u64)) as i64),
        None => resp_error("value is not an integer or out of range"),
    }
}

fn handle_ttl(args: &[&[u8]], db: &Database) -> RespValue {
    match args {
        [key] => match db.ttl(key) {
            TtlStatus::Missing => RespValue::Integer(-2),
            TtlStatus::NoExpiry => RespValue::Integer(-1),
            TtlStatus::ExpiresIn(left) => RespValue::Integer(left.as_secs() as i64),
        },
        _ => wrong_args("TTL"),
    }
}

fn handle_delta(
    args: &[&[u8]],
    name: &str,
    op: impl FnOnce(&[u8], i64) -> Result<i64, &'static str>,
) -> RespValue {
    let [key, delta] = args else {
        return wrong_args(name);
    };
    let Some(delta) = parse_int(delta) else {
        return resp_error("value is not an integer or out of range");
    };
    match op(key, delta) {
        Ok(value) => RespValue::Integer(value),
        Err(message) => resp_error(message),
    }
}

fn count_keys(keys: &[&[u8]], name: &str, mut op: impl FnMut(&[u8]) -> bool) -> RespValue {
    if keys.is_empty() {
        return wrong_args(name);
    }
    RespValue::Integer(keys.iter().filter(|&&key| op(key)).count() as i64)
}

fn parse_int(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn wrong_args(command: &str) -> RespValue {
    resp_error(&format!("wrong number of arguments for '{}' command", command.to_ascii_lowercase()))
}

fn resp_error(message: &str) -> RespValue {
    RespValue::Error(format!("ERR {}", message).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(db: &Database, args: &[&[u8]]) -> RespValue {
        dispatch_command(args, db)
    }

    #[test]
    fn set_get_delete() {
        let db = Database::new(4);
        assert_eq!(run(&db, &[b"SET", b"alpha", b"value"]), RespValue::ok());
        assert_eq!(run(&db, &[b"GET", b"alpha"]), RespValue::Bulk(Some(b"value".to_vec())));
        assert_eq!(run(&db, &[b"DEL", b"alpha", b"missing"]), RespValue::Integer(1));
        assert_eq!(run(&db, &[b"GET", b"alpha"]), RespValue::Bulk(None));
    }

    #[test]
    fn set_nx_only_creates() {
        let db = Database::new(2);
        assert_eq!(run(&db, &[b"SET", b"k", b"1", b"NX"]), RespValue::ok());
        assert_eq!(run(&db, &[b"SET", b"k", b"2", b"NX", b"EX", b"10"]), RespValue::Bulk(None));
        assert_eq!(db.get(b"k"), Some(b"1".to_vec()));
    }

    #[test]
    fn expire_hides_value() {
        let db = Database::new(2);
        db.set(b"alpha", b"value".to_vec(), None, false);
        assert!(db.expire(b"alpha", Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(db.get(b"alpha").is_none());
        assert!(!db.delete(b"alpha"));
    }

    #[test]
    fn non_positive_expire_deletes() {
        let db = Database::new(2);
        db.set(b"alpha", b"value".to_vec(), None, false);
        assert_eq!(run(&db, &[b"EXPIRE", b"alpha", b"0"]), RespValue::Integer(1));
        assert_eq!(run(&db, &[b"EXISTS", b"alpha"]), RespValue::Integer(0));
    }

    #[test]
    fn ttl_and_persist() {
        let db = Database::new(2);
        assert_eq!(run(&db, &[b"TTL", b"missing"]), RespValue::Integer(-2));
        run(&db, &[b"SET", b"alpha", b"v", b"EX", b"100"]);
        assert!(matches!(run(&db, &[b"TTL", b"alpha"]), RespValue::Integer(secs) if secs > 90));
        assert_eq!(run(&db, &[b"PERSIST", b"alpha"]), RespValue::Integer(1));
        assert_eq!(run(&db, &[b"PERSIST", b"alpha"]), RespValue::Integer(0));
        assert_eq!(run(&db, &[b"TTL", b"alpha"]), RespValue::Integer(-1));
    }

    #[test]
    fn mset_mget_and_flush() {
        let db = Database::new(2);
        assert_eq!(run(&db, &[b"MSET", b"a", b"1", b"c", b"3"]), RespValue::ok());
        assert_eq!(
            run(&db, &[b"MGET", b"a", b"b", b"c"]),
            RespValue::Array(vec![
                RespValue::Bulk(Some(b"1".to_vec())),
                RespValue::Bulk(None),
                RespValue::Bulk(Some(b"3".to_vec())),
            ])
        );
        assert_eq!(db.len(), 2);
        assert_eq!(run(&db, &[b"FLUSHDB"]), RespValue::ok());
        assert!(db.is_empty());
    }

    #[test]
    fn incrby_keeps_integers() {
        let db = Database::new(2);
        assert_eq!(run(&db, &[b"INCRBY", b"n", b"5"]), RespValue::Integer(5));
        assert_eq!(run(&db, &[b"INCRBY", b"n", b"-7"]), RespValue::Integer(-2));
        db.set(b"s", b"text".to_vec(), None, false);
        assert!(matches!(run(&db, &[b"INCRBY", b"s", b"1"]), RespValue::Error(_)));
    }

    #[test]
    fn decrby_rejects_overflow() {
        let db = Database::new(2);
        assert_eq!(run(&db, &[b"DECRBY", b"n", b"3"]), RespValue::Integer(-3));
        let min = i64::MIN.to_string();
        assert!(matches!(run(&db, &[b"DECRBY", b"n", min.as_bytes()]), RespValue::Error(_)));
        db.set(b"zero", b"0".to_vec(), None, false);
        assert!(matches!(run(&db, &[b"DECRBY", b"zero", min.as_bytes()]), RespValue::Error(_)));
        assert_eq!(db.get(b"zero"), Some(b"0".to_vec()));
    }

    #[test]
    fn huge_ttls_are_rejected_or_clamped() {
        let db = Database::new(2);
        let max = i64::MAX.to_string();
        assert_eq!(
            run(&db, &[b"SET", b"k", b"v", b"EX", max.as_bytes()]),
            RespValue::Error(b"ERR invalid expire time in 'set' command".to_vec())
        );
        assert!(!db.exists(b"k"));

        run(&db, &[b"SET", b"k", b"v"]);
        assert!(matches!(run(&db, &[b"EXPIRE", b"k", max.as_bytes()]), RespValue::Error(_)));
        assert_eq!(db.ttl(b"k"), TtlStatus::NoExpiry);

        // Direct callers past the clock's range get a key that never expires.
        assert!(db.set(b"far", b"v".to_vec(), Some(Duration::MAX), false));
        assert!(db.expire(b"k", Duration::MAX));
        assert_eq!(db.ttl(b"far"), TtlStatus::NoExpiry);
        assert_eq!(db.ttl(b"k"), TtlStatus::NoExpiry);
    }

    #[test]
    fn writes_sweep_expired_entries() {
        let db = Database::new(1);
        db.set(b"stale", b"v".to_vec(), Some(Duration::from_millis(1)), false);
        std::thread::sleep(Duration::from_millis(5));
        for idx in 0..PURGE_INTERVAL {
            db.set(format!("key-{}", idx).as_bytes(), b"v".to_vec(), None, false);
        }
        // Never read again, yet gone from the map.
        assert!(!db.shards[0].inner.read().contains_key(&b"stale"[..]));
        assert_eq!(db.len(), PURGE_INTERVAL);
    }

    #[test]
    fn rejects_bad_commands() {
        let db = Database::new(2);
        assert!(matches!(run(&db, &[b"GET"]), RespValue::Error(_)));
        assert!(matches!(run(&db, &[b"SET", b"k", b"v", b"EX", b"0"]), RespValue::Error(_)));
        assert!(matches!(run(&db, &[b"SET", b"k", b"v", b"XX"]), RespValue::Error(_)));
        assert!(matches!(run(&db, &[b"MSET", b"k"]), RespValue::Error(_)));
        assert!(matches!(run(&db, &[b"NOPE"]), RespValue::Error(_)));
        assert!(matches!(run(&db, &[b"PING"]), RespValue::Error(_)));
    }

    #[test]
    fn purge_expired_removes_entries() {
        let db = Database::new(2);
        db.set(b"alpha", b"value".to_vec(), Some(Duration::from_millis(1)), false);
        db.set(b"beta", b"value".to_vec(), None, false);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(db.purge_expired(Instant::now()), 1);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn named_stores_are_shared_and_databases_isolated() {
        let first = MemoryStore::named("memory-driver-unit");
        let second = MemoryStore::named("memory-driver-unit");
        assert!(Arc::ptr_eq(&first, &second));

        first.database(0).set(b"k", b"v".to_vec(), None, false);
        assert!(second.database(0).exists(b"k"));
        assert!(!second.database(1).exists(b"k"));
    }
}
