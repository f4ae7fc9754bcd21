//! # Cache Client API
//!
//! Purpose: Expose a compact, blocking get/set/add/touch/delete API over a
//! sharded Redis-compatible store.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `CacheClient` hides shard selection, pooling,
//!    serialization, and TTL handling.
//! 2. **Read/Write Split**: Writes go to the primary; reads go to a random
//!    replica when replicas exist.
//! 3. **Misses Are Values**: An absent key yields the default, `false`, or
//!    `None`, never an error.
//! 4. **One Round Trip Per Call**: Batched operations are pipelined.
//!
//! Keys are expected to be validated and namespaced by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::driver::{Command, DriverRegistry, RespValue, StorePool};
use crate::error::{CacheResult, TransportError};
use crate::serializer::Serializer;
use crate::shard::{ShardTable, PRIMARY};
use crate::timeout::{Expiry, Timeout, TtlNormalizer};

/// Sharded cache client.
#[derive(Debug)]
pub struct CacheClient {
    shards: ShardTable,
    serializer: Serializer,
    ttl: TtlNormalizer,
}

impl CacheClient {
    /// Builds a client with the bundled drivers.
    ///
    /// Every configuration error surfaces here; no connection is opened.
    pub fn new(config: ClientConfig) -> CacheResult<Self> {
        Self::with_registry(config, &DriverRegistry::builtin())
    }

    /// Builds a client resolving drivers from `registry`.
    pub fn with_registry(config: ClientConfig, registry: &DriverRegistry) -> CacheResult<Self> {
        let servers = config.servers.to_vec()?;
        let shards = ShardTable::new(
            &servers,
            config.username.as_deref(),
            config.password.as_deref(),
            config.driver.as_deref(),
            registry,
        )?;
        let serializer = Serializer::from_setting(config.serializer_protocol.as_ref())?;
        let ttl = TtlNormalizer::new(config.default_timeout());
        Ok(CacheClient {
            shards,
            serializer,
            ttl,
        })
    }

    /// Returns the shard table.
    pub fn shards(&self) -> &ShardTable {
        &self.shards
    }

    /// Returns the value serializer.
    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Returns the TTL normalizer.
    pub fn ttl(&self) -> &TtlNormalizer {
        &self.ttl
    }

    fn pool(&self, write: bool) -> CacheResult<Arc<dyn StorePool>> {
        self.shards.select_pool(write)
    }

    /// Fetches a value, returning `default` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> CacheResult<T> {
        Ok(self.get_value(key)?.unwrap_or(default))
    }

    /// Fetches a value, returning `None` when the key is absent.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let reply = self.pool(false)?.execute(&Command::new("GET").arg(key))?;
        match reply.check()? {
            RespValue::Bulk(Some(payload)) => Ok(Some(self.serializer.decode(&payload)?)),
            RespValue::Bulk(None) => Ok(None),
            _ => Err(TransportError::UnexpectedResponse.into()),
        }
    }

    /// Stores a value unconditionally.
    ///
    /// An immediate timeout deletes the key instead of writing it.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: Timeout) -> CacheResult<()> {
        let payload = self.serializer.encode(value)?;
        let pool = self.pool(true)?;
        let command = match self.ttl.normalize(timeout) {
            Expiry::Immediate => {
                trace!(key, "immediate timeout, deleting instead of writing");
                pool.execute(&Command::new("DEL").arg(key))?.check()?;
                return Ok(());
            }
            Expiry::Persist => Command::new("SET").arg(key).arg(payload),
            Expiry::After(secs) => Command::new("SET")
                .arg(key)
                .arg(payload)
                .arg("EX")
                .arg(secs.to_string()),
        };
        expect_ok(pool.execute(&command)?)
    }

    /// Creates the key only if it does not exist, in one atomic command.
    ///
    /// Returns true when this call created the key. With an immediate
    /// timeout the key is deleted again right after a successful create and
    /// the result is still true: it reports that the conditional write was
    /// accepted, not that the key is present now.
    pub fn add<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: Timeout) -> CacheResult<bool> {
        let payload = self.serializer.encode(value)?;
        let expiry = self.ttl.normalize(timeout);
        let mut command = Command::new("SET").arg(key).arg(payload).arg("NX");
        if let Some(secs) = expiry.seconds() {
            command = command.arg("EX").arg(secs.to_string());
        }

        let pool = self.pool(true)?;
        let created = match pool.execute(&command)?.check()? {
            RespValue::Simple(_) => true,
            RespValue::Bulk(None) => false,
            _ => return Err(TransportError::UnexpectedResponse.into()),
        };
        if created && expiry == Expiry::Immediate {
            pool.execute(&Command::new("DEL").arg(key))?.check()?;
        }
        Ok(created)
    }

    /// Updates the expiry of an existing key. Returns whether the key existed.
    pub fn touch(&self, key: &str, timeout: Timeout) -> CacheResult<bool> {
        let pool = self.pool(true)?;
        match self.ttl.normalize(timeout) {
            Expiry::Persist => {
                // PERSIST reports 0 for a key without TTL, so existence is
                // read separately in the same round trip.
                let replies = pool.execute_pipeline(&[
                    Command::new("EXISTS").arg(key),
                    Command::new("PERSIST").arg(key),
                ])?;
                let mut replies = replies.into_iter();
                let existed = expect_integer(replies.next())? > 0;
                expect_integer(replies.next())?;
                Ok(existed)
            }
            Expiry::After(secs) => {
                let reply = pool.execute(&Command::new("EXPIRE").arg(key).arg(secs.to_string()))?;
                Ok(expect_integer(Some(reply))? > 0)
            }
            Expiry::Immediate => {
                let reply = pool.execute(&Command::new("DEL").arg(key))?;
                Ok(expect_integer(Some(reply))? > 0)
            }
        }
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let reply = self.pool(true)?.execute(&Command::new("DEL").arg(key))?;
        Ok(expect_integer(Some(reply))? > 0)
    }

    /// Deletes several keys in one command. Returns how many were removed.
    pub fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let command = Command::new("DEL").args(keys.iter().map(key_str));
        let reply = self.pool(true)?.execute(&command)?;
        Ok(expect_integer(Some(reply))?.max(0) as usize)
    }

    /// Returns whether the key exists.
    pub fn has_key(&self, key: &str) -> CacheResult<bool> {
        let reply = self.pool(false)?.execute(&Command::new("EXISTS").arg(key))?;
        Ok(expect_integer(Some(reply))? > 0)
    }

    /// Fetches several keys in one batched read.
    ///
    /// Absent keys are left out of the result.
    pub fn get_many<T: DeserializeOwned, K: AsRef<str>>(&self, keys: &[K]) -> CacheResult<HashMap<String, T>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let command = Command::new("MGET").args(keys.iter().map(key_str));
        let values = match self.pool(false)?.execute(&command)?.check()? {
            RespValue::Array(values) if values.len() == keys.len() => values,
            _ => return Err(TransportError::UnexpectedResponse.into()),
        };

        let mut found = HashMap::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            match value {
                RespValue::Bulk(Some(payload)) => {
                    found.insert(key_str(key).to_string(), self.serializer.decode(&payload)?);
                }
                RespValue::Bulk(None) => {}
                _ => return Err(TransportError::UnexpectedResponse.into()),
            }
        }
        Ok(found)
    }

    /// Stores several values in one pipelined round trip.
    ///
    /// The pipeline is `MSET` followed by one `EXPIRE` (or `PERSIST` for
    /// `Timeout::Never`) per key. The follow-up commands are not atomic with
    /// the `MSET`: if the connection fails in between, some keys may keep
    /// their previous TTL state. An immediate timeout deletes the keys.
    pub fn set_many<I, K, V>(&self, entries: I, timeout: Timeout) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let mut keys = Vec::new();
        let mut mset = Command::new("MSET");
        for (key, value) in entries {
            let key: &str = key.as_ref();
            let payload = self.serializer.encode(&value)?;
            mset = mset.arg(key).arg(payload);
            keys.push(key.to_string());
        }
        if keys.is_empty() {
            return Ok(());
        }

        let pool = self.pool(true)?;
        let expiry = self.ttl.normalize(timeout);
        if expiry == Expiry::Immediate {
            let reply = pool.execute(&Command::new("DEL").args(&keys))?;
            expect_integer(Some(reply))?;
            return Ok(());
        }

        let mut commands = Vec::with_capacity(keys.len() + 1);
        commands.push(mset);
        for key in &keys {
            commands.push(match expiry.seconds() {
                Some(secs) => Command::new("EXPIRE").arg(key).arg(secs.to_string()),
                None => Command::new("PERSIST").arg(key),
            });
        }

        let mut replies = pool.execute_pipeline(&commands)?.into_iter();
        expect_ok(replies.next().ok_or(TransportError::UnexpectedResponse)?)?;
        for _ in &keys {
            expect_integer(replies.next())?;
        }
        Ok(())
    }

    /// Adds `delta` to an integer value. Returns `None` when the key is
    /// absent; the key is not created.
    ///
    /// The existence check and the increment are separate commands, so a
    /// key deleted in between is recreated starting from zero.
    pub fn incr(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.apply_delta("INCRBY", key, delta)
    }

    /// Subtracts `delta` from an integer value; see `incr`.
    ///
    /// Sent as `DECRBY`, so the store rejects results that would overflow.
    pub fn decr(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        self.apply_delta("DECRBY", key, delta)
    }

    fn apply_delta(&self, command: &str, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let pool = self.pool(true)?;
        let exists = pool.execute(&Command::new("EXISTS").arg(key))?;
        if expect_integer(Some(exists))? == 0 {
            return Ok(None);
        }
        let reply = pool.execute(&Command::new(command).arg(key).arg(delta.to_string()))?;
        Ok(Some(expect_integer(Some(reply))?))
    }

    /// Removes every key from the primary's selected database.
    ///
    /// This is `FLUSHDB`: it is not limited to keys written by this client.
    /// Every logical cache sharing the same database is emptied too, and the
    /// flush reaches replicas through replication.
    pub fn clear(&self) -> CacheResult<()> {
        let primary = self.shards.shard(PRIMARY).map(|shard| shard.params());
        if let Some(params) = primary {
            debug!(endpoint = %params.endpoint, db = params.db, "flushing database");
        }
        expect_ok(self.pool(true)?.execute(&Command::new("FLUSHDB"))?)
    }
}

fn key_str<K: AsRef<str>>(key: &K) -> &str {
    key.as_ref()
}

fn expect_ok(reply: RespValue) -> CacheResult<()> {
    match reply.check()? {
        RespValue::Simple(_) => Ok(()),
        _ => Err(TransportError::UnexpectedResponse.into()),
    }
}

fn expect_integer(reply: Option<RespValue>) -> CacheResult<i64> {
    match reply.ok_or(TransportError::UnexpectedResponse)?.check()? {
        RespValue::Integer(value) => Ok(value),
        _ => Err(TransportError::UnexpectedResponse.into()),
    }
}
