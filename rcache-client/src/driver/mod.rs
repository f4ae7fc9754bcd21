//! # Store Drivers
//!
//! Purpose: Hide how commands reach a store behind two small traits so the
//! cache client only builds commands and interprets replies.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `Connector` creates pools; `StorePool` runs commands.
//! 2. **Registry Lookup**: Driver names resolve to connectors once, while the
//!    client is being built.
//! 3. **Shared Pools**: Pools are `Send + Sync` and shared through `Arc`.
//! 4. **Eager Validation**: Connectors check parameters before any pool exists.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::ConnectionParams;
use crate::error::{CacheError, CacheResult, TransportResult};

pub mod memory;
pub mod pool;
pub mod resp;

pub use memory::{MemoryConnector, MemoryStore};
pub use pool::{PoolConfig, RespConnector, RespPool};
pub use resp::RespValue;

/// A single store command as a list of binary-safe arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Starts a command with its name.
    pub fn new(name: &str) -> Self {
        Command {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Appends every argument from an iterator.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_vec()));
        self
    }

    /// Returns the command name followed by its arguments.
    pub fn as_args(&self) -> Vec<&[u8]> {
        self.args.iter().map(Vec::as_slice).collect()
    }

    /// Returns the command name.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }
}

/// A concurrency-safe pool of connections to one shard.
pub trait StorePool: Send + Sync {
    /// Executes one command and returns its reply.
    fn execute(&self, command: &Command) -> TransportResult<RespValue>;

    /// Executes commands in one round trip, returning replies in order.
    ///
    /// Commands are not wrapped in a transaction.
    fn execute_pipeline(&self, commands: &[Command]) -> TransportResult<Vec<RespValue>>;
}

/// Creates pools for a driver.
pub trait Connector: Send + Sync {
    /// Driver name used in logs.
    fn name(&self) -> &str;

    /// Checks parameters without connecting.
    fn validate(&self, params: &ConnectionParams) -> CacheResult<()>;

    /// Creates a pool. Connections inside the pool may still be opened lazily.
    fn connect(&self, params: &ConnectionParams) -> CacheResult<Arc<dyn StorePool>>;
}

/// Maps driver names and URL schemes to connectors.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        DriverRegistry::default()
    }

    /// Creates a registry with the bundled drivers.
    ///
    /// `resp` answers to `resp`, `redis`, and `unix`; `memory` to `memory`.
    pub fn builtin() -> Self {
        let resp: Arc<dyn Connector> = Arc::new(RespConnector);
        let memory: Arc<dyn Connector> = Arc::new(MemoryConnector);

        let mut registry = DriverRegistry::new();
        registry.register("resp", Arc::clone(&resp));
        registry.register("redis", Arc::clone(&resp));
        registry.register("unix", resp);
        registry.register("memory", memory);
        registry
    }

    /// Registers (or replaces) a connector under `name`.
    pub fn register(&mut self, name: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors.insert(name.into().to_ascii_lowercase(), connector);
    }

    /// Resolves a name to its connector.
    pub fn resolve(&self, name: &str) -> CacheResult<Arc<dyn Connector>> {
        self.connectors
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CacheError::config(format!("no driver registered for {:?}", name)))
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.connectors.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry").field("drivers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_commands() {
        let command = Command::new("SET").arg("key").arg(b"value").args(["EX", "5"]);
        assert_eq!(command.name(), b"SET");
        assert_eq!(
            command.as_args(),
            vec![&b"SET"[..], &b"key"[..], &b"value"[..], &b"EX"[..], &b"5"[..]]
        );
    }

    #[test]
    fn resolves_builtin_names() {
        let registry = DriverRegistry::builtin();
        assert_eq!(registry.resolve("redis").unwrap().name(), "resp");
        assert_eq!(registry.resolve("UNIX").unwrap().name(), "resp");
        assert_eq!(registry.resolve("memory").unwrap().name(), "memory");
        assert!(registry.resolve("memcached").err().unwrap().is_config());
    }
}
