//! # rcache Client
//!
//! Purpose: Provide a synchronous cache client over one or more
//! Redis-compatible servers, with a primary for writes, random read replicas,
//! pooled connections, and serde-based values.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connections per shard; pools are created
//!    lazily, once, and shared.
//! 2. **Fail Fast**: Configuration errors surface while the client is built.
//! 3. **Pluggable Drivers**: Commands reach the store through the `StorePool`
//!    trait; drivers are looked up by name in a `DriverRegistry`.
//! 4. **Protocol Clarity**: The RESP driver encodes/parses RESP2 explicitly.
//!
//! ## Example
//!
//! ```no_run
//! use rcache_client::{CacheClient, ClientConfig, Timeout};
//!
//! let client = CacheClient::new(ClientConfig::new("redis://primary:6379,redis://replica:6379"))?;
//! client.set("greeting", "hello", Timeout::Seconds(60))?;
//! let greeting: String = client.get("greeting", String::new())?;
//! # Ok::<(), rcache_client::CacheError>(())
//! ```

mod client;
mod config;
mod descriptor;
pub mod driver;
mod error;
mod serializer;
mod shard;
mod timeout;

pub use client::CacheClient;
pub use config::{ClientConfig, ServerList};
pub use descriptor::{split_server_list, ConnectionParams, Endpoint, ServerDescriptor, DEFAULT_PORT};
pub use driver::{Command, Connector, DriverRegistry, RespValue, StorePool};
pub use error::{CacheError, CacheResult, TransportError, TransportResult};
pub use serializer::{Serializer, HIGHEST_PROTOCOL, PROTOCOL_BINCODE, PROTOCOL_JSON};
pub use shard::{Shard, ShardTable, PRIMARY};
pub use timeout::{Expiry, Timeout, TtlNormalizer, DEFAULT_TIMEOUT_SECS};
