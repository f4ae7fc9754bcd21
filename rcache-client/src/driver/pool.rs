//! # RESP Connection Pool
//!
//! Purpose: Reuse TCP / unix-socket connections to one shard to reduce
//! handshake latency and allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Bounded Waits**: A caller finding every connection in use waits for
//!    one to come back, at most `pool_timeout`, before giving up.
//! 4. **Cache-Friendly Buffers**: Each connection reuses its own buffers.
//! 5. **Lazy Connects**: Creating a pool opens nothing; connections are
//!    opened (and authenticated) on first acquire.

use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::descriptor::{ConnectionParams, Endpoint};
use crate::driver::resp::{encode_command, ReplyReader, RespValue};
use crate::driver::{Command, Connector, StorePool};
use crate::error::{CacheError, CacheResult, TransportError, TransportResult};

const DEFAULT_MAX_IDLE: usize = 8;
const DEFAULT_MAX_TOTAL: usize = 16;

/// Pool configuration for one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Server endpoint.
    pub endpoint: Endpoint,
    /// Username for `AUTH`; ignored without a password.
    pub username: Option<String>,
    /// Password for `AUTH`.
    pub password: Option<String>,
    /// Database selected after connecting.
    pub db: u32,
    /// Name announced with `CLIENT SETNAME`.
    pub client_name: Option<String>,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional socket write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// How long `acquire` waits on a full pool; `None` waits indefinitely.
    pub pool_timeout: Option<Duration>,
}

impl PoolConfig {
    /// Builds a pool configuration from parsed descriptor parameters.
    ///
    /// Recognized options: `max_connections`, `max_idle`, `socket_timeout`,
    /// `socket_connect_timeout`, `pool_timeout`, `client_name`. Anything else
    /// is rejected. `pool_timeout` defaults to `socket_timeout`.
    pub fn from_params(params: &ConnectionParams) -> CacheResult<Self> {
        if params.scheme == "rediss" {
            return Err(CacheError::config("TLS connections (rediss://) are not supported"));
        }

        let mut config = PoolConfig {
            endpoint: params.endpoint.clone(),
            username: params.username.clone(),
            password: params.password.clone(),
            db: params.db,
            client_name: None,
            max_idle: DEFAULT_MAX_IDLE,
            max_total: DEFAULT_MAX_TOTAL,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
            pool_timeout: None,
        };
        let mut pool_timeout = None;

        for (name, value) in &params.options {
            match name.as_str() {
                "max_connections" => config.max_total = parse_count(name, value)?,
                "max_idle" => config.max_idle = parse_count(name, value)?,
                "socket_timeout" => {
                    let timeout = parse_seconds(name, value)?;
                    config.read_timeout = Some(timeout);
                    config.write_timeout = Some(timeout);
                }
                "socket_connect_timeout" => config.connect_timeout = Some(parse_seconds(name, value)?),
                "pool_timeout" => pool_timeout = Some(parse_seconds(name, value)?),
                "client_name" => config.client_name = Some(value.clone()),
                other => {
                    return Err(CacheError::config(format!("unknown connection option {:?}", other)));
                }
            }
        }

        if config.max_total == 0 {
            return Err(CacheError::config("max_connections must be at least 1"));
        }
        config.max_idle = config.max_idle.min(config.max_total);
        config.pool_timeout = pool_timeout.or(config.read_timeout);
        Ok(config)
    }
}

fn parse_count(name: &str, value: &str) -> CacheResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| CacheError::config(format!("{} must be a non-negative integer, got {:?}", name, value)))
}

fn parse_seconds(name: &str, value: &str) -> CacheResult<Duration> {
    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(CacheError::config(format!(
            "{} must be a positive number of seconds, got {:?}",
            name, value
        ))),
    }
}

/// Creates `RespPool`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespConnector;

impl Connector for RespConnector {
    fn name(&self) -> &str {
        "resp"
    }

    fn validate(&self, params: &ConnectionParams) -> CacheResult<()> {
        PoolConfig::from_params(params).map(|_| ())
    }

    fn connect(&self, params: &ConnectionParams) -> CacheResult<Arc<dyn StorePool>> {
        let config = PoolConfig::from_params(params)?;
        Ok(Arc::new(RespPool::new(config)))
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    // Signalled whenever a connection or a slot is handed back.
    released: Condvar,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct RespPool {
    inner: Arc<PoolInner>,
}

impl RespPool {
    /// Creates a new connection pool with the provided configuration.
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        RespPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                released: Condvar::new(),
            }),
        }
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Returns `(idle, total)` connection counts.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.idle.len(), state.total)
    }

    /// Acquires a connection, reusing an idle one when possible.
    ///
    /// When every connection is in use, waits until one is returned or
    /// `pool_timeout` passes, then fails with `PoolExhausted`.
    pub fn acquire(&self) -> TransportResult<PooledConnection> {
        let config = &self.inner.config;
        let deadline = config
            .pool_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        let mut state = self.inner.state.lock();
        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledConnection::new(self.clone(), conn));
            }
            if state.total < config.max_total {
                state.total += 1;
                break;
            }
            match deadline {
                Some(deadline) => {
                    if self.inner.released.wait_until(&mut state, deadline).timed_out()
                        && state.idle.is_empty()
                        && state.total >= config.max_total
                    {
                        return Err(TransportError::PoolExhausted);
                    }
                }
                None => self.inner.released.wait(&mut state),
            }
        }
        drop(state);

        // The slot is reserved; connect without holding the lock.
        match Connection::connect(config) {
            Ok(conn) => Ok(PooledConnection::new(self.clone(), conn)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.inner.released.notify_one();
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
        drop(state);
        self.inner.released.notify_one();
    }
}

impl StorePool for RespPool {
    fn execute(&self, command: &Command) -> TransportResult<RespValue> {
        let mut conn = self.acquire()?;
        conn.exec(&command.as_args())
    }

    fn execute_pipeline(&self, commands: &[Command]) -> TransportResult<Vec<RespValue>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.acquire()?;
        conn.exec_pipeline(commands)
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: RespPool,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: RespPool, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes a RESP command and returns the parsed response.
    pub fn exec(&mut self, args: &[&[u8]]) -> TransportResult<RespValue> {
        let conn = self.conn.as_mut().ok_or(TransportError::Protocol)?;
        let response = conn.exec(args);
        if response.is_err() {
            // If IO/protocol fails, do not return this connection to the pool.
            self.valid = false;
        }
        response
    }

    /// Writes all commands in one flush, then reads one reply per command.
    pub fn exec_pipeline(&mut self, commands: &[Command]) -> TransportResult<Vec<RespValue>> {
        let conn = self.conn.as_mut().ok_or(TransportError::Protocol)?;
        let response = conn.exec_pipeline(commands);
        if response.is_err() {
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            warn!(endpoint = %self.pool.inner.config.endpoint, "discarding broken connection");
            self.pool.release_slot();
        }
    }
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => {
                stream.set_read_timeout(read)?;
                stream.set_write_timeout(write)?;
                // Disable Nagle to keep request latency low for small payloads.
                stream.set_nodelay(true)
            }
            #[cfg(unix)]
            Stream::Unix(stream) => {
                stream.set_read_timeout(read)?;
                stream.set_write_timeout(write)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.flush(),
        }
    }
}

/// Single connection with reusable buffers.
///
/// The buffers are stored on the connection to avoid per-call allocations.
struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: ReplyReader<BufReader<Stream>>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> TransportResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_timeouts(config.read_timeout, config.write_timeout)?;
        trace!(endpoint = %config.endpoint, "opened connection");

        let mut conn = Connection {
            reader: ReplyReader::new(BufReader::new(stream)),
            write_buf: Vec::with_capacity(256),
        };
        conn.handshake(config)?;
        Ok(conn)
    }

    fn handshake(&mut self, config: &PoolConfig) -> TransportResult<()> {
        if let Some(password) = config.password.as_deref() {
            match config.username.as_deref() {
                Some(username) => self.expect_ok(&[b"AUTH", username.as_bytes(), password.as_bytes()])?,
                None => self.expect_ok(&[b"AUTH", password.as_bytes()])?,
            }
        }
        if config.db != 0 {
            let db = config.db.to_string();
            self.expect_ok(&[b"SELECT", db.as_bytes()])?;
        }
        if let Some(name) = config.client_name.as_deref() {
            self.expect_ok(&[b"CLIENT", b"SETNAME", name.as_bytes()])?;
        }
        Ok(())
    }

    fn expect_ok(&mut self, args: &[&[u8]]) -> TransportResult<()> {
        match self.exec(args)?.check()? {
            RespValue::Simple(_) => Ok(()),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }

    fn exec(&mut self, args: &[&[u8]]) -> TransportResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        self.flush_request()?;
        self.reader.read_reply()
    }

    fn exec_pipeline(&mut self, commands: &[Command]) -> TransportResult<Vec<RespValue>> {
        self.write_buf.clear();
        for command in commands {
            encode_command(&command.as_args(), &mut self.write_buf);
        }
        self.flush_request()?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.reader.read_reply()?);
        }
        Ok(replies)
    }

    fn flush_request(&mut self) -> io::Result<()> {
        let stream = self.reader.get_mut().get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()
    }
}

fn connect_stream(config: &PoolConfig) -> io::Result<Stream> {
    match &config.endpoint {
        Endpoint::Tcp { host, port } => {
            let mut last_err = None;
            for addr in (host.as_str(), *port).to_socket_addrs()? {
                let attempt = match config.connect_timeout {
                    Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                    None => TcpStream::connect(addr),
                };
                match attempt {
                    Ok(stream) => return Ok(Stream::Tcp(stream)),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address found for {}", host))
            }))
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => UnixStream::connect(path).map(Stream::Unix),
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}
