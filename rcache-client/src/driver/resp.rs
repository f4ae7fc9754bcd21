//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server responses for the pooled
//! TCP driver, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **Top-Down Parsing**: `ReplyReader` reads one reply per call, recursing
//!    into arrays.
//! 2. **Buffer Reuse**: The reader keeps its line buffer across replies; the
//!    encoder appends to a caller-owned buffer.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing and oversized bulk lengths return
//!    protocol errors before any payload is read.

use std::io::BufRead;

use crate::error::{TransportError, TransportResult};

/// RESP response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays (MGET replies).
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Converts an error reply into `TransportError::Server`.
    pub fn check(self) -> TransportResult<RespValue> {
        match self {
            RespValue::Error(message) => Err(TransportError::Server { message }),
            other => Ok(other),
        }
    }

    /// Simple-string reply helper.
    pub fn ok() -> Self {
        RespValue::Simple(b"OK".to_vec())
    }
}

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted from a server (Redis `proto-max-bulk-len`).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Encodes a RESP2 array command into the provided buffer.
///
/// Appends to `out`, so several commands can be framed into one write.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    write_header(out, b'*', args.len());
    for arg in args {
        write_header(out, b'$', arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }
}

fn write_header(out: &mut Vec<u8>, marker: u8, len: usize) {
    out.push(marker);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(CRLF);
}

/// Reads replies off a buffered stream, reusing one line buffer.
pub struct ReplyReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: BufRead> ReplyReader<R> {
    pub fn new(inner: R) -> Self {
        ReplyReader {
            inner,
            line: Vec::with_capacity(128),
        }
    }

    /// Returns the underlying reader, e.g. to write requests on it.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads one complete reply, nested arrays included.
    pub fn read_reply(&mut self) -> TransportResult<RespValue> {
        self.fill_line()?;
        let (&marker, body) = self.line.split_first().ok_or(TransportError::Protocol)?;
        match marker {
            b'+' => Ok(RespValue::Simple(body.to_vec())),
            b'-' => Ok(RespValue::Error(body.to_vec())),
            b':' => parse_i64(body).map(RespValue::Integer),
            b'$' => {
                let len = parse_len(body)?;
                self.read_bulk(len)
            }
            b'*' => {
                let len = parse_len(body)?;
                self.read_array(len)
            }
            _ => Err(TransportError::Protocol),
        }
    }

    fn read_bulk(&mut self, len: Option<usize>) -> TransportResult<RespValue> {
        let Some(len) = len else {
            return Ok(RespValue::Bulk(None));
        };
        if len > MAX_BULK_LEN {
            return Err(TransportError::Protocol);
        }

        let mut data = vec![0u8; len + CRLF.len()];
        self.inner.read_exact(&mut data)?;
        if !data.ends_with(CRLF) {
            return Err(TransportError::Protocol);
        }
        data.truncate(len);
        Ok(RespValue::Bulk(Some(data)))
    }

    fn read_array(&mut self, len: Option<usize>) -> TransportResult<RespValue> {
        let len = len.unwrap_or(0);
        // The count is server-supplied; grow as items actually arrive.
        let mut items = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            items.push(self.read_reply()?);
        }
        Ok(RespValue::Array(items))
    }

    /// Reads the next CRLF-terminated line into `self.line`, without the CRLF.
    fn fill_line(&mut self) -> TransportResult<()> {
        self.line.clear();
        if self.inner.read_until(b'\n', &mut self.line)? == 0 || !self.line.ends_with(CRLF) {
            return Err(TransportError::Protocol);
        }
        self.line.truncate(self.line.len() - CRLF.len());
        Ok(())
    }
}

fn parse_i64(digits: &[u8]) -> TransportResult<i64> {
    match digits.first() {
        Some(b'-' | b'0'..=b'9') => std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(TransportError::Protocol),
        _ => Err(TransportError::Protocol),
    }
}

/// Length prefix of a bulk string or array; negative means null.
fn parse_len(digits: &[u8]) -> TransportResult<Option<usize>> {
    let len = parse_i64(digits)?;
    if len < 0 {
        return Ok(None);
    }
    usize::try_from(len).map(Some).map_err(|_| TransportError::Protocol)
}
