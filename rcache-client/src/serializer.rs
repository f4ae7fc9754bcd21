//! # Value Serializer
//!
//! Purpose: Turn caller values into store payloads and back.
//!
//! ## Payload layout
//!
//! ```text
//! integer values:   b"-42"                 (bare ASCII digits, INCRBY-compatible)
//! protocol 1:       0x01 | json bytes
//! protocol 2:       0x02 | bincode bytes
//! ```
//!
//! Decoding reads the header, so a payload written under one protocol stays
//! readable by a client configured with another. Integer detection runs a
//! probe `serde::Serializer` that bails out on the first non-integer call, so
//! it costs nothing for structured values.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible, Serialize};
use serde_json::Value;

use crate::error::{CacheError, CacheResult};

/// JSON payloads.
pub const PROTOCOL_JSON: u8 = 1;
/// Compact binary payloads.
pub const PROTOCOL_BINCODE: u8 = 2;
/// Protocol used when none is configured.
pub const HIGHEST_PROTOCOL: u8 = PROTOCOL_BINCODE;

/// Encodes and decodes cache values under a fixed protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serializer {
    protocol: u8,
}

impl Serializer {
    /// Creates a serializer; `None` selects `HIGHEST_PROTOCOL`.
    pub fn new(protocol: Option<u8>) -> CacheResult<Self> {
        let protocol = protocol.unwrap_or(HIGHEST_PROTOCOL);
        if !(PROTOCOL_JSON..=HIGHEST_PROTOCOL).contains(&protocol) {
            return Err(CacheError::config(format!(
                "unsupported serializer protocol {} (expected {}..={})",
                protocol, PROTOCOL_JSON, HIGHEST_PROTOCOL
            )));
        }
        Ok(Serializer { protocol })
    }

    /// Creates a serializer from a loosely typed configuration value.
    ///
    /// Accepts `null`, an integer, or a string holding an integer.
    pub fn from_setting(setting: Option<&Value>) -> CacheResult<Self> {
        let raw = match setting {
            None | Some(Value::Null) => return Self::new(None),
            Some(Value::Number(number)) => number.as_i64().ok_or_else(|| {
                CacheError::config(format!("serializer protocol must be an integer, got {}", number))
            })?,
            Some(Value::String(text)) => text.trim().parse::<i64>().map_err(|_| {
                CacheError::config(format!("serializer protocol must be an integer, got {:?}", text))
            })?,
            Some(other) => {
                return Err(CacheError::config(format!(
                    "serializer protocol must be an integer, got {}",
                    other
                )))
            }
        };
        let protocol = u8::try_from(raw)
            .map_err(|_| CacheError::config(format!("unsupported serializer protocol {}", raw)))?;
        Self::new(Some(protocol))
    }

    /// Returns the protocol used for encoding.
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Encodes a value into a store payload.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>> {
        if let Ok(int) = value.serialize(IntegerProbe) {
            return Ok(int.to_string().into_bytes());
        }

        let mut out = vec![self.protocol];
        match self.protocol {
            PROTOCOL_JSON => serde_json::to_writer(&mut out, value)
                .map_err(|err| CacheError::Serialization(err.to_string()))?,
            _ => bincode::serialize_into(&mut out, value)
                .map_err(|err| CacheError::Serialization(err.to_string()))?,
        }
        Ok(out)
    }

    /// Decodes a store payload, detecting its protocol from the header.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> CacheResult<T> {
        let (&header, body) = payload
            .split_first()
            .ok_or_else(|| CacheError::Serialization("empty payload".to_string()))?;

        match header {
            b'-' | b'0'..=b'9' => serde_json::from_slice(payload)
                .map_err(|err| CacheError::Serialization(err.to_string())),
            PROTOCOL_JSON => serde_json::from_slice(body)
                .map_err(|err| CacheError::Serialization(err.to_string())),
            PROTOCOL_BINCODE => bincode::deserialize(body)
                .map_err(|err| CacheError::Serialization(err.to_string())),
            other => Err(CacheError::Serialization(format!(
                "unknown payload header 0x{:02x}",
                other
            ))),
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer {
            protocol: HIGHEST_PROTOCOL,
        }
    }
}

#[derive(Debug)]
struct NotAnInteger;

impl fmt::Display for NotAnInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not an integer")
    }
}

impl std::error::Error for NotAnInteger {}

impl ser::Error for NotAnInteger {
    fn custom<M: fmt::Display>(_msg: M) -> Self {
        NotAnInteger
    }
}

/// Accepts exactly one signed 64-bit-representable integer.
struct IntegerProbe;

macro_rules! probe_int {
    ($($method:ident: $ty:ty),*) => {
        $(fn $method(self, v: $ty) -> Result<i64, NotAnInteger> {
            i64::try_from(v).map_err(|_| NotAnInteger)
        })*
    };
}

macro_rules! probe_reject {
    ($($method:ident($($arg:ty),*)),*) => {
        $(fn $method(self, $(_: $arg),*) -> Result<i64, NotAnInteger> {
            Err(NotAnInteger)
        })*
    };
}

impl ser::Serializer for IntegerProbe {
    type Ok = i64;
    type Error = NotAnInteger;
    type SerializeSeq = Impossible<i64, NotAnInteger>;
    type SerializeTuple = Impossible<i64, NotAnInteger>;
    type SerializeTupleStruct = Impossible<i64, NotAnInteger>;
    type SerializeTupleVariant = Impossible<i64, NotAnInteger>;
    type SerializeMap = Impossible<i64, NotAnInteger>;
    type SerializeStruct = Impossible<i64, NotAnInteger>;
    type SerializeStructVariant = Impossible<i64, NotAnInteger>;

    probe_int!(
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64
    );

    probe_reject!(
        serialize_bool(bool),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_none(),
        serialize_unit(),
        serialize_unit_struct(&'static str),
        serialize_unit_variant(&'static str, u32, &'static str)
    );

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<i64, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<i64, NotAnInteger> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<i64, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, NotAnInteger> {
        Err(NotAnInteger)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, NotAnInteger> {
        Err(NotAnInteger)
    }
}
