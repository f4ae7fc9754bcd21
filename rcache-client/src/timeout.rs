//! # TTL Normalization
//!
//! Purpose: Map the caller-facing `Timeout` onto the expiry argument the
//! store understands.
//!
//! ## Non-positive timeouts
//!
//! `Timeout::Seconds(n)` with `n <= 0` normalizes to `Expiry::Immediate`. The
//! client treats it as "write, then delete": the key is never left visible.
//! `add` still reports whether its conditional write was accepted, so an
//! immediate `add` can return `true` while the key is absent afterwards.

use std::num::NonZeroU64;
use std::time::Duration;

/// Default expiry applied when a call passes `Timeout::Default`.
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;

/// Per-call timeout as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Use the client-wide default.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after `n` seconds; `n <= 0` expires immediately.
    Seconds(i64),
}

impl From<Duration> for Timeout {
    /// Whole seconds only; sub-second durations truncate to zero (immediate).
    fn from(duration: Duration) -> Self {
        Timeout::Seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

impl From<Option<i64>> for Timeout {
    fn from(value: Option<i64>) -> Self {
        match value {
            Some(seconds) => Timeout::Seconds(seconds),
            None => Timeout::Never,
        }
    }
}

/// Store-native expiry derived from a `Timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// No TTL; any existing TTL is cleared.
    Persist,
    /// TTL in seconds, always positive.
    After(NonZeroU64),
    /// The key must not remain visible.
    Immediate,
}

impl Expiry {
    /// Seconds as passed to `EX` / `EXPIRE`, if this expiry carries a TTL.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Expiry::After(secs) => Some(secs.get()),
            _ => None,
        }
    }
}

/// Resolves `Timeout::Default` against the client-wide default and maps the
/// result onto an `Expiry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlNormalizer {
    default: Timeout,
}

impl TtlNormalizer {
    /// `default` must itself be concrete; `Timeout::Default` is read as the
    /// built-in default of `DEFAULT_TIMEOUT_SECS`.
    pub fn new(default: Timeout) -> Self {
        let default = match default {
            Timeout::Default => Timeout::Seconds(DEFAULT_TIMEOUT_SECS),
            other => other,
        };
        TtlNormalizer { default }
    }

    /// Returns the client-wide default.
    pub fn default_timeout(&self) -> Timeout {
        self.default
    }

    /// Normalizes a per-call timeout.
    pub fn normalize(&self, timeout: Timeout) -> Expiry {
        let concrete = match timeout {
            Timeout::Default => self.default,
            other => other,
        };
        match concrete {
            Timeout::Never => Expiry::Persist,
            Timeout::Seconds(n) if n > 0 => match NonZeroU64::new(n as u64) {
                Some(secs) => Expiry::After(secs),
                None => Expiry::Immediate,
            },
            Timeout::Seconds(_) => Expiry::Immediate,
            // `new` never stores `Default`.
            Timeout::Default => Expiry::Persist,
        }
    }
}

impl Default for TtlNormalizer {
    fn default() -> Self {
        TtlNormalizer::new(Timeout::Default)
    }
}
