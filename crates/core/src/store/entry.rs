//! Entry Metadata Module
//!
//! Per-record metadata: absolute expiration timestamp, last-access time used
//! by LRU sampling, and the value encoding hint deduced at write time.

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// Values at most this long that are not integers carry the `Embstr` hint.
pub const EMBSTR_MAX_LEN: usize = 44;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Value encoding hint, deduced when the record is written.
///
/// The hint is informational; it never alters observable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bytes parse exactly as a signed 64-bit decimal integer
    Int,
    /// Short non-integer string
    Embstr,
    /// Everything else
    Raw,
}

impl Encoding {
    pub fn deduce(value: &[u8]) -> Self {
        if std::str::from_utf8(value).is_ok_and(|s| s.parse::<i64>().is_ok()) {
            Encoding::Int
        } else if value.len() <= EMBSTR_MAX_LEN {
            Encoding::Embstr
        } else {
            Encoding::Raw
        }
    }
}

/// A stored record: the value bytes plus expiration and access metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Bytes,
    /// Absolute expiration time in epoch milliseconds (None = no expiry)
    pub expires_at: Option<u64>,
    /// Wall-clock time of the most recent read or write, for LRU sampling
    pub last_access: u64,
    pub encoding: Encoding,
}

impl Entry {
    pub fn new(value: Bytes, expires_at: Option<u64>) -> Self {
        let encoding = Encoding::deduce(&value);
        Self {
            value,
            expires_at,
            last_access: now_ms(),
            encoding,
        }
    }

    /// A record whose expiration time has passed is semantically absent.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Remaining TTL in milliseconds (None if no expiration or expired)
    pub fn ttl_millis(&self, now: u64) -> Option<u64> {
        self.expires_at
            .and_then(|at| if at <= now { None } else { Some(at - now) })
    }
}
