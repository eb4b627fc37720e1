//! In-memory index rows pointing into the value-log.

use crate::codec::Encoding;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds, the unit of record timestamps and expirations.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Location and metadata of a stored value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValuePointer {
    /// Millisecond timestamp recorded when the entry was written.
    pub timestamp: u64,
    /// Absolute expiration in milliseconds; `None` means the entry never
    /// expires.
    pub expiration: Option<u64>,
    /// Byte offset of the payload inside the value-log.
    pub offset: u64,
    /// Payload length in bytes.
    pub size: u64,
    /// How the payload bytes were encoded.
    pub encoding: Encoding,
}

impl ValuePointer {
    /// Reports whether the entry's expiration has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Expiration check against an externally sampled clock.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expiration, Some(deadline) if now > deadline)
    }
}
