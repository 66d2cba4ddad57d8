//! Time-sortable event identifiers.
//!
//! An [`EventId`] is 26 Crockford base32 characters encoding 128 bits: the
//! Unix-millisecond timestamp in the top 48 bits, then random/counter bits.
//! Fixed width plus an ascending alphabet means plain string comparison
//! orders ids by creation time. This ordering, never the line position in
//! `status.events.jsonl`, decides which event is a work package's latest.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Encoded length of every event id.
pub const EVENT_ID_LEN: usize = 26;

/// A 26-character, lexicographically time-sortable event identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

/// Error returned when a string is not a well-formed event id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event id '{raw}': expected {EVENT_ID_LEN} Crockford base32 characters")]
pub struct InvalidEventId {
    pub raw: String,
}

impl EventId {
    /// Generate a fresh id for the current instant.
    ///
    /// Backed by UUIDv7, which stays monotonic within one process even when
    /// several ids are minted in the same millisecond.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_u128(Uuid::now_v7().as_u128())
    }

    /// Generate an id that sorts strictly after `prev`.
    ///
    /// A fresh id normally already does. When the local clock trails the
    /// clock that minted `prev` (another worktree, another host), the id
    /// is bumped to `prev + 1` so the new event still wins reduction.
    #[must_use]
    pub fn generate_after(prev: Option<&Self>) -> Self {
        let fresh = Self::generate();
        match prev {
            Some(prev) if fresh <= *prev => prev.successor(),
            _ => fresh,
        }
    }

    /// The next id in sort order.
    #[must_use]
    pub fn successor(&self) -> Self {
        Self::from_u128(self.to_u128().saturating_add(1))
    }

    /// Encode 128 raw bits as an id.
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        let mut out = String::with_capacity(EVENT_ID_LEN);
        for i in 0..EVENT_ID_LEN {
            let shift = 5 * (EVENT_ID_LEN - 1 - i);
            let idx = ((value >> shift) & 0x1f) as usize;
            out.push(char::from(CROCKFORD[idx]));
        }
        Self(out)
    }

    /// Build an id whose timestamp component is `millis` and whose low
    /// 80 bits are `entropy`.
    #[must_use]
    pub fn from_parts(millis: u64, entropy: u128) -> Self {
        let ts = u128::from(millis & 0xFFFF_FFFF_FFFF) << 80;
        Self::from_u128(ts | (entropy & ((1_u128 << 80) - 1)))
    }

    /// Decode the id back to its 128-bit value.
    #[must_use]
    pub fn to_u128(&self) -> u128 {
        self.0.bytes().fold(0_u128, |acc, b| {
            let digit = CROCKFORD.iter().position(|c| *c == b).unwrap_or(0);
            (acc << 5) | digit as u128
        })
    }

    /// Creation time embedded in the id, at millisecond precision.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.to_u128() >> 80).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = InvalidEventId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == EVENT_ID_LEN
            && bytes[0] <= b'7'
            && bytes.iter().all(|b| CROCKFORD.contains(b));
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidEventId { raw: s.to_string() })
        }
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
