//! Hashing utilities for ringkv
//!
//! - BLAKE3 truncated to 128 bits positions nodes and keys on the ring
//! - `HashRange` is the `(start, end]` interval a node owns, wrapping at the top

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Position on the hash ring (128-bit digest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RingHash(pub u128);

impl RingHash {
    pub const MIN: RingHash = RingHash(0);
    pub const MAX: RingHash = RingHash(u128::MAX);

    /// Hash arbitrary bytes onto the ring
    pub fn of(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest.as_bytes()[..16]);
        RingHash(u128::from_be_bytes(head))
    }
}

/// Ring position of a storage node, derived from `host:port`
pub fn node_hash(host: &str, port: u16) -> RingHash {
    RingHash::of(format!("{}:{}", host, port).as_bytes())
}

/// Ring position of a client key
pub fn key_hash(key: &str) -> RingHash {
    RingHash::of(key.as_bytes())
}

impl fmt::Display for RingHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for RingHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::Error::Other(format!("invalid ring hash {:?}: {}", s, e)))?;
        if bytes.len() != 16 {
            return Err(crate::Error::Other(format!(
                "invalid ring hash {:?}: expected 32 hex digits",
                s
            )));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Ok(RingHash(u128::from_be_bytes(buf)))
    }
}

impl Serialize for RingHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RingHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `(start, end]` of ring positions, wrapping modulo the space.
///
/// `start == end` covers the whole ring (single node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRange {
    pub start: RingHash,
    pub end: RingHash,
}

impl HashRange {
    pub fn new(start: RingHash, end: RingHash) -> Self {
        Self { start, end }
    }

    /// The range owned by the only node of a ring
    pub fn full(end: RingHash) -> Self {
        Self { start: end, end }
    }

    pub fn is_full(&self) -> bool {
        self.start == self.end
    }

    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, hash: RingHash) -> bool {
        if self.is_full() {
            true
        } else if self.wraps() {
            hash > self.start || hash <= self.end
        } else {
            hash > self.start && hash <= self.end
        }
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}
