//! Custody request identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence id of a mint or burn request. Starts at 1 and is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// The first id handed out by a fresh authority.
    pub const FIRST: Self = Self(1);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Big-endian key bytes, so store iteration yields ids in order.
    pub fn to_key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
