//! Account identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque account identity.
///
/// The core never interprets the string: it may be an EVM address, a
/// custodian's signing key fingerprint or an internal account such as a
/// pool's reserve account. Two ids are the same account iff the strings match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id is well-formed when it is non-empty and contains no whitespace.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity() {
        assert!(AccountId::new("0xabc").is_valid());
        assert!(AccountId::new("pool:1f2e").is_valid());
        assert!(!AccountId::new("").is_valid());
        assert!(!AccountId::new("two words").is_valid());
    }
}
