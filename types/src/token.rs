//! Token identifiers and per-token metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a token tracked by the balance ledger (e.g. `wDOI`, `USDT`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token ids are short printable symbols: 1..=32 chars of
    /// ASCII alphanumerics, `-`, `_` or `.`.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 32
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Registered token metadata.
///
/// Precision is per token: the wrapped and pool-share tokens use 18
/// decimals, the stable token usually 6. Amounts everywhere are raw integer
/// units of the token's smallest denomination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub id: TokenId,
    pub decimals: u8,
}

impl TokenSpec {
    /// Largest precision whose unit (10^decimals) still fits in a u128.
    pub const MAX_DECIMALS: u8 = 38;

    pub fn new(id: impl Into<TokenId>, decimals: u8) -> Self {
        Self {
            id: id.into(),
            decimals,
        }
    }

    /// Raw units in one whole token.
    pub fn unit(&self) -> u128 {
        crate::amount::pow10(self.decimals).unwrap_or(u128::MAX)
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
