//! Errors raised while constructing or parsing fundamental types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("amount '{input}' has more than {decimals} decimal places")]
    TooManyDecimals { input: String, decimals: u8 },

    #[error("amount overflows 128 bits: {0}")]
    Overflow(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}
