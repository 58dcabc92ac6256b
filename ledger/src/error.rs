use thiserror::Error;
use wdoi_types::{AccountId, TokenId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("capability held by '{holder}' does not cover supply changes of {token}")]
    Unauthorized { holder: String, token: TokenId },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient {token} balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        token: TokenId,
        account: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("token {0} not found")]
    TokenNotFound(TokenId),

    #[error("token {token} already registered with {existing} decimals, not {requested}")]
    TokenMismatch {
        token: TokenId,
        existing: u8,
        requested: u8,
    },

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid account id '{0}'")]
    InvalidAccount(String),

    #[error("supply mismatch for {token}: tracked {supply}, balances sum to {sum}")]
    SupplyMismatch {
        token: TokenId,
        supply: u128,
        sum: u128,
    },

    #[error("storage error: {0}")]
    Storage(#[from] wdoi_store::StoreError),
}
