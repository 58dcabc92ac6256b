use thiserror::Error;
use wdoi_ledger::LedgerError;
use wdoi_store::StoreError;
use wdoi_types::{AccountId, TokenId};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("pool reserves are empty")]
    InvalidReserves,

    #[error("slippage exceeded: minimum {minimum}, actual {actual}")]
    SlippageExceeded { minimum: u128, actual: u128 },

    #[error("insufficient {token} balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        token: TokenId,
        account: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("fee of {0} bps exceeds the maximum of {max} bps", max = crate::math::MAX_FEE_BPS)]
    InvalidFee(u16),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<LedgerError> for PoolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance {
                token,
                account,
                needed,
                available,
            } => PoolError::InsufficientBalance {
                token,
                account,
                needed,
                available,
            },
            other => PoolError::Ledger(other),
        }
    }
}
