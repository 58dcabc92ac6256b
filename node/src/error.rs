use thiserror::Error;
use wdoi_types::AccountId;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] wdoi_ledger::LedgerError),

    #[error("custody error: {0}")]
    Custody(#[from] wdoi_custody::CustodyError),

    #[error("pool error: {0}")]
    Pool(#[from] wdoi_pool::PoolError),

    #[error("store error: {0}")]
    Store(#[from] wdoi_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] wdoi_store_lmdb::LmdbError),

    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("the stable-token faucet is disabled")]
    FaucetDisabled,

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
