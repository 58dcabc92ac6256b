use thiserror::Error;
use wdoi_ledger::LedgerError;
use wdoi_store::StoreError;
use wdoi_types::{AccountId, RequestId};

use crate::RequestKind;

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid account id '{0}'")]
    InvalidAccount(String),

    #[error("insufficient balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    #[error("request {id} is a {actual:?} request, not {expected:?}")]
    WrongRequestKind {
        id: RequestId,
        expected: RequestKind,
        actual: RequestKind,
    },

    #[error("custodian {0} not found")]
    CustodianNotFound(AccountId),

    #[error("custodian {0} already exists")]
    AlreadyExists(AccountId),

    #[error("request {0} has already been executed")]
    AlreadyExecuted(RequestId),

    #[error("request {0} has been cancelled")]
    Cancelled(RequestId),

    #[error("{custodian} has already confirmed request {id}")]
    DuplicateConfirmation { id: RequestId, custodian: AccountId },

    #[error("invalid threshold {requested}: must be between 1 and {custodians}")]
    InvalidThreshold { requested: u32, custodians: u32 },

    #[error("request id sequence exhausted")]
    SequenceExhausted,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
