//! Events published by the authority after each committed change.

use serde::{Deserialize, Serialize};
use wdoi_types::{AccountId, RequestId};

use crate::{ReleaseInstruction, RequestKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyEvent {
    RequestCreated {
        id: RequestId,
        kind: RequestKind,
        requester: AccountId,
        account: AccountId,
        amount: u128,
    },
    Confirmed {
        id: RequestId,
        custodian: AccountId,
        confirmations: u32,
        required: u32,
    },
    Executed {
        id: RequestId,
        kind: RequestKind,
        account: AccountId,
        amount: u128,
        release: Option<ReleaseInstruction>,
    },
    Cancelled {
        id: RequestId,
        by: AccountId,
    },
    CustodianAdded(AccountId),
    CustodianRemoved(AccountId),
    MerchantAdded(AccountId),
    MerchantRemoved(AccountId),
    ThresholdChanged {
        old: u32,
        new: u32,
    },
}
