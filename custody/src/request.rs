//! Mint and burn requests and their lifecycle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use wdoi_types::{AccountId, RequestId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Issue wrapped tokens against a deposit on the source chain.
    Mint,
    /// Destroy wrapped tokens; custodians release the native asset off-chain.
    Burn,
}

/// `Pending` moves to exactly one terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Executed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    /// Merchant or custodian that opened the request.
    pub requester: AccountId,
    /// Beneficiary of a mint, or the account burned from.
    pub account: AccountId,
    pub amount: u128,
    /// Source-chain transaction id.
    pub external_ref: String,
    /// Custodian-side reference (release address for burns).
    pub custodian_ref: String,
    pub confirmations: BTreeSet<AccountId>,
    pub status: RequestStatus,
    /// Threshold in force when the request was created.
    pub threshold_at_creation: u32,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl CustodyRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn confirmation_count(&self) -> u32 {
        u32::try_from(self.confirmations.len()).unwrap_or(u32::MAX)
    }

    pub fn has_confirmed(&self, custodian: &AccountId) -> bool {
        self.confirmations.contains(custodian)
    }

    /// The off-chain release owed for an executed burn.
    pub fn release(&self) -> Option<ReleaseInstruction> {
        match (self.kind, self.status) {
            (RequestKind::Burn, RequestStatus::Executed) => Some(ReleaseInstruction {
                request: self.id,
                account: self.account.clone(),
                amount: self.amount,
                custodian_ref: self.custodian_ref.clone(),
                external_ref: self.external_ref.clone(),
            }),
            _ => None,
        }
    }
}

/// Instruction for custodians to pay out the native asset after a burn.
/// Recorded only; executing it is an off-chain concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInstruction {
    pub request: RequestId,
    pub account: AccountId,
    pub amount: u128,
    pub custodian_ref: String,
    pub external_ref: String,
}
