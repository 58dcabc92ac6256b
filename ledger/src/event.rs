//! Events emitted after a ledger transaction commits.

use serde::{Deserialize, Serialize};
use wdoi_types::{AccountId, TokenId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventKind {
    Mint,
    Burn,
    Transfer,
}

/// One committed balance movement, for downstream observers (UI balance
/// refresh, audit logs).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub token: TokenId,
    pub kind: LedgerEventKind,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
    pub amount: u128,
    /// Total supply of `token` after this movement.
    pub resulting_supply: u128,
    /// Position of the committing transaction, counted from 1 since the
    /// ledger was opened. Movements of one transaction share it.
    ///
    /// Listeners run on the committing thread after the ledger lock is
    /// released, so events of concurrent transactions can arrive out of
    /// order; `commit` restores the order.
    pub commit: u64,
}
