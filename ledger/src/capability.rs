//! Supply capabilities: the right to mint and burn specific tokens.

use std::collections::BTreeSet;
use std::fmt;

use wdoi_types::TokenId;

/// Proof that the holder may change the supply of a fixed set of tokens on
/// one particular ledger instance.
///
/// Capabilities cannot be constructed outside this crate and are not
/// `Clone`. They are only issued through
/// [`BalanceLedger::issue_supply_capability`](crate::BalanceLedger::issue_supply_capability),
/// which needs exclusive access to the ledger, i.e. before it is shared.
pub struct SupplyCapability {
    ledger: u64,
    holder: String,
    tokens: BTreeSet<TokenId>,
}

impl SupplyCapability {
    pub(crate) fn new(ledger: u64, holder: String, tokens: BTreeSet<TokenId>) -> Self {
        Self {
            ledger,
            holder,
            tokens,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.tokens.iter()
    }

    pub(crate) fn permits(&self, ledger: u64, token: &TokenId) -> bool {
        self.ledger == ledger && self.tokens.contains(token)
    }
}

impl fmt::Debug for SupplyCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplyCapability")
            .field("holder", &self.holder)
            .field("tokens", &self.tokens)
            .finish()
    }
}
