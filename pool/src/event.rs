use serde::{Deserialize, Serialize};
use wdoi_types::{AccountId, TokenId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    Swap {
        trader: AccountId,
        token_in: TokenId,
        amount_in: u128,
        token_out: TokenId,
        amount_out: u128,
    },
    LiquidityAdded {
        provider: AccountId,
        wrapped: u128,
        stable: u128,
        shares: u128,
    },
    LiquidityRemoved {
        provider: AccountId,
        wrapped: u128,
        stable: u128,
        shares: u128,
    },
    FeeChanged {
        old_bps: u16,
        new_bps: u16,
    },
}
