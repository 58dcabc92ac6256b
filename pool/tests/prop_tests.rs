use std::sync::Arc;

use proptest::prelude::*;

use wdoi_ledger::BalanceLedger;
use wdoi_nullables::{NullClock, NullStore};
use wdoi_pool::math::{get_amount_out, product_le};
use wdoi_pool::{LiquidityPool, PoolConfig};
use wdoi_types::{AccountId, TokenId, TokenSpec};

fn pool_with_funds(funds: u128) -> (Arc<BalanceLedger>, LiquidityPool) {
    let store = Arc::new(NullStore::new());
    let mut ledger = BalanceLedger::open(store.clone()).unwrap();
    for (id, decimals) in [("wDOI", 18), ("USDT", 6), ("LP", 18)] {
        ledger.register_token(TokenSpec::new(id, decimals)).unwrap();
    }
    let pool_cap = ledger
        .issue_supply_capability("pool", &[TokenId::new("LP")])
        .unwrap();
    let faucet = ledger
        .issue_supply_capability("faucet", &[TokenId::new("wDOI"), TokenId::new("USDT")])
        .unwrap();
    let ledger = Arc::new(ledger);
    for who in ["lp", "trader"] {
        for token in ["wDOI", "USDT"] {
            ledger
                .mint(&faucet, &TokenId::new(token), &AccountId::new(who), funds)
                .unwrap();
        }
    }
    let pool = LiquidityPool::open(
        PoolConfig {
            admin: AccountId::new("admin"),
            wrapped: TokenId::new("wDOI"),
            stable: TokenId::new("USDT"),
            share: TokenId::new("LP"),
            fee_bps: 30,
        },
        Arc::clone(&ledger),
        pool_cap,
        store,
        Arc::new(NullClock::default()),
    )
    .unwrap();
    (ledger, pool)
}

#[derive(Clone, Debug)]
enum Op {
    SwapWrapped(u128),
    SwapStable(u128),
    Add(u128, u128),
    Remove(u128),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u128..100_000).prop_map(Op::SwapWrapped),
        (1u128..100_000).prop_map(Op::SwapStable),
        (1u128..100_000, 1u128..100_000).prop_map(|(w, s)| Op::Add(w, s)),
        (1u128..50_000).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn zero_input_gives_zero_output(
        r_in in 1u128..u64::MAX as u128,
        r_out in 1u128..u64::MAX as u128,
        fee in 0u16..=1000,
    ) {
        prop_assert_eq!(get_amount_out(0, r_in, r_out, fee).unwrap(), 0);
    }

    #[test]
    fn amount_out_is_monotonic(
        a in 0u128..1_000_000_000_000,
        b in 0u128..1_000_000_000_000,
        r_in in 1u128..1_000_000_000_000_000,
        r_out in 1u128..1_000_000_000_000_000,
        fee in 0u16..=1000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let out_lo = get_amount_out(lo, r_in, r_out, fee).unwrap();
        let out_hi = get_amount_out(hi, r_in, r_out, fee).unwrap();
        prop_assert!(out_lo <= out_hi);
        prop_assert!(out_hi < r_out);
    }

    /// Swaps and deposits never shrink the reserve product; withdrawals
    /// shrink it no more than proportionally. Reserves always match the
    /// pool account's ledger balances and shares match the share supply.
    #[test]
    fn reserves_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let (ledger, pool) = pool_with_funds(10_000_000);
        let lp = AccountId::new("lp");
        let trader = AccountId::new("trader");
        pool.add_liquidity(&lp, 200_000, 300_000, 0, 0).unwrap();

        for op in ops {
            let before = pool.state();
            let result = match op {
                Op::SwapWrapped(x) => pool.swap_wrapped_for_stable(&trader, x, 0).map(|_| ()),
                Op::SwapStable(x) => pool.swap_stable_for_wrapped(&trader, x, 0).map(|_| ()),
                Op::Add(w, s) => pool.add_liquidity(&lp, w, s, 0, 0).map(|_| ()),
                Op::Remove(shares) => pool.remove_liquidity(&lp, shares, 0, 0).map(|_| ()),
            };
            let after = pool.state();
            if result.is_err() {
                prop_assert_eq!(&after, &before);
                continue;
            }
            let k_before = (before.reserve_wrapped, before.reserve_stable);
            let k_after = (after.reserve_wrapped, after.reserve_stable);
            match op {
                Op::Remove(_) => {
                    prop_assert!(after.share_supply < before.share_supply);
                    prop_assert!(after.reserve_wrapped <= before.reserve_wrapped);
                    prop_assert!(after.reserve_stable <= before.reserve_stable);
                }
                _ => prop_assert!(product_le(k_before, k_after)),
            }

            prop_assert_eq!(
                ledger.balance_of(&TokenId::new("wDOI"), pool.account()).unwrap(),
                after.reserve_wrapped
            );
            prop_assert_eq!(
                ledger.balance_of(&TokenId::new("USDT"), pool.account()).unwrap(),
                after.reserve_stable
            );
            prop_assert_eq!(ledger.total_supply(&TokenId::new("LP")).unwrap(), after.share_supply);
        }
        prop_assert!(ledger.verify_supply().is_ok());
    }

    /// Depositing then immediately withdrawing the minted shares never
    /// returns more than was put in.
    #[test]
    fn add_then_remove_never_profits(
        seed_w in 1_000u128..1_000_000,
        seed_s in 1_000u128..1_000_000,
        w in 1u128..1_000_000,
        s in 1u128..1_000_000,
    ) {
        let (_ledger, pool) = pool_with_funds(10_000_000);
        pool.add_liquidity(&AccountId::new("lp"), seed_w, seed_s, 0, 0).unwrap();

        let trader = AccountId::new("trader");
        if let Ok(added) = pool.add_liquidity(&trader, w, s, 0, 0) {
            let removed = pool.remove_liquidity(&trader, added.shares, 0, 0).unwrap();
            prop_assert!(removed.wrapped <= added.wrapped);
            prop_assert!(removed.stable <= added.stable);
        }
    }
}
