//! The wrapped/stable liquidity pool.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use wdoi_ledger::{BalanceLedger, SupplyCapability};
use wdoi_store::{decode, StateStore, Table};
use wdoi_types::{AccountId, Clock, TokenId, Timestamp};
use wdoi_utils::EventBus;

use crate::math::{self, MAX_FEE_BPS};
use crate::{PoolError, PoolEvent};

type Blake2b256 = Blake2b<U32>;

/// Deterministic pool identity: Blake2b-256 of the token pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId([u8; 32]);

impl PoolId {
    pub fn derive(wrapped: &TokenId, stable: &TokenId) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(b"wdoi-pool");
        hasher.update(wrapped.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(stable.as_str().as_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Ledger account holding the pool's reserves.
    pub fn reserve_account(&self) -> AccountId {
        AccountId::new(format!("pool:{}", &self.to_hex()[..16]))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Persisted reserve state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub reserve_wrapped: u128,
    pub reserve_stable: u128,
    pub share_supply: u128,
    pub fee_bps: u16,
    /// Clock time of the last mutation.
    pub updated_at: Timestamp,
    /// Incremented by every mutation.
    pub sequence: u64,
}

impl PoolState {
    pub fn is_empty(&self) -> bool {
        self.share_supply == 0 || self.reserve_wrapped == 0 || self.reserve_stable == 0
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.sequence += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    WrappedToStable,
    StableToWrapped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SwapOutcome {
    pub token_in: TokenId,
    pub amount_in: u128,
    pub token_out: TokenId,
    pub amount_out: u128,
}

/// Amounts actually moved by a liquidity change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LiquidityOutcome {
    pub wrapped: u128,
    pub stable: u128,
    pub shares: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    pub id: String,
    pub account: AccountId,
    pub wrapped: TokenId,
    pub stable: TokenId,
    pub share: TokenId,
    pub reserve_wrapped: u128,
    pub reserve_stable: u128,
    pub share_supply: u128,
    /// Stable per wrapped, 18-decimal fixed point; `None` while empty.
    pub price: Option<u128>,
    pub fee_bps: u16,
    pub updated_at: Timestamp,
    pub sequence: u64,
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub admin: AccountId,
    pub wrapped: TokenId,
    pub stable: TokenId,
    pub share: TokenId,
    /// Fee for a freshly created pool; a persisted fee takes precedence.
    pub fee_bps: u16,
}

pub struct LiquidityPool {
    id: PoolId,
    account: AccountId,
    admin: AccountId,
    wrapped: TokenId,
    stable: TokenId,
    share: TokenId,
    wrapped_decimals: u8,
    stable_decimals: u8,
    ledger: Arc<BalanceLedger>,
    capability: SupplyCapability,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState>,
    events: EventBus<PoolEvent>,
}

impl LiquidityPool {
    /// Open the pool for the configured pair, loading its reserve row if one
    /// exists. `capability` must cover the share token.
    pub fn open(
        config: PoolConfig,
        ledger: Arc<BalanceLedger>,
        capability: SupplyCapability,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError> {
        if config.fee_bps > MAX_FEE_BPS {
            return Err(PoolError::InvalidFee(config.fee_bps));
        }
        let wrapped_decimals = ledger.token(&config.wrapped)?.decimals;
        let stable_decimals = ledger.token(&config.stable)?.decimals;
        ledger.token(&config.share)?;

        let id = PoolId::derive(&config.wrapped, &config.stable);
        let state = match store.get(Table::Pools, id.as_bytes())? {
            Some(bytes) => decode::<PoolState>(&bytes)?,
            None => PoolState {
                fee_bps: config.fee_bps,
                ..PoolState::default()
            },
        };

        let share_supply = ledger.total_supply(&config.share)?;
        if share_supply != state.share_supply {
            tracing::warn!(
                pool = %id,
                recorded = state.share_supply,
                ledger = share_supply,
                "pool share supply differs from the ledger"
            );
        }

        let account = id.reserve_account();
        tracing::info!(
            pool = %id,
            %account,
            reserve_wrapped = state.reserve_wrapped,
            reserve_stable = state.reserve_stable,
            fee_bps = state.fee_bps,
            "liquidity pool loaded"
        );

        Ok(Self {
            id,
            account,
            admin: config.admin,
            wrapped: config.wrapped,
            stable: config.stable,
            share: config.share,
            wrapped_decimals,
            stable_decimals,
            ledger,
            capability,
            clock,
            state: Mutex::new(state),
            events: EventBus::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `next` together with the staged token movements, then install
    /// it as the current state.
    fn commit<F>(&self, state: &mut PoolState, next: PoolState, moves: F) -> Result<(), PoolError>
    where
        F: FnOnce(&mut wdoi_ledger::LedgerTxn<'_>) -> Result<(), PoolError>,
    {
        self.ledger.transact(|txn| -> Result<(), PoolError> {
            moves(txn)?;
            txn.batch_mut()
                .put_encoded(Table::Pools, self.id.as_bytes().to_vec(), &next)?;
            Ok(())
        })?;
        *state = next;
        Ok(())
    }

    // ── Swaps ───────────────────────────────────────────────────────────

    pub fn swap_wrapped_for_stable(
        &self,
        trader: &AccountId,
        amount_in: u128,
        min_amount_out: u128,
    ) -> Result<SwapOutcome, PoolError> {
        self.swap(trader, SwapDirection::WrappedToStable, amount_in, min_amount_out)
    }

    pub fn swap_stable_for_wrapped(
        &self,
        trader: &AccountId,
        amount_in: u128,
        min_amount_out: u128,
    ) -> Result<SwapOutcome, PoolError> {
        self.swap(trader, SwapDirection::StableToWrapped, amount_in, min_amount_out)
    }

    pub fn swap(
        &self,
        trader: &AccountId,
        direction: SwapDirection,
        amount_in: u128,
        min_amount_out: u128,
    ) -> Result<SwapOutcome, PoolError> {
        if amount_in == 0 {
            return Err(PoolError::InvalidAmount("swap input must be positive".into()));
        }

        let mut state = self.lock_state();
        if state.is_empty() {
            return Err(PoolError::InvalidReserves);
        }
        let (token_in, token_out, reserve_in, reserve_out) = match direction {
            SwapDirection::WrappedToStable => {
                (&self.wrapped, &self.stable, state.reserve_wrapped, state.reserve_stable)
            }
            SwapDirection::StableToWrapped => {
                (&self.stable, &self.wrapped, state.reserve_stable, state.reserve_wrapped)
            }
        };

        let amount_out = math::get_amount_out(amount_in, reserve_in, reserve_out, state.fee_bps)?;
        if amount_out == 0 {
            return Err(PoolError::InvalidAmount("swap output rounds to zero".into()));
        }
        if amount_out < min_amount_out {
            return Err(PoolError::SlippageExceeded {
                minimum: min_amount_out,
                actual: amount_out,
            });
        }

        let new_in = reserve_in
            .checked_add(amount_in)
            .ok_or_else(|| PoolError::InvalidAmount("reserve overflow".into()))?;
        let new_out = reserve_out - amount_out;
        let mut next = state.clone();
        match direction {
            SwapDirection::WrappedToStable => {
                next.reserve_wrapped = new_in;
                next.reserve_stable = new_out;
            }
            SwapDirection::StableToWrapped => {
                next.reserve_stable = new_in;
                next.reserve_wrapped = new_out;
            }
        }
        next.touch(self.clock.now());
        debug_assert!(math::product_le(
            (state.reserve_wrapped, state.reserve_stable),
            (next.reserve_wrapped, next.reserve_stable)
        ));

        self.commit(&mut state, next, |txn| {
            txn.transfer(token_in, trader, &self.account, amount_in)?;
            txn.transfer(token_out, &self.account, trader, amount_out)?;
            Ok(())
        })?;
        drop(state);

        tracing::info!(
            pool = %self.id,
            %trader,
            token_in = %token_in,
            amount_in,
            token_out = %token_out,
            amount_out,
            "swap executed"
        );
        let outcome = SwapOutcome {
            token_in: token_in.clone(),
            amount_in,
            token_out: token_out.clone(),
            amount_out,
        };
        self.events.emit(&PoolEvent::Swap {
            trader: trader.clone(),
            token_in: outcome.token_in.clone(),
            amount_in,
            token_out: outcome.token_out.clone(),
            amount_out,
        });
        Ok(outcome)
    }

    // ── Liquidity ───────────────────────────────────────────────────────

    /// Deposit up to the desired amounts at the current ratio and mint
    /// shares. The first deposit sets the ratio and mints
    /// `sqrt(wrapped * stable)` shares.
    pub fn add_liquidity(
        &self,
        provider: &AccountId,
        wrapped_desired: u128,
        stable_desired: u128,
        min_wrapped: u128,
        min_stable: u128,
    ) -> Result<LiquidityOutcome, PoolError> {
        if wrapped_desired == 0 || stable_desired == 0 {
            return Err(PoolError::InvalidAmount("both deposit amounts must be positive".into()));
        }

        let mut state = self.lock_state();
        let (wrapped, stable, shares) = if state.is_empty() {
            let shares = math::sqrt_product(wrapped_desired, stable_desired);
            (wrapped_desired, stable_desired, shares)
        } else {
            let stable_optimal =
                math::quote(wrapped_desired, state.reserve_wrapped, state.reserve_stable)?;
            let (wrapped, stable) = if stable_optimal <= stable_desired {
                (wrapped_desired, stable_optimal)
            } else {
                let wrapped_optimal =
                    math::quote(stable_desired, state.reserve_stable, state.reserve_wrapped)?;
                (wrapped_optimal.min(wrapped_desired), stable_desired)
            };
            let shares = math::mul_div(wrapped, state.share_supply, state.reserve_wrapped)?
                .min(math::mul_div(stable, state.share_supply, state.reserve_stable)?);
            (wrapped, stable, shares)
        };

        if wrapped < min_wrapped {
            return Err(PoolError::SlippageExceeded {
                minimum: min_wrapped,
                actual: wrapped,
            });
        }
        if stable < min_stable {
            return Err(PoolError::SlippageExceeded {
                minimum: min_stable,
                actual: stable,
            });
        }
        if wrapped == 0 || stable == 0 || shares == 0 {
            return Err(PoolError::InvalidAmount("deposit too small to mint shares".into()));
        }

        let overflow = || PoolError::InvalidAmount("reserve overflow".into());
        let mut next = if state.is_empty() {
            // A fully withdrawn pool keeps only its fee and sequence.
            PoolState {
                fee_bps: state.fee_bps,
                sequence: state.sequence,
                ..PoolState::default()
            }
        } else {
            state.clone()
        };
        next.reserve_wrapped = next.reserve_wrapped.checked_add(wrapped).ok_or_else(overflow)?;
        next.reserve_stable = next.reserve_stable.checked_add(stable).ok_or_else(overflow)?;
        next.share_supply = next.share_supply.checked_add(shares).ok_or_else(overflow)?;
        next.touch(self.clock.now());

        self.commit(&mut state, next, |txn| {
            txn.transfer(&self.wrapped, provider, &self.account, wrapped)?;
            txn.transfer(&self.stable, provider, &self.account, stable)?;
            txn.mint(&self.capability, &self.share, provider, shares)?;
            Ok(())
        })?;
        drop(state);

        tracing::info!(pool = %self.id, %provider, wrapped, stable, shares, "liquidity added");
        self.events.emit(&PoolEvent::LiquidityAdded {
            provider: provider.clone(),
            wrapped,
            stable,
            shares,
        });
        Ok(LiquidityOutcome {
            wrapped,
            stable,
            shares,
        })
    }

    /// Burn `shares` and pay out the pro-rata part of both reserves.
    pub fn remove_liquidity(
        &self,
        provider: &AccountId,
        shares: u128,
        min_wrapped: u128,
        min_stable: u128,
    ) -> Result<LiquidityOutcome, PoolError> {
        if shares == 0 {
            return Err(PoolError::InvalidAmount("share amount must be positive".into()));
        }

        let mut state = self.lock_state();
        if state.share_supply == 0 {
            return Err(PoolError::InvalidReserves);
        }
        let held = self.ledger.balance_of(&self.share, provider)?;
        if held < shares {
            return Err(PoolError::InsufficientBalance {
                token: self.share.clone(),
                account: provider.clone(),
                needed: shares,
                available: held,
            });
        }

        let wrapped = math::mul_div(shares, state.reserve_wrapped, state.share_supply)?;
        let stable = math::mul_div(shares, state.reserve_stable, state.share_supply)?;
        if wrapped < min_wrapped {
            return Err(PoolError::SlippageExceeded {
                minimum: min_wrapped,
                actual: wrapped,
            });
        }
        if stable < min_stable {
            return Err(PoolError::SlippageExceeded {
                minimum: min_stable,
                actual: stable,
            });
        }
        if wrapped == 0 && stable == 0 {
            return Err(PoolError::InvalidAmount("withdrawal too small to pay out".into()));
        }

        let mut next = state.clone();
        next.reserve_wrapped -= wrapped;
        next.reserve_stable -= stable;
        next.share_supply -= shares;
        next.touch(self.clock.now());

        self.commit(&mut state, next, |txn| {
            txn.burn(&self.capability, &self.share, provider, shares)?;
            if wrapped > 0 {
                txn.transfer(&self.wrapped, &self.account, provider, wrapped)?;
            }
            if stable > 0 {
                txn.transfer(&self.stable, &self.account, provider, stable)?;
            }
            Ok(())
        })?;
        drop(state);

        tracing::info!(pool = %self.id, %provider, wrapped, stable, shares, "liquidity removed");
        self.events.emit(&PoolEvent::LiquidityRemoved {
            provider: provider.clone(),
            wrapped,
            stable,
            shares,
        });
        Ok(LiquidityOutcome {
            wrapped,
            stable,
            shares,
        })
    }

    // ── Administration ──────────────────────────────────────────────────

    /// Change the swap fee. Returns the previous fee.
    pub fn set_fee_bps(&self, caller: &AccountId, fee_bps: u16) -> Result<u16, PoolError> {
        if *caller != self.admin {
            return Err(PoolError::Unauthorized {
                caller: caller.clone(),
                action: "change the pool fee",
            });
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(PoolError::InvalidFee(fee_bps));
        }

        let mut state = self.lock_state();
        let old = state.fee_bps;
        let mut next = state.clone();
        next.fee_bps = fee_bps;
        next.touch(self.clock.now());
        self.commit(&mut state, next, |_| Ok(()))?;
        drop(state);

        tracing::info!(pool = %self.id, old_bps = old, new_bps = fee_bps, "pool fee changed");
        self.events.emit(&PoolEvent::FeeChanged {
            old_bps: old,
            new_bps: fee_bps,
        });
        Ok(old)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn state(&self) -> PoolState {
        self.lock_state().clone()
    }

    pub fn get_pool_info(&self) -> PoolInfo {
        let state = self.state();
        let price = math::price(
            state.reserve_wrapped,
            state.reserve_stable,
            self.wrapped_decimals,
            self.stable_decimals,
        )
        .ok();
        PoolInfo {
            id: self.id.to_hex(),
            account: self.account.clone(),
            wrapped: self.wrapped.clone(),
            stable: self.stable.clone(),
            share: self.share.clone(),
            reserve_wrapped: state.reserve_wrapped,
            reserve_stable: state.reserve_stable,
            share_supply: state.share_supply,
            price,
            fee_bps: state.fee_bps,
            updated_at: state.updated_at,
            sequence: state.sequence,
        }
    }

    /// Stable per whole wrapped token, 18-decimal fixed point.
    pub fn wrapped_price(&self) -> Result<u128, PoolError> {
        let state = self.state();
        math::price(
            state.reserve_wrapped,
            state.reserve_stable,
            self.wrapped_decimals,
            self.stable_decimals,
        )
    }

    /// Output a swap of `amount_in` would produce against current reserves.
    pub fn get_amount_out(
        &self,
        direction: SwapDirection,
        amount_in: u128,
    ) -> Result<u128, PoolError> {
        let state = self.state();
        let (reserve_in, reserve_out) = match direction {
            SwapDirection::WrappedToStable => (state.reserve_wrapped, state.reserve_stable),
            SwapDirection::StableToWrapped => (state.reserve_stable, state.reserve_wrapped),
        };
        math::get_amount_out(amount_in, reserve_in, reserve_out, state.fee_bps)
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn share_token(&self) -> &TokenId {
        &self.share
    }

    pub fn subscribe(&self, listener: impl Fn(&PoolEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdoi_nullables::{NullClock, NullStore};
    use wdoi_types::TokenSpec;

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    fn wdoi() -> TokenId {
        TokenId::new("wDOI")
    }

    fn usdt() -> TokenId {
        TokenId::new("USDT")
    }

    fn lp() -> TokenId {
        TokenId::new("wDOI-USDT-LP")
    }

    struct Fixture {
        store: Arc<NullStore>,
        clock: Arc<NullClock>,
        ledger: Arc<BalanceLedger>,
        pool: LiquidityPool,
    }

    fn open(store: Arc<NullStore>, fee_bps: u16) -> Fixture {
        let mut ledger = BalanceLedger::open(store.clone()).unwrap();
        ledger.register_token(TokenSpec::new("wDOI", 18)).unwrap();
        ledger.register_token(TokenSpec::new("USDT", 6)).unwrap();
        ledger.register_token(TokenSpec::new("wDOI-USDT-LP", 18)).unwrap();
        let pool_cap = ledger.issue_supply_capability("pool", &[lp()]).unwrap();
        let faucet = ledger.issue_supply_capability("faucet", &[wdoi(), usdt()]).unwrap();
        let ledger = Arc::new(ledger);
        for who in ["alice", "bob"] {
            if ledger.balance_of(&wdoi(), &acct(who)).unwrap() == 0 {
                ledger.mint(&faucet, &wdoi(), &acct(who), 1_000_000).unwrap();
                ledger.mint(&faucet, &usdt(), &acct(who), 1_000_000).unwrap();
            }
        }
        let clock = Arc::new(NullClock::default());
        let pool = LiquidityPool::open(
            PoolConfig {
                admin: acct("admin"),
                wrapped: wdoi(),
                stable: usdt(),
                share: lp(),
                fee_bps,
            },
            Arc::clone(&ledger),
            pool_cap,
            store.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            store,
            clock,
            ledger,
            pool,
        }
    }

    fn seeded(fee_bps: u16) -> Fixture {
        let f = open(Arc::new(NullStore::new()), fee_bps);
        f.pool.add_liquidity(&acct("alice"), 1000, 1000, 0, 0).unwrap();
        f
    }

    fn bal(f: &Fixture, token: TokenId, who: &str) -> u128 {
        f.ledger.balance_of(&token, &acct(who)).unwrap()
    }

    #[test]
    fn pool_id_is_deterministic() {
        let a = PoolId::derive(&wdoi(), &usdt());
        assert_eq!(a, PoolId::derive(&wdoi(), &usdt()));
        assert_ne!(a, PoolId::derive(&usdt(), &wdoi()));
        assert!(a.reserve_account().as_str().starts_with("pool:"));
        assert_eq!(a.reserve_account().as_str().len(), 5 + 16);
    }

    #[test]
    fn worked_example_swap() {
        let f = seeded(30);
        let before = f.pool.state();
        let out = f.pool.swap_stable_for_wrapped(&acct("bob"), 100, 0).unwrap();
        assert_eq!(out.amount_out, 90);

        let after = f.pool.state();
        assert_eq!((after.reserve_wrapped, after.reserve_stable), (910, 1100));
        assert!(math::product_le(
            (before.reserve_wrapped, before.reserve_stable),
            (after.reserve_wrapped, after.reserve_stable)
        ));
        assert_eq!(bal(&f, wdoi(), "bob"), 1_000_090);
        assert_eq!(bal(&f, usdt(), "bob"), 999_900);
        assert_eq!(f.ledger.balance_of(&wdoi(), f.pool.account()).unwrap(), 910);
        assert_eq!(after.sequence, before.sequence + 1);
    }

    #[test]
    fn swap_guards() {
        let empty = open(Arc::new(NullStore::new()), 30);
        assert!(matches!(
            empty.pool.swap_wrapped_for_stable(&acct("bob"), 10, 0),
            Err(PoolError::InvalidReserves)
        ));

        let f = seeded(30);
        assert!(matches!(
            f.pool.swap_wrapped_for_stable(&acct("bob"), 0, 0),
            Err(PoolError::InvalidAmount(_))
        ));
        // 1 in yields 0 out at these reserves.
        assert!(matches!(
            f.pool.swap_wrapped_for_stable(&acct("bob"), 1, 0),
            Err(PoolError::InvalidAmount(_))
        ));
        assert!(matches!(
            f.pool.swap_wrapped_for_stable(&acct("bob"), 100, 91),
            Err(PoolError::SlippageExceeded { minimum: 91, actual: 90 })
        ));
        assert!(matches!(
            f.pool.swap_wrapped_for_stable(&acct("carol"), 100, 0),
            Err(PoolError::InsufficientBalance { .. })
        ));
        // Nothing moved.
        assert_eq!(f.pool.state().reserve_wrapped, 1000);
        assert_eq!(bal(&f, wdoi(), "bob"), 1_000_000);
    }

    #[test]
    fn huge_swap_never_drains_reserve() {
        let f = seeded(30);
        let out = f.pool.swap_wrapped_for_stable(&acct("bob"), 1_000_000, 0).unwrap();
        assert!(out.amount_out < 1000);
        assert!(f.pool.state().reserve_stable > 0);
    }

    #[test]
    fn first_deposit_mints_geometric_mean() {
        let f = open(Arc::new(NullStore::new()), 30);
        let outcome = f.pool.add_liquidity(&acct("alice"), 400, 900, 400, 900).unwrap();
        assert_eq!(outcome.shares, 600);
        assert_eq!(bal(&f, lp(), "alice"), 600);
        assert_eq!(f.pool.state().share_supply, 600);
        assert_eq!(f.ledger.total_supply(&lp()).unwrap(), 600);
    }

    #[test]
    fn later_deposit_follows_ratio() {
        let f = seeded(30);
        // Pool is 1:1; bob offers 100 wDOI and up to 300 USDT.
        let outcome = f.pool.add_liquidity(&acct("bob"), 100, 300, 0, 0).unwrap();
        assert_eq!((outcome.wrapped, outcome.stable, outcome.shares), (100, 100, 100));

        // Stable side is the binding one here.
        let outcome = f.pool.add_liquidity(&acct("bob"), 500, 50, 0, 0).unwrap();
        assert_eq!((outcome.wrapped, outcome.stable), (50, 50));

        assert!(matches!(
            f.pool.add_liquidity(&acct("bob"), 100, 300, 0, 101),
            Err(PoolError::SlippageExceeded { minimum: 101, actual: 100 })
        ));
        assert!(matches!(
            f.pool.add_liquidity(&acct("bob"), 0, 300, 0, 0),
            Err(PoolError::InvalidAmount(_))
        ));
    }

    #[test]
    fn remove_liquidity_pays_pro_rata() {
        let f = seeded(30);
        let outcome = f.pool.remove_liquidity(&acct("alice"), 250, 0, 0).unwrap();
        assert_eq!((outcome.wrapped, outcome.stable), (250, 250));
        assert_eq!(f.pool.state().share_supply, 750);

        assert!(matches!(
            f.pool.remove_liquidity(&acct("alice"), 250, 251, 0),
            Err(PoolError::SlippageExceeded { .. })
        ));
        assert!(matches!(
            f.pool.remove_liquidity(&acct("bob"), 1, 0, 0),
            Err(PoolError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn full_withdrawal_empties_pool_and_allows_fresh_start() {
        let f = seeded(30);
        f.pool.swap_wrapped_for_stable(&acct("bob"), 100, 0).unwrap();
        f.pool.remove_liquidity(&acct("alice"), 1000, 0, 0).unwrap();

        let state = f.pool.state();
        assert_eq!((state.reserve_wrapped, state.reserve_stable, state.share_supply), (0, 0, 0));
        assert_eq!(f.ledger.balance_of(&wdoi(), f.pool.account()).unwrap(), 0);
        assert!(f.pool.get_pool_info().price.is_none());
        assert!(matches!(f.pool.wrapped_price(), Err(PoolError::InvalidReserves)));

        let outcome = f.pool.add_liquidity(&acct("bob"), 10, 40, 0, 0).unwrap();
        assert_eq!(outcome.shares, 20);
    }

    #[test]
    fn fee_changes_are_admin_only_and_bounded() {
        let f = seeded(30);
        assert!(matches!(
            f.pool.set_fee_bps(&acct("bob"), 10),
            Err(PoolError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.pool.set_fee_bps(&acct("admin"), 1001),
            Err(PoolError::InvalidFee(1001))
        ));
        assert_eq!(f.pool.set_fee_bps(&acct("admin"), 0).unwrap(), 30);
        // Fee-free: (1000, 1000) with 1000 in gives exactly 500.
        let out = f.pool.swap_wrapped_for_stable(&acct("bob"), 1000, 0).unwrap();
        assert_eq!(out.amount_out, 500);
    }

    #[test]
    fn failed_commit_changes_nothing() {
        let f = seeded(30);
        f.store.fail_next_commits(1);
        assert!(f.pool.swap_stable_for_wrapped(&acct("bob"), 100, 0).is_err());
        assert_eq!(f.pool.state().reserve_stable, 1000);
        assert_eq!(bal(&f, usdt(), "bob"), 1_000_000);
    }

    #[test]
    fn state_survives_reopen() {
        let f = seeded(30);
        f.clock.advance(60);
        f.pool.swap_stable_for_wrapped(&acct("bob"), 100, 0).unwrap();
        f.pool.set_fee_bps(&acct("admin"), 50).unwrap();
        let before = f.pool.get_pool_info();
        let store = f.store.clone();
        drop(f);

        let g = open(store, 30);
        let after = g.pool.get_pool_info();
        assert_eq!(after, before);
        assert_eq!(after.fee_bps, 50);
    }

    #[test]
    fn price_reflects_decimals() {
        let f = open(Arc::new(NullStore::new()), 30);
        // 10^6 raw wDOI is 10^-12 wDOI; 500_000 raw USDT is 0.5 USDT.
        f.pool.add_liquidity(&acct("alice"), 1_000_000, 500_000, 0, 0).unwrap();
        let expected = 500_000_000_000 * math::PRICE_PRECISION;
        assert_eq!(f.pool.wrapped_price().unwrap(), expected);
        assert_eq!(f.pool.get_pool_info().price, Some(expected));
    }

    #[test]
    fn concurrent_swaps_each_see_fresh_reserves() {
        const THREADS: usize = 8;
        const SWAPS: usize = 5;
        const AMOUNT: u128 = 1_000;

        let f = open(Arc::new(NullStore::new()), 30);
        f.pool.add_liquidity(&acct("alice"), 100_000, 100_000, 0, 0).unwrap();
        let start = f.pool.state();

        let outputs: Vec<u128> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let pool = &f.pool;
                    let trader = acct(if i % 2 == 0 { "alice" } else { "bob" });
                    s.spawn(move || {
                        (0..SWAPS)
                            .map(|_| {
                                pool.swap_wrapped_for_stable(&trader, AMOUNT, 1)
                                    .unwrap()
                                    .amount_out
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        // Identical swaps make the sequential fold order-independent.
        let (mut reserve_in, mut reserve_out) = (start.reserve_wrapped, start.reserve_stable);
        let mut expected = Vec::new();
        for _ in 0..THREADS * SWAPS {
            let out = math::get_amount_out(AMOUNT, reserve_in, reserve_out, 30).unwrap();
            reserve_in += AMOUNT;
            reserve_out -= out;
            expected.push(out);
        }
        let mut reported = outputs;
        reported.sort_unstable();
        expected.sort_unstable();
        assert_eq!(reported, expected);

        let end = f.pool.state();
        assert_eq!((end.reserve_wrapped, end.reserve_stable), (reserve_in, reserve_out));
        assert_eq!(end.sequence, start.sequence + (THREADS * SWAPS) as u64);
        assert_eq!(f.ledger.balance_of(&wdoi(), f.pool.account()).unwrap(), reserve_in);
        assert_eq!(f.ledger.balance_of(&usdt(), f.pool.account()).unwrap(), reserve_out);
        f.ledger.verify_supply().unwrap();
    }
}
