//! The balance ledger and its atomic commit path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wdoi_store::{decode, encode, StateStore, StoreError, Table, WriteBatch};
use wdoi_types::{AccountId, TokenId, TokenSpec};
use wdoi_utils::EventBus;

use crate::txn::StagedChanges;
use crate::{LedgerError, LedgerEvent, LedgerTxn, SupplyCapability};

static NEXT_LEDGER_ID: AtomicU64 = AtomicU64::new(1);

/// Committed ledger state. Only mutated after the store accepted a batch.
#[derive(Default)]
pub(crate) struct LedgerState {
    pub(crate) tokens: BTreeMap<TokenId, TokenSpec>,
    balances: HashMap<TokenId, BTreeMap<AccountId, u128>>,
    supplies: HashMap<TokenId, u128>,
    commits: u64,
}

impl LedgerState {
    pub(crate) fn balance(&self, token: &TokenId, account: &AccountId) -> u128 {
        self.balances
            .get(token)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn supply(&self, token: &TokenId) -> u128 {
        self.supplies.get(token).copied().unwrap_or(0)
    }

    fn apply(
        &mut self,
        balances: BTreeMap<(TokenId, AccountId), u128>,
        supplies: BTreeMap<TokenId, u128>,
    ) {
        for ((token, account), amount) in balances {
            let accounts = self.balances.entry(token).or_default();
            if amount == 0 {
                accounts.remove(&account);
            } else {
                accounts.insert(account, amount);
            }
        }
        self.supplies.extend(supplies);
    }
}

/// Per-token balances with atomic, durable mutation.
///
/// All mutations are serialized through one internal lock and committed to
/// the [`StateStore`] before they become visible. Events are published after
/// the commit, outside the lock.
pub struct BalanceLedger {
    id: u64,
    state: Mutex<LedgerState>,
    store: Arc<dyn StateStore>,
    events: EventBus<LedgerEvent>,
}

impl BalanceLedger {
    /// Load the ledger from `store` (empty on a fresh store).
    pub fn open(store: Arc<dyn StateStore>) -> Result<Self, LedgerError> {
        let mut state = LedgerState::default();

        for (_, bytes) in store.scan(Table::Tokens)? {
            let spec: TokenSpec = decode(&bytes)?;
            state.tokens.insert(spec.id.clone(), spec);
        }
        for (key, bytes) in store.scan(Table::Balances)? {
            let (token, account): (TokenId, AccountId) = decode(&key)?;
            let amount: u128 = decode(&bytes)?;
            state.balances.entry(token).or_default().insert(account, amount);
        }
        for (key, bytes) in store.scan(Table::Supplies)? {
            let token = String::from_utf8(key)
                .map_err(|e| StoreError::Corruption(format!("supply key: {}", e)))?;
            let supply: u128 = decode(&bytes)?;
            state.supplies.insert(TokenId::new(token), supply);
        }

        tracing::info!(tokens = state.tokens.len(), "balance ledger loaded");
        Ok(Self {
            id: NEXT_LEDGER_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(state),
            store,
            events: EventBus::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a token and its precision. Registering an identical spec
    /// again is a no-op.
    pub fn register_token(&self, spec: TokenSpec) -> Result<(), LedgerError> {
        if !spec.id.is_valid() {
            return Err(LedgerError::InvalidToken(format!("malformed id '{}'", spec.id)));
        }
        if spec.decimals > TokenSpec::MAX_DECIMALS {
            return Err(LedgerError::InvalidToken(format!(
                "{} decimals exceeds the maximum of {}",
                spec.decimals,
                TokenSpec::MAX_DECIMALS
            )));
        }

        let mut state = self.lock_state();
        if let Some(existing) = state.tokens.get(&spec.id) {
            if existing.decimals == spec.decimals {
                return Ok(());
            }
            return Err(LedgerError::TokenMismatch {
                token: spec.id.clone(),
                existing: existing.decimals,
                requested: spec.decimals,
            });
        }

        let mut batch = WriteBatch::new();
        batch.put(Table::Tokens, spec.id.as_str().as_bytes(), encode(&spec)?);
        self.store.commit(batch)?;
        tracing::info!(token = %spec.id, decimals = spec.decimals, "registered token");
        state.tokens.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Issue a capability to mint and burn `tokens`.
    ///
    /// Requires `&mut self`: capabilities are handed out while the ledger is
    /// wired up, before it is shared behind an `Arc`.
    pub fn issue_supply_capability(
        &mut self,
        holder: impl Into<String>,
        tokens: &[TokenId],
    ) -> Result<SupplyCapability, LedgerError> {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for token in tokens {
            if !state.tokens.contains_key(token) {
                return Err(LedgerError::TokenNotFound(token.clone()));
            }
        }
        let holder = holder.into();
        tracing::debug!(%holder, ?tokens, "issued supply capability");
        Ok(SupplyCapability::new(
            self.id,
            holder,
            tokens.iter().cloned().collect::<BTreeSet<_>>(),
        ))
    }

    /// Run `f` as one atomic unit.
    ///
    /// `f` stages balance changes (and optionally extra rows via
    /// [`LedgerTxn::batch_mut`]). If `f` returns `Err`, or the store rejects
    /// the batch, nothing is applied and no event is published. Events are
    /// published after the lock is released and carry the commit position
    /// in [`LedgerEvent::commit`].
    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut LedgerTxn<'_>) -> Result<T, E>,
        E: From<LedgerError>,
    {
        let mut state = self.lock_state();
        let mut txn = LedgerTxn::new(self.id, &state);
        let value = f(&mut txn)?;
        let StagedChanges {
            balances,
            supplies,
            batch,
            mut events,
        } = txn.finish()?;

        self.store.commit(batch).map_err(LedgerError::from)?;
        state.apply(balances, supplies);
        state.commits += 1;
        for event in &mut events {
            event.commit = state.commits;
        }
        drop(state);

        tracing::debug!(movements = events.len(), "ledger transaction committed");
        self.events.emit_all(&events);
        Ok(value)
    }

    pub fn mint(
        &self,
        capability: &SupplyCapability,
        token: &TokenId,
        account: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.transact(|txn| txn.mint(capability, token, account, amount))
    }

    pub fn burn(
        &self,
        capability: &SupplyCapability,
        token: &TokenId,
        account: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.transact(|txn| txn.burn(capability, token, account, amount))
    }

    pub fn transfer(
        &self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.transact(|txn| txn.transfer(token, from, to, amount))
    }

    /// Current balance; 0 for accounts that never held the token.
    pub fn balance_of(&self, token: &TokenId, account: &AccountId) -> Result<u128, LedgerError> {
        let state = self.lock_state();
        if !state.tokens.contains_key(token) {
            return Err(LedgerError::TokenNotFound(token.clone()));
        }
        Ok(state.balance(token, account))
    }

    pub fn total_supply(&self, token: &TokenId) -> Result<u128, LedgerError> {
        let state = self.lock_state();
        if !state.tokens.contains_key(token) {
            return Err(LedgerError::TokenNotFound(token.clone()));
        }
        Ok(state.supply(token))
    }

    pub fn token(&self, token: &TokenId) -> Result<TokenSpec, LedgerError> {
        self.lock_state()
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| LedgerError::TokenNotFound(token.clone()))
    }

    pub fn tokens(&self) -> Vec<TokenSpec> {
        self.lock_state().tokens.values().cloned().collect()
    }

    /// Every account with a non-zero balance of `token`, in id order.
    pub fn holders(&self, token: &TokenId) -> Result<Vec<(AccountId, u128)>, LedgerError> {
        let state = self.lock_state();
        if !state.tokens.contains_key(token) {
            return Err(LedgerError::TokenNotFound(token.clone()));
        }
        Ok(state
            .balances
            .get(token)
            .map(|accounts| accounts.iter().map(|(a, v)| (a.clone(), *v)).collect())
            .unwrap_or_default())
    }

    /// Check that every token's balances sum to its tracked supply.
    pub fn verify_supply(&self) -> Result<(), LedgerError> {
        let state = self.lock_state();
        for token in state.tokens.keys() {
            let supply = state.supply(token);
            let sum = state
                .balances
                .get(token)
                .map(|accounts| {
                    accounts
                        .values()
                        .try_fold(0u128, |acc, v| acc.checked_add(*v))
                })
                .unwrap_or(Some(0));
            match sum {
                Some(sum) if sum == supply => {}
                Some(sum) => {
                    return Err(LedgerError::SupplyMismatch {
                        token: token.clone(),
                        supply,
                        sum,
                    })
                }
                None => {
                    return Err(LedgerError::SupplyMismatch {
                        token: token.clone(),
                        supply,
                        sum: u128::MAX,
                    })
                }
            }
        }
        Ok(())
    }

    pub fn subscribe(&self, listener: impl Fn(&LedgerEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }
}
