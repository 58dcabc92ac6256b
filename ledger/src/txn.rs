//! Staged ledger transactions.

use std::collections::BTreeMap;

use wdoi_store::{encode, StoreError, Table, WriteBatch};
use wdoi_types::{AccountId, TokenId, TokenSpec};

use crate::ledger::LedgerState;
use crate::{LedgerError, LedgerEvent, LedgerEventKind, SupplyCapability};

/// A set of balance changes staged against a snapshot of the ledger.
///
/// Reads see the transaction's own earlier writes. Nothing becomes visible to
/// other callers (or durable) until the enclosing
/// [`BalanceLedger::transact`](crate::BalanceLedger::transact) commits.
pub struct LedgerTxn<'a> {
    ledger: u64,
    state: &'a LedgerState,
    balances: BTreeMap<(TokenId, AccountId), u128>,
    supplies: BTreeMap<TokenId, u128>,
    batch: WriteBatch,
    events: Vec<LedgerEvent>,
}

pub(crate) struct StagedChanges {
    pub balances: BTreeMap<(TokenId, AccountId), u128>,
    pub supplies: BTreeMap<TokenId, u128>,
    pub batch: WriteBatch,
    pub events: Vec<LedgerEvent>,
}

pub(crate) fn balance_key(token: &TokenId, account: &AccountId) -> Result<Vec<u8>, StoreError> {
    encode(&(token, account))
}

fn check_amount(amount: u128) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount("amount must be positive".into()));
    }
    Ok(())
}

fn check_account(account: &AccountId) -> Result<(), LedgerError> {
    if !account.is_valid() {
        return Err(LedgerError::InvalidAccount(account.to_string()));
    }
    Ok(())
}

impl<'a> LedgerTxn<'a> {
    pub(crate) fn new(ledger: u64, state: &'a LedgerState) -> Self {
        Self {
            ledger,
            state,
            balances: BTreeMap::new(),
            supplies: BTreeMap::new(),
            batch: WriteBatch::new(),
            events: Vec::new(),
        }
    }

    fn spec(&self, token: &TokenId) -> Result<&TokenSpec, LedgerError> {
        self.state
            .tokens
            .get(token)
            .ok_or_else(|| LedgerError::TokenNotFound(token.clone()))
    }

    pub fn token(&self, token: &TokenId) -> Result<TokenSpec, LedgerError> {
        self.spec(token).cloned()
    }

    pub fn balance_of(&self, token: &TokenId, account: &AccountId) -> Result<u128, LedgerError> {
        self.spec(token)?;
        let staged = self.balances.get(&(token.clone(), account.clone()));
        Ok(staged
            .copied()
            .unwrap_or_else(|| self.state.balance(token, account)))
    }

    pub fn total_supply(&self, token: &TokenId) -> Result<u128, LedgerError> {
        self.spec(token)?;
        Ok(self
            .supplies
            .get(token)
            .copied()
            .unwrap_or_else(|| self.state.supply(token)))
    }

    /// Credit `account` with newly issued tokens.
    pub fn mint(
        &mut self,
        capability: &SupplyCapability,
        token: &TokenId,
        account: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.spec(token)?;
        if !capability.permits(self.ledger, token) {
            return Err(LedgerError::Unauthorized {
                holder: capability.holder().to_string(),
                token: token.clone(),
            });
        }
        check_account(account)?;
        check_amount(amount)?;

        let supply = self
            .total_supply(token)?
            .checked_add(amount)
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!("minting {amount} overflows {token} supply"))
            })?;
        // balance <= supply, so this cannot overflow once the supply didn't.
        let balance = self.balance_of(token, account)? + amount;

        self.balances.insert((token.clone(), account.clone()), balance);
        self.supplies.insert(token.clone(), supply);
        self.events.push(LedgerEvent {
            token: token.clone(),
            kind: LedgerEventKind::Mint,
            from: None,
            to: Some(account.clone()),
            amount,
            resulting_supply: supply,
            commit: 0,
        });
        tracing::trace!(%token, %account, amount, "staged mint");
        Ok(())
    }

    /// Destroy tokens held by `account`.
    pub fn burn(
        &mut self,
        capability: &SupplyCapability,
        token: &TokenId,
        account: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.spec(token)?;
        if !capability.permits(self.ledger, token) {
            return Err(LedgerError::Unauthorized {
                holder: capability.holder().to_string(),
                token: token.clone(),
            });
        }
        check_account(account)?;
        check_amount(amount)?;

        let available = self.balance_of(token, account)?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                token: token.clone(),
                account: account.clone(),
                needed: amount,
                available,
            });
        }
        let supply = self.total_supply(token)? - amount;

        self.balances
            .insert((token.clone(), account.clone()), available - amount);
        self.supplies.insert(token.clone(), supply);
        self.events.push(LedgerEvent {
            token: token.clone(),
            kind: LedgerEventKind::Burn,
            from: Some(account.clone()),
            to: None,
            amount,
            resulting_supply: supply,
            commit: 0,
        });
        tracing::trace!(%token, %account, amount, "staged burn");
        Ok(())
    }

    /// Move tokens from `from` to `to`. The caller is responsible for having
    /// authenticated `from`.
    pub fn transfer(
        &mut self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.spec(token)?;
        check_account(from)?;
        check_account(to)?;
        check_amount(amount)?;

        let available = self.balance_of(token, from)?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                token: token.clone(),
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        if from != to {
            let credited = self.balance_of(token, to)? + amount;
            self.balances
                .insert((token.clone(), from.clone()), available - amount);
            self.balances.insert((token.clone(), to.clone()), credited);
        }
        let supply = self.total_supply(token)?;
        self.events.push(LedgerEvent {
            token: token.clone(),
            kind: LedgerEventKind::Transfer,
            from: Some(from.clone()),
            to: Some(to.clone()),
            amount,
            resulting_supply: supply,
            commit: 0,
        });
        tracing::trace!(%token, %from, %to, amount, "staged transfer");
        Ok(())
    }

    /// Rows owned by the calling component, committed together with the
    /// balance changes.
    pub fn batch_mut(&mut self) -> &mut WriteBatch {
        &mut self.batch
    }

    pub(crate) fn finish(self) -> Result<StagedChanges, LedgerError> {
        let LedgerTxn {
            balances,
            supplies,
            batch: extra,
            events,
            ..
        } = self;

        let mut batch = WriteBatch::new();
        for ((token, account), amount) in &balances {
            let key = balance_key(token, account)?;
            if *amount == 0 {
                batch.delete(Table::Balances, key);
            } else {
                batch.put_encoded(Table::Balances, key, amount)?;
            }
        }
        for (token, supply) in &supplies {
            batch.put_encoded(Table::Supplies, token.as_str().as_bytes(), supply)?;
        }
        batch.extend(extra);

        Ok(StagedChanges {
            balances,
            supplies,
            batch,
            events,
        })
    }
}
