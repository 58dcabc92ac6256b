//! The custodial authority: registry administration and the request state
//! machine.
//!
//! Locking: the registry lock is taken first (read for request operations,
//! write for administration), then an individual request's mutex, then the
//! ledger's internal lock inside [`BalanceLedger::transact`]. Confirmations
//! on one request are serialized by its mutex; different requests proceed in
//! parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use wdoi_ledger::{BalanceLedger, LedgerError, SupplyCapability};
use wdoi_store::{decode, StateStore, Table, WriteBatch};
use wdoi_types::{AccountId, Clock, RequestId, TokenId};
use wdoi_utils::EventBus;

use crate::{
    Custodian, CustodianSeed, CustodyError, CustodyEvent, CustodyRequest, Registry,
    ReleaseInstruction, RequestKind, RequestStatus,
};

const NEXT_ID_KEY: &[u8] = b"custody.next_request_id";

/// Which threshold a pending request is judged against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuorumPolicy {
    /// The registry's current threshold, read at every confirmation.
    #[default]
    Live,
    /// The threshold recorded on the request when it was created.
    Snapshot,
}

#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    pub admin: AccountId,
    /// The wrapped token whose supply the authority controls.
    pub token: TokenId,
    pub policy: QuorumPolicy,
}

/// Result of a successful confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmOutcome {
    pub id: RequestId,
    pub confirmations: u32,
    pub required: u32,
    /// Whether this confirmation executed the request.
    pub executed: bool,
}

type RequestCell = Arc<Mutex<CustodyRequest>>;

pub struct CustodyAuthority {
    admin: AccountId,
    token: TokenId,
    policy: QuorumPolicy,
    ledger: Arc<BalanceLedger>,
    capability: SupplyCapability,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    registry: RwLock<Registry>,
    requests: RwLock<BTreeMap<RequestId, RequestCell>>,
    next_id: Mutex<RequestId>,
    events: EventBus<CustodyEvent>,
}

fn check_account(account: &AccountId) -> Result<(), CustodyError> {
    if !account.is_valid() {
        return Err(CustodyError::InvalidAccount(account.to_string()));
    }
    Ok(())
}

fn check_open(request: &CustodyRequest) -> Result<(), CustodyError> {
    match request.status {
        RequestStatus::Pending => Ok(()),
        RequestStatus::Executed => Err(CustodyError::AlreadyExecuted(request.id)),
        RequestStatus::Cancelled => Err(CustodyError::Cancelled(request.id)),
    }
}

impl CustodyAuthority {
    /// Load the registry and request log from `store`.
    ///
    /// `capability` must cover `config.token` on `ledger`; execution fails
    /// with a ledger `Unauthorized` error otherwise.
    pub fn open(
        config: AuthorityConfig,
        ledger: Arc<BalanceLedger>,
        capability: SupplyCapability,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CustodyError> {
        check_account(&config.admin)?;
        ledger.token(&config.token)?;

        let registry = match store.get(Table::Registry, Registry::KEY)? {
            Some(bytes) => decode::<Registry>(&bytes)?,
            None => Registry::default(),
        };

        let mut requests = BTreeMap::new();
        for (_, bytes) in store.scan(Table::Requests)? {
            let request: CustodyRequest = decode(&bytes)?;
            requests.insert(request.id, Arc::new(Mutex::new(request)));
        }

        let after_log = match requests.keys().next_back() {
            Some(last) => last.next().ok_or(CustodyError::SequenceExhausted)?,
            None => RequestId::FIRST,
        };
        let stored = match store.get(Table::Meta, NEXT_ID_KEY)? {
            Some(bytes) => RequestId::new(decode::<u64>(&bytes)?),
            None => RequestId::FIRST,
        };
        if stored < after_log {
            tracing::warn!(%stored, %after_log, "request sequence behind the log, advancing");
        }
        let next_id = stored.max(after_log);

        tracing::info!(
            custodians = registry.custodians.len(),
            merchants = registry.merchants.len(),
            threshold = registry.required_confirmations,
            requests = requests.len(),
            policy = ?config.policy,
            "custody authority loaded"
        );

        Ok(Self {
            admin: config.admin,
            token: config.token,
            policy: config.policy,
            ledger,
            capability,
            store,
            clock,
            registry: RwLock::new(registry),
            requests: RwLock::new(requests),
            next_id: Mutex::new(next_id),
            events: EventBus::new(),
        })
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_request(cell: &RequestCell) -> MutexGuard<'_, CustodyRequest> {
        cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, id: RequestId) -> Result<RequestCell, CustodyError> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(CustodyError::RequestNotFound(id))
    }

    fn require_admin(&self, caller: &AccountId, action: &'static str) -> Result<(), CustodyError> {
        if *caller != self.admin {
            return Err(CustodyError::Unauthorized {
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    fn required_for(&self, registry: &Registry, request: &CustodyRequest) -> u32 {
        match self.policy {
            QuorumPolicy::Live => registry.required_confirmations,
            QuorumPolicy::Snapshot => request.threshold_at_creation,
        }
    }

    /// Largest threshold a pending request is still judged against under
    /// [`QuorumPolicy::Snapshot`]; 0 under the live policy.
    ///
    /// Callers hold the registry write lock, so no request can be created
    /// concurrently.
    fn highest_pending_snapshot(&self) -> u32 {
        if self.policy != QuorumPolicy::Snapshot {
            return 0;
        }
        let cells: Vec<RequestCell> = self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        cells
            .iter()
            .map(|cell| {
                let request = Self::lock_request(cell);
                if request.is_pending() {
                    request.threshold_at_creation
                } else {
                    0
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Apply `f` to a copy of the registry, persist the copy, then swap it in.
    /// `f` returns `None` when nothing changed; nothing is written then.
    fn update_registry<F>(&self, f: F) -> Result<Option<CustodyEvent>, CustodyError>
    where
        F: FnOnce(&mut Registry) -> Result<Option<CustodyEvent>, CustodyError>,
    {
        let mut registry = self.write_registry();
        let mut updated = registry.clone();
        let event = f(&mut updated)?;
        if event.is_some() {
            let mut batch = WriteBatch::new();
            batch.put_encoded(Table::Registry, Registry::KEY, &updated)?;
            self.store.commit(batch)?;
            *registry = updated;
        }
        drop(registry);

        if let Some(event) = &event {
            tracing::info!(?event, "custody registry changed");
            self.events.emit(event);
        }
        Ok(event)
    }

    // ── Administration ──────────────────────────────────────────────────

    pub fn add_custodian(
        &self,
        caller: &AccountId,
        id: AccountId,
        label: impl Into<String>,
        external_ref: impl Into<String>,
    ) -> Result<(), CustodyError> {
        self.require_admin(caller, "add custodians")?;
        check_account(&id)?;
        let custodian = Custodian {
            id: id.clone(),
            label: label.into(),
            external_ref: external_ref.into(),
            added_at: self.clock.now(),
        };
        self.update_registry(|registry| {
            if registry.is_custodian(&id) {
                return Err(CustodyError::AlreadyExists(id.clone()));
            }
            registry.custodians.insert(id.clone(), custodian);
            Ok(Some(CustodyEvent::CustodianAdded(id.clone())))
        })?;
        Ok(())
    }

    /// Install the initial custodians, merchants and threshold in one
    /// commit. Only allowed while the registry is empty; returns `false`
    /// without changes otherwise. Either the whole seed is persisted or
    /// nothing is.
    pub fn seed_registry(
        &self,
        caller: &AccountId,
        custodians: Vec<CustodianSeed>,
        merchants: Vec<AccountId>,
        required_confirmations: Option<u32>,
    ) -> Result<bool, CustodyError> {
        self.require_admin(caller, "seed the registry")?;
        let mut registry = self.write_registry();
        if !registry.is_empty() {
            return Ok(false);
        }

        let now = self.clock.now();
        let mut seeded = registry.clone();
        let mut events = Vec::new();
        for seed in custodians {
            check_account(&seed.id)?;
            if seeded.is_custodian(&seed.id) {
                return Err(CustodyError::AlreadyExists(seed.id));
            }
            events.push(CustodyEvent::CustodianAdded(seed.id.clone()));
            seeded.custodians.insert(
                seed.id.clone(),
                Custodian {
                    id: seed.id,
                    label: seed.label,
                    external_ref: seed.external_ref,
                    added_at: now,
                },
            );
        }
        for merchant in merchants {
            check_account(&merchant)?;
            if seeded.merchants.insert(merchant.clone()) {
                events.push(CustodyEvent::MerchantAdded(merchant));
            }
        }
        if let Some(n) = required_confirmations {
            let count = seeded.custodian_count();
            if !Registry::threshold_fits(n, count) {
                return Err(CustodyError::InvalidThreshold {
                    requested: n,
                    custodians: count,
                });
            }
            if n != seeded.required_confirmations {
                events.push(CustodyEvent::ThresholdChanged {
                    old: seeded.required_confirmations,
                    new: n,
                });
                seeded.required_confirmations = n;
            }
        }
        if events.is_empty() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.put_encoded(Table::Registry, Registry::KEY, &seeded)?;
        self.store.commit(batch)?;
        tracing::info!(
            custodians = seeded.custodians.len(),
            merchants = seeded.merchants.len(),
            threshold = seeded.required_confirmations,
            "custody registry seeded"
        );
        *registry = seeded;
        drop(registry);

        self.events.emit_all(&events);
        Ok(true)
    }

    /// Remove a custodian. Confirmations it already recorded stay counted.
    ///
    /// Fails `InvalidThreshold` if fewer custodians would remain than the
    /// threshold, or, under [`QuorumPolicy::Snapshot`], than the threshold
    /// recorded on any pending request.
    pub fn remove_custodian(&self, caller: &AccountId, id: &AccountId) -> Result<(), CustodyError> {
        self.require_admin(caller, "remove custodians")?;
        self.update_registry(|registry| {
            if !registry.is_custodian(id) {
                return Err(CustodyError::CustodianNotFound(id.clone()));
            }
            let remaining = registry.custodian_count() - 1;
            let required = registry
                .required_confirmations
                .max(self.highest_pending_snapshot());
            if remaining < required {
                return Err(CustodyError::InvalidThreshold {
                    requested: required,
                    custodians: remaining,
                });
            }
            registry.custodians.remove(id);
            Ok(Some(CustodyEvent::CustodianRemoved(id.clone())))
        })?;
        Ok(())
    }

    /// Idempotent.
    pub fn add_merchant(&self, caller: &AccountId, id: AccountId) -> Result<(), CustodyError> {
        self.require_admin(caller, "add merchants")?;
        check_account(&id)?;
        self.update_registry(|registry| {
            Ok(registry
                .merchants
                .insert(id.clone())
                .then(|| CustodyEvent::MerchantAdded(id.clone())))
        })?;
        Ok(())
    }

    /// Idempotent.
    pub fn remove_merchant(&self, caller: &AccountId, id: &AccountId) -> Result<(), CustodyError> {
        self.require_admin(caller, "remove merchants")?;
        self.update_registry(|registry| {
            Ok(registry
                .merchants
                .remove(id)
                .then(|| CustodyEvent::MerchantRemoved(id.clone())))
        })?;
        Ok(())
    }

    /// Change the quorum threshold. Never executes anything by itself; see
    /// [`execute_ready`](Self::execute_ready).
    pub fn set_required_confirmations(
        &self,
        caller: &AccountId,
        n: u32,
    ) -> Result<(), CustodyError> {
        self.require_admin(caller, "change the confirmation threshold")?;
        self.update_registry(|registry| {
            let custodians = registry.custodian_count();
            if !Registry::threshold_fits(n, custodians) {
                return Err(CustodyError::InvalidThreshold {
                    requested: n,
                    custodians,
                });
            }
            let old = registry.required_confirmations;
            if old == n {
                return Ok(None);
            }
            registry.required_confirmations = n;
            Ok(Some(CustodyEvent::ThresholdChanged { old, new: n }))
        })?;
        Ok(())
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Open a mint request for `beneficiary`. Returns the new request id.
    pub fn request_mint(
        &self,
        caller: &AccountId,
        beneficiary: AccountId,
        amount: u128,
        external_ref: impl Into<String>,
        custodian_ref: impl Into<String>,
    ) -> Result<RequestId, CustodyError> {
        self.open_request(
            caller,
            RequestKind::Mint,
            beneficiary,
            amount,
            external_ref.into(),
            custodian_ref.into(),
        )
    }

    /// Open a burn request against `account`, which must hold `amount` now.
    pub fn request_burn(
        &self,
        caller: &AccountId,
        account: AccountId,
        amount: u128,
        external_ref: impl Into<String>,
        custodian_ref: impl Into<String>,
    ) -> Result<RequestId, CustodyError> {
        self.open_request(
            caller,
            RequestKind::Burn,
            account,
            amount,
            external_ref.into(),
            custodian_ref.into(),
        )
    }

    fn open_request(
        &self,
        caller: &AccountId,
        kind: RequestKind,
        account: AccountId,
        amount: u128,
        external_ref: String,
        custodian_ref: String,
    ) -> Result<RequestId, CustodyError> {
        let registry = self.read_registry();
        if !registry.is_custodian(caller) && !registry.is_merchant(caller) {
            return Err(CustodyError::Unauthorized {
                caller: caller.clone(),
                action: "open custody requests",
            });
        }
        check_account(&account)?;
        if amount == 0 {
            return Err(CustodyError::InvalidAmount("amount must be positive".into()));
        }
        if kind == RequestKind::Burn {
            let available = self.ledger.balance_of(&self.token, &account)?;
            if available < amount {
                return Err(CustodyError::InsufficientBalance {
                    account,
                    needed: amount,
                    available,
                });
            }
        }

        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next;
        let following = id.next().ok_or(CustodyError::SequenceExhausted)?;
        let request = CustodyRequest {
            id,
            kind,
            requester: caller.clone(),
            account,
            amount,
            external_ref,
            custodian_ref,
            confirmations: BTreeSet::new(),
            status: RequestStatus::Pending,
            threshold_at_creation: registry.required_confirmations,
            created_at: self.clock.now(),
            closed_at: None,
        };

        // The sequence advance is durable before the id is used, so an id
        // whose request row fails to commit is never handed out again.
        let mut reserve = WriteBatch::new();
        reserve.put_encoded(Table::Meta, NEXT_ID_KEY, &following.value())?;
        self.store.commit(reserve)?;
        *next = following;

        let mut batch = WriteBatch::new();
        batch.put_encoded(Table::Requests, id.to_key(), &request)?;
        self.store.commit(batch)?;

        let event = CustodyEvent::RequestCreated {
            id,
            kind,
            requester: request.requester.clone(),
            account: request.account.clone(),
            amount,
        };
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(request)));
        drop(next);
        drop(registry);

        tracing::info!(%id, ?kind, %caller, amount, "custody request created");
        self.events.emit(&event);
        Ok(id)
    }

    pub fn confirm_mint(
        &self,
        caller: &AccountId,
        id: RequestId,
    ) -> Result<ConfirmOutcome, CustodyError> {
        self.confirm(caller, id, RequestKind::Mint)
    }

    pub fn confirm_burn(
        &self,
        caller: &AccountId,
        id: RequestId,
    ) -> Result<ConfirmOutcome, CustodyError> {
        self.confirm(caller, id, RequestKind::Burn)
    }

    fn confirm(
        &self,
        caller: &AccountId,
        id: RequestId,
        kind: RequestKind,
    ) -> Result<ConfirmOutcome, CustodyError> {
        let registry = self.read_registry();
        if !registry.is_custodian(caller) {
            return Err(CustodyError::Unauthorized {
                caller: caller.clone(),
                action: "confirm requests",
            });
        }
        let cell = self.entry(id)?;
        let mut request = Self::lock_request(&cell);
        if request.kind != kind {
            return Err(CustodyError::WrongRequestKind {
                id,
                expected: kind,
                actual: request.kind,
            });
        }
        check_open(&request)?;
        if request.has_confirmed(caller) {
            return Err(CustodyError::DuplicateConfirmation {
                id,
                custodian: caller.clone(),
            });
        }

        let mut updated = request.clone();
        updated.confirmations.insert(caller.clone());
        let required = self.required_for(&registry, &updated);
        let executed = updated.confirmation_count() >= required;
        if executed {
            updated.status = RequestStatus::Executed;
            updated.closed_at = Some(self.clock.now());
        }
        self.commit_request(&updated, executed)?;
        *request = updated;

        let outcome = ConfirmOutcome {
            id,
            confirmations: request.confirmation_count(),
            required,
            executed,
        };
        let mut events = vec![CustodyEvent::Confirmed {
            id,
            custodian: caller.clone(),
            confirmations: outcome.confirmations,
            required,
        }];
        if executed {
            events.push(Self::executed_event(&request));
        }
        drop(request);
        drop(registry);

        tracing::debug!(
            %id,
            custodian = %caller,
            confirmations = outcome.confirmations,
            required,
            "request confirmed"
        );
        if executed {
            tracing::info!(%id, ?kind, "custody request executed");
        }
        self.events.emit_all(&events);
        Ok(outcome)
    }

    /// Execute a pending request whose existing confirmations already meet
    /// the threshold in force, e.g. after the threshold was lowered.
    /// Returns whether the request executed.
    pub fn execute_ready(&self, caller: &AccountId, id: RequestId) -> Result<bool, CustodyError> {
        let registry = self.read_registry();
        if !registry.is_custodian(caller) {
            return Err(CustodyError::Unauthorized {
                caller: caller.clone(),
                action: "execute requests",
            });
        }
        let cell = self.entry(id)?;
        let mut request = Self::lock_request(&cell);
        check_open(&request)?;
        let required = self.required_for(&registry, &request);
        if request.confirmation_count() < required {
            return Ok(false);
        }

        let mut updated = request.clone();
        updated.status = RequestStatus::Executed;
        updated.closed_at = Some(self.clock.now());
        self.commit_request(&updated, true)?;
        *request = updated;
        let event = Self::executed_event(&request);
        drop(request);
        drop(registry);

        tracing::info!(%id, by = %caller, "custody request executed on demand");
        self.events.emit(&event);
        Ok(true)
    }

    /// Cancel a pending request. Allowed for its requester and the admin.
    pub fn cancel_request(&self, caller: &AccountId, id: RequestId) -> Result<(), CustodyError> {
        let cell = self.entry(id)?;
        let mut request = Self::lock_request(&cell);
        if request.requester != *caller && *caller != self.admin {
            return Err(CustodyError::Unauthorized {
                caller: caller.clone(),
                action: "cancel this request",
            });
        }
        check_open(&request)?;

        let mut updated = request.clone();
        updated.status = RequestStatus::Cancelled;
        updated.closed_at = Some(self.clock.now());
        self.commit_request(&updated, false)?;
        *request = updated;
        drop(request);

        tracing::info!(%id, by = %caller, "custody request cancelled");
        self.events.emit(&CustodyEvent::Cancelled {
            id,
            by: caller.clone(),
        });
        Ok(())
    }

    /// Persist `request`, minting or burning in the same commit when
    /// `execute` is set.
    fn commit_request(&self, request: &CustodyRequest, execute: bool) -> Result<(), CustodyError> {
        self.ledger.transact(|txn| -> Result<(), CustodyError> {
            if execute {
                match request.kind {
                    RequestKind::Mint => {
                        txn.mint(&self.capability, &self.token, &request.account, request.amount)?
                    }
                    RequestKind::Burn => txn
                        .burn(&self.capability, &self.token, &request.account, request.amount)
                        .map_err(|e| match e {
                            LedgerError::InsufficientBalance {
                                account,
                                needed,
                                available,
                                ..
                            } => CustodyError::InsufficientBalance {
                                account,
                                needed,
                                available,
                            },
                            other => other.into(),
                        })?,
                }
            }
            txn.batch_mut()
                .put_encoded(Table::Requests, request.id.to_key(), request)?;
            Ok(())
        })
    }

    fn executed_event(request: &CustodyRequest) -> CustodyEvent {
        CustodyEvent::Executed {
            id: request.id,
            kind: request.kind,
            account: request.account.clone(),
            amount: request.amount,
            release: request.release(),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn request(&self, id: RequestId) -> Result<CustodyRequest, CustodyError> {
        let cell = self.entry(id)?;
        let request = Self::lock_request(&cell).clone();
        Ok(request)
    }

    /// Every request in id order.
    pub fn requests(&self) -> Vec<CustodyRequest> {
        let cells: Vec<RequestCell> = self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        cells
            .iter()
            .map(|cell| Self::lock_request(cell).clone())
            .collect()
    }

    pub fn pending_requests(&self) -> Vec<CustodyRequest> {
        self.requests()
            .into_iter()
            .filter(CustodyRequest::is_pending)
            .collect()
    }

    /// Release instructions of executed burns, in request order.
    pub fn pending_releases(&self) -> Vec<ReleaseInstruction> {
        self.requests()
            .iter()
            .filter_map(CustodyRequest::release)
            .collect()
    }

    pub fn custodians(&self) -> Vec<Custodian> {
        self.read_registry().custodians.values().cloned().collect()
    }

    pub fn merchants(&self) -> Vec<AccountId> {
        self.read_registry().merchants.iter().cloned().collect()
    }

    pub fn required_confirmations(&self) -> u32 {
        self.read_registry().required_confirmations
    }

    pub fn registry(&self) -> Registry {
        self.read_registry().clone()
    }

    pub fn is_custodian(&self, id: &AccountId) -> bool {
        self.read_registry().is_custodian(id)
    }

    pub fn is_merchant(&self, id: &AccountId) -> bool {
        self.read_registry().is_merchant(id)
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub fn token(&self) -> &TokenId {
        &self.token
    }

    pub fn policy(&self) -> QuorumPolicy {
        self.policy
    }

    pub fn subscribe(&self, listener: impl Fn(&CustodyEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }
}
