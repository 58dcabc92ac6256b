//! Integration tests wiring the ledger, custody authority and pool through a
//! full node, including LMDB-backed restarts.

use std::sync::Arc;

use wdoi_custody::{CustodyError, RequestStatus};
use wdoi_node::{GenesisConfig, GenesisCustodian, NodeConfig, NodeError, StorageBackend, WdoiNode};
use wdoi_nullables::{NullClock, NullStore};
use wdoi_pool::PoolError;
use wdoi_store::MetaStore;
use wdoi_types::{AccountId, RequestId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(s: &str) -> AccountId {
    AccountId::new(s)
}

fn genesis() -> GenesisConfig {
    GenesisConfig {
        custodians: ["c1", "c2", "c3"]
            .iter()
            .map(|c| GenesisCustodian {
                id: c.to_string(),
                label: format!("custodian {c}"),
                external_ref: format!("doi:{c}"),
            })
            .collect(),
        merchants: vec!["m1".to_string()],
        required_confirmations: Some(2),
    }
}

fn memory_config() -> NodeConfig {
    NodeConfig {
        storage: StorageBackend::Memory,
        enable_faucet: true,
        genesis: genesis(),
        ..NodeConfig::default()
    }
}

fn lmdb_config(dir: &tempfile::TempDir) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().to_path_buf(),
        storage: StorageBackend::Lmdb,
        map_size: 64 * 1024 * 1024,
        genesis: genesis(),
        ..NodeConfig::default()
    }
}

fn mint_to(node: &WdoiNode, who: &str, amount: u128) {
    let custody = node.custody();
    let req = custody
        .request_mint(&id("m1"), id(who), amount, "doi-tx", "ref")
        .unwrap();
    custody.confirm_mint(&id("c1"), req).unwrap();
    assert!(custody.confirm_mint(&id("c2"), req).unwrap().executed);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn genesis_seeds_registry() {
    let node = WdoiNode::open(memory_config()).unwrap();
    let summary = node.summary().unwrap();
    assert_eq!(summary.custodians, 3);
    assert_eq!(summary.merchants, 1);
    assert_eq!(summary.required_confirmations, 2);
    assert_eq!(summary.tokens.len(), 3);
}

#[test]
fn restart_keeps_confirmations_and_never_re_executes() {
    let dir = tempfile::tempdir().expect("temp dir");

    let req = {
        let node = WdoiNode::open(lmdb_config(&dir)).unwrap();
        let req = node
            .custody()
            .request_mint(&id("m1"), id("alice"), 1_000, "doi-tx-1", "ref")
            .unwrap();
        node.custody().confirm_mint(&id("c1"), req).unwrap();
        req
    };

    {
        let node = WdoiNode::open(lmdb_config(&dir)).unwrap();
        let request = node.custody().request(req).unwrap();
        assert!(request.has_confirmed(&id("c1")));
        assert!(matches!(
            node.custody().confirm_mint(&id("c1"), req),
            Err(CustodyError::DuplicateConfirmation { .. })
        ));
        assert!(node.custody().confirm_mint(&id("c2"), req).unwrap().executed);
    }

    let node = WdoiNode::open(lmdb_config(&dir)).unwrap();
    assert_eq!(node.custody().request(req).unwrap().status, RequestStatus::Executed);
    assert!(matches!(
        node.custody().confirm_mint(&id("c3"), req),
        Err(CustodyError::AlreadyExecuted(_))
    ));
    let wdoi = node.wrapped_token();
    assert_eq!(node.ledger().balance_of(&wdoi, &id("alice")).unwrap(), 1_000);
    assert_eq!(node.ledger().total_supply(&wdoi).unwrap(), 1_000);

    // The sequence continues after the restart.
    let next = node
        .custody()
        .request_mint(&id("m1"), id("bob"), 1, "doi-tx-2", "ref")
        .unwrap();
    assert_eq!(next, RequestId::new(2));
}

#[test]
fn genesis_is_applied_only_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    {
        let node = WdoiNode::open(lmdb_config(&dir)).unwrap();
        node.custody()
            .remove_custodian(&id("admin"), &id("c3"))
            .unwrap();
    }
    let node = WdoiNode::open(lmdb_config(&dir)).unwrap();
    assert_eq!(node.custody().custodians().len(), 2);
    assert!(!node.custody().is_custodian(&id("c3")));
}

#[test]
fn malformed_genesis_leaves_registry_untouched() {
    let store = Arc::new(NullStore::new());
    let mut bad = memory_config();
    bad.genesis.custodians[1].id = "bad id".to_string();

    for _ in 0..2 {
        let clock = Arc::new(NullClock::default());
        let result = WdoiNode::with_store(bad.clone(), store.clone(), clock);
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    let node =
        WdoiNode::with_store(memory_config(), store, Arc::new(NullClock::default())).unwrap();
    assert_eq!(node.custody().custodians().len(), 3);
    assert_eq!(node.custody().required_confirmations(), 2);
    assert!(node.custody().is_merchant(&id("m1")));
}

#[test]
fn mint_then_trade_end_to_end() {
    let node = WdoiNode::open(memory_config()).unwrap();
    let admin = id("admin");
    let wdoi = node.wrapped_token();
    let usdt = node.stable_token();

    mint_to(&node, "alice", 10_000);
    node.faucet_stable(&admin, &id("alice"), 20_000).unwrap();
    node.faucet_stable(&admin, &id("bob"), 1_000).unwrap();

    let added = node
        .pool()
        .add_liquidity(&id("alice"), 10_000, 20_000, 10_000, 20_000)
        .unwrap();
    assert_eq!(added.shares, 14_142);

    let swap = node.pool().swap_stable_for_wrapped(&id("bob"), 1_000, 400).unwrap();
    assert!(swap.amount_out >= 400);
    assert_eq!(node.ledger().balance_of(&wdoi, &id("bob")).unwrap(), swap.amount_out);
    assert_eq!(node.ledger().balance_of(&usdt, &id("bob")).unwrap(), 0);

    // Bob redeems through the custody burn flow.
    let burn = node
        .custody()
        .request_burn(&id("m1"), id("bob"), swap.amount_out, "burn", "doi:bob")
        .unwrap();
    node.custody().confirm_burn(&id("c2"), burn).unwrap();
    node.custody().confirm_burn(&id("c3"), burn).unwrap();
    assert_eq!(node.custody().pending_releases().len(), 1);
    assert_eq!(
        node.ledger().total_supply(&wdoi).unwrap(),
        10_000 - swap.amount_out
    );

    node.ledger().verify_supply().unwrap();
    let metrics = node.metrics_text().unwrap();
    assert!(metrics.contains("wdoi_pool_swaps_total 1"));
    assert!(metrics.contains("wdoi_custody_mints_executed_total 1"));
    assert!(metrics.contains("wdoi_custody_burns_executed_total 1"));
}

#[test]
fn slippage_rejection_is_counted() {
    let node = WdoiNode::open(memory_config()).unwrap();
    mint_to(&node, "alice", 1_000);
    node.faucet_stable(&id("admin"), &id("alice"), 1_000).unwrap();
    node.pool()
        .add_liquidity(&id("alice"), 500, 500, 0, 0)
        .unwrap();

    let result = node.track(
        "swap",
        node.pool().swap_wrapped_for_stable(&id("alice"), 100, 1_000),
    );
    assert!(matches!(result, Err(PoolError::SlippageExceeded { .. })));
    assert_eq!(node.metrics().rejected_calls.get(), 1);
}

#[test]
fn faucet_is_gated() {
    let disabled = WdoiNode::open(NodeConfig {
        enable_faucet: false,
        ..memory_config()
    })
    .unwrap();
    assert!(matches!(
        disabled.faucet_stable(&id("admin"), &id("bob"), 1),
        Err(NodeError::FaucetDisabled)
    ));

    let node = WdoiNode::open(memory_config()).unwrap();
    assert!(matches!(
        node.faucet_stable(&id("bob"), &id("bob"), 1),
        Err(NodeError::Unauthorized { .. })
    ));
}

#[test]
fn newer_schema_is_refused() {
    let store = Arc::new(NullStore::new());
    store.set_schema_version(99).unwrap();
    let result = WdoiNode::with_store(memory_config(), store, Arc::new(NullClock::default()));
    assert!(matches!(result, Err(NodeError::Lmdb(_))));
}

#[test]
fn changing_token_precision_is_refused() {
    let store = Arc::new(NullStore::new());
    WdoiNode::with_store(memory_config(), store.clone(), Arc::new(NullClock::default())).unwrap();

    let mut config = memory_config();
    config.stable.decimals = 18;
    let result = WdoiNode::with_store(config, store, Arc::new(NullClock::default()));
    assert!(matches!(result, Err(NodeError::Ledger(_))));
}
