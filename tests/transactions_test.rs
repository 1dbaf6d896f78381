//! Transaction Engine Integration Tests
//!
//! Signs and broadcasts transfers and mining transactions against the
//! in-process chain mock. The mock checks signatures, public keys and
//! sequences the way a real node does, so a passing transfer means the
//! SIGN_MODE_DIRECT envelope is correct end to end.
//!
//! Run with: cargo test --test transactions_test -- --nocapture

mod common;

use std::time::Duration;

use chain_mock::MockConfig;
use common::{init_logging, test_config, TestEnvironment, KEY_ONE, KEY_ONE_ADDRESS};
use tempfile::TempDir;
use zeth_wallet::chain::signer::auto_gas_limit;
use zeth_wallet::transactions::FALLBACK_GAS_LIMIT;
use zeth_wallet::{
    explain_failure, is_success, AccountManager, NewAccount, SenderPolicy, WalletConfig,
    WalletError,
};

const ZETH: u128 = 1_000_000;

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn test_transfer_moves_funds_and_marks_on_chain() {
    let env = TestEnvironment::new().await.unwrap();
    let alice = env.funded_account("alice", 10 * ZETH).unwrap();
    let bob = env.manager.generate_account("bob").unwrap();

    let result = env
        .manager
        .send_transfer(alice.id, &bob.address, 2 * ZETH, "uzeth", Some("rent".to_string()))
        .await
        .expect("transfer should be included");

    assert!(is_success(&result), "unexpected failure: {}", result.raw_log);
    assert_eq!(explain_failure(&result), "");
    assert_eq!(result.tx_hash.len(), 64);
    assert!(result.height > 1);
    assert_eq!(result.gas_wanted, auto_gas_limit(85_000));

    assert_eq!(env.chain().balance(&alice.address, "uzeth"), 8 * ZETH);
    assert_eq!(env.chain().balance(&bob.address, "uzeth"), 2 * ZETH);
    assert_eq!(env.chain().tx(&result.tx_hash).unwrap().memo, "rent");

    let ledger = env.manager.ledger();
    assert!(ledger.get_by_id(alice.id).unwrap().unwrap().on_chain);
    assert!(ledger.get_by_id(bob.id).unwrap().unwrap().on_chain);
}

#[tokio::test]
async fn test_consecutive_transfers_track_sequence() {
    let env = TestEnvironment::new().await.unwrap();
    let alice = env.funded_account("alice", 10 * ZETH).unwrap();
    let bob = env.manager.generate_account("bob").unwrap();

    for _ in 0..3 {
        let result = env
            .manager
            .send_transfer(alice.id, &bob.address, ZETH, "uzeth", None)
            .await
            .unwrap();
        assert!(is_success(&result));
    }

    assert_eq!(env.chain().account(&alice.address).unwrap().sequence, 3);
    assert_eq!(env.chain().balance(&bob.address, "uzeth"), 3 * ZETH);
}

#[tokio::test]
async fn test_insufficient_funds_is_a_failed_result() {
    let env = TestEnvironment::new().await.unwrap();
    let alice = env.funded_account("alice", 100).unwrap();
    let bob = env.manager.generate_account("bob").unwrap();

    let result = env
        .manager
        .send_transfer(alice.id, &bob.address, 1_000, "uzeth", None)
        .await
        .expect("an included failure is still a result");

    assert!(!is_success(&result));
    assert_eq!(result.code, 5);
    assert!(explain_failure(&result).contains("insufficient funds"));
    assert_eq!(env.chain().balance(&alice.address, "uzeth"), 100);

    // Failed transfers don't mark anyone on-chain
    let ledger = env.manager.ledger();
    assert!(!ledger.get_by_id(alice.id).unwrap().unwrap().on_chain);
    assert!(!ledger.get_by_id(bob.id).unwrap().unwrap().on_chain);
}

#[tokio::test]
async fn test_unknown_sender_account_is_a_broadcast_error() {
    let env = TestEnvironment::new().await.unwrap();
    let ghost = env.manager.generate_account("ghost").unwrap();
    let bob = env.manager.generate_account("bob").unwrap();

    let err = env
        .manager
        .send_transfer(ghost.id, &bob.address, ZETH, "uzeth", None)
        .await
        .unwrap_err();

    match err {
        WalletError::Broadcast(msg) => assert!(msg.contains("does not exist on chain"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_intents_fail_before_any_network_call() {
    let env = TestEnvironment::new().await.unwrap();
    let alice = env.funded_account("alice", 10 * ZETH).unwrap();

    let err = env
        .manager
        .send_transfer(alice.id, "zeth1receiver", 0, "uzeth", None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidIntent(_)));

    let err = env
        .manager
        .send_transfer(alice.id, "cosmos1receiver", ZETH, "uzeth", None)
        .await
        .unwrap_err();
    assert_eq!(err, WalletError::InvalidAddress("cosmos1receiver".to_string()));

    assert_eq!(env.chain().tx_count(), 0);
}

#[tokio::test]
async fn test_read_only_account_cannot_send() {
    let env = TestEnvironment::new().await.unwrap();
    let watcher = env
        .manager
        .import_watch_only("watcher", "zeth1watchedaddress")
        .unwrap();

    let err = env
        .manager
        .send_transfer(watcher.id, KEY_ONE_ADDRESS, ZETH, "uzeth", None)
        .await
        .unwrap_err();
    assert_eq!(err, WalletError::NoPrivateKey("watcher".to_string()));

    let err = env.manager.mine(watcher.id).await.unwrap_err();
    assert_eq!(err, WalletError::NoPrivateKey("watcher".to_string()));
}

#[tokio::test]
async fn test_chain_id_mismatch_refuses_to_connect() {
    let env = TestEnvironment::with_mock(MockConfig {
        chain_id: "some-other-chain".to_string(),
        ..MockConfig::default()
    })
    .await
    .unwrap();
    let alice = env.funded_account("alice", 10 * ZETH).unwrap();

    let err = env
        .manager
        .send_transfer(alice.id, KEY_ONE_ADDRESS, ZETH, "uzeth", None)
        .await
        .unwrap_err();
    match err {
        WalletError::Connection(msg) => assert!(msg.contains("some-other-chain"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(env.chain().tx_count(), 0);
}

// ============================================================================
// Sender policy
// ============================================================================

#[tokio::test]
async fn test_ledger_policy_refuses_mismatched_key() {
    let env = TestEnvironment::new().await.unwrap();
    let (_, other_address) = env
        .manager
        .ledger()
        .codec()
        .generate_account_keys()
        .unwrap();
    // Stored address does not belong to the stored key
    let odd = env
        .manager
        .ledger()
        .create(NewAccount::with_key("odd", other_address.clone(), KEY_ONE))
        .unwrap();
    env.chain().fund(&other_address, 10 * ZETH, "uzeth");
    env.chain().fund(KEY_ONE_ADDRESS, 10 * ZETH, "uzeth");

    let err = env
        .manager
        .send_transfer(odd.id, KEY_ONE_ADDRESS, ZETH, "uzeth", None)
        .await
        .unwrap_err();
    match err {
        WalletError::InvalidIntent(msg) => {
            assert!(msg.contains("is not the channel key's address"), "{}", msg)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(env.chain().tx_count(), 0);
}

#[tokio::test]
async fn test_derived_policy_signs_as_the_key() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let server = chain_mock::spawn(MockConfig::default()).await.unwrap();
    let config = WalletConfig {
        sender_policy: SenderPolicy::DerivedAddress,
        ..test_config(&server, dir.path())
    };
    let manager = AccountManager::new(config).unwrap();

    let (_, other_address) = manager.ledger().codec().generate_account_keys().unwrap();
    let odd = manager
        .ledger()
        .create(NewAccount::with_key("odd", other_address.clone(), KEY_ONE))
        .unwrap();
    server.chain.fund(KEY_ONE_ADDRESS, 10 * ZETH, "uzeth");
    let receiver = manager.generate_account("receiver").unwrap();

    let result = manager
        .send_transfer(odd.id, &receiver.address, ZETH, "uzeth", None)
        .await
        .unwrap();

    assert!(is_success(&result));
    assert_eq!(server.chain.balance(KEY_ONE_ADDRESS, "uzeth"), 9 * ZETH);
    assert_eq!(server.chain.balance(&other_address, "uzeth"), 0);
}

// ============================================================================
// Mining
// ============================================================================

#[tokio::test]
async fn test_mine_credits_reward() {
    let env = TestEnvironment::new().await.unwrap();
    let miner = env.funded_account("miner", 1).unwrap();

    let result = env.manager.mine(miner.id).await.unwrap();
    assert!(is_success(&result));

    assert_eq!(env.chain().balance(&miner.address, "uzeth"), 100_000_001);
    let record = env.chain().mining_record(&miner.address);
    assert_eq!(record.mine_count, 1);
    assert_eq!(record.total_mined, 100_000_000);

    let stored = env.chain().tx(&result.tx_hash).unwrap();
    assert!(stored.memo.starts_with("PoS Block Production "));
    assert_eq!(stored.messages[0]["@type"], "/zethchain.mining.v1.MsgMine");
    assert_eq!(stored.messages[0]["miner"], miner.address.as_str());
}

#[tokio::test]
async fn test_mine_during_cooldown_is_cooldown_error() {
    let env = TestEnvironment::with_mock(MockConfig {
        mining_cooldown: Some(Duration::from_secs(3600)),
        ..MockConfig::default()
    })
    .await
    .unwrap();
    let miner = env.funded_account("miner", 1).unwrap();

    env.manager.mine(miner.id).await.expect("first mine succeeds");
    let err = env.manager.mine(miner.id).await.unwrap_err();

    match err {
        WalletError::Cooldown(msg) => assert!(msg.contains("cooldown"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(env.chain().mining_record(&miner.address).mine_count, 1);
}

// ============================================================================
// Gas estimation
// ============================================================================

#[tokio::test]
async fn test_estimate_scales_simulated_gas() {
    let env = TestEnvironment::new().await.unwrap();
    let alice = env.funded_account("alice", 10 * ZETH).unwrap();

    let gas = env
        .manager
        .estimate_transfer_gas(alice.id, KEY_ONE_ADDRESS, ZETH, "uzeth")
        .await
        .unwrap();
    // ceil(85_000 * 1.3)
    assert_eq!(gas, 110_500);
    assert_eq!(env.chain().tx_count(), 0);
}

#[tokio::test]
async fn test_estimate_falls_back_when_node_unreachable() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let config = WalletConfig {
        rest_api: "http://127.0.0.1:9".to_string(),
        rpc_api: "http://127.0.0.1:9".to_string(),
        ledger_path: dir.path().join("accounts.json"),
        ..WalletConfig::default()
    };
    let manager = AccountManager::new(config).unwrap();
    let alice = manager.generate_account("alice").unwrap();

    let gas = manager
        .estimate_transfer_gas(alice.id, KEY_ONE_ADDRESS, ZETH, "uzeth")
        .await
        .unwrap();
    assert_eq!(gas, FALLBACK_GAS_LIMIT);

    let err = manager
        .send_transfer(alice.id, KEY_ONE_ADDRESS, ZETH, "uzeth", None)
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {:?}", err);
}
