//! Account Manager Integration Tests
//!
//! Import flows, key consistency and the default-account bootstrap, with
//! the faucet served by the chain mock.
//!
//! Run with: cargo test --test manager_test -- --nocapture

mod common;

use common::{init_logging, test_config, TestEnvironment, KEY_ONE, KEY_ONE_ADDRESS};
use tempfile::TempDir;
use zeth_wallet::config::FAUCET_THRESHOLD_UZETH;
use zeth_wallet::{AccountManager, ErrorClass, KeyConsistency, NewAccount, WalletConfig, WalletError};

// ============================================================================
// Imports
// ============================================================================

#[tokio::test]
async fn test_import_private_key_derives_address() {
    let env = TestEnvironment::new().await.unwrap();

    let account = env
        .manager
        .import_private_key("  first  ", &format!(" {} ", KEY_ONE))
        .unwrap();

    assert_eq!(account.name, "first");
    assert_eq!(account.address, KEY_ONE_ADDRESS);
    assert_eq!(account.private_key.as_deref(), Some(KEY_ONE));
    assert_eq!(
        env.manager.check_consistency(&account).unwrap(),
        KeyConsistency::Consistent
    );
}

#[tokio::test]
async fn test_import_upgrades_watch_only_account() {
    let env = TestEnvironment::new().await.unwrap();
    let watched = env
        .manager
        .import_watch_only("watched", KEY_ONE_ADDRESS)
        .unwrap();
    assert_eq!(
        env.manager.check_consistency(&watched).unwrap(),
        KeyConsistency::ReadOnly
    );

    let upgraded = env.manager.import_private_key("spender", KEY_ONE).unwrap();

    assert_eq!(upgraded.id, watched.id);
    assert_eq!(upgraded.name, "spender");
    assert!(!upgraded.is_read_only());
    assert_eq!(env.manager.ledger().count().unwrap(), 1);
}

#[tokio::test]
async fn test_import_conflicts() {
    let env = TestEnvironment::new().await.unwrap();
    env.manager.import_private_key("holder", KEY_ONE).unwrap();

    // Same key again
    let err = env.manager.import_private_key("again", KEY_ONE).unwrap_err();
    assert_eq!(err, WalletError::DuplicateAddress(KEY_ONE_ADDRESS.to_string()));

    // Name taken by a different account
    let other_key = format!("{:064x}", 2);
    let err = env
        .manager
        .import_private_key("holder", &other_key)
        .unwrap_err();
    assert_eq!(err, WalletError::DuplicateName("holder".to_string()));
    assert_eq!(err.class(), ErrorClass::Local);
}

#[tokio::test]
async fn test_import_rejects_bad_keys() {
    let env = TestEnvironment::new().await.unwrap();

    let err = env.manager.import_private_key("short", "abcd").unwrap_err();
    assert!(matches!(err, WalletError::InvalidKeyFormat(_)));

    let err = env
        .manager
        .import_private_key("nonhex", &"zz".repeat(32))
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidKeyFormat(_)));

    // Well-formed hex but not a valid scalar
    let err = env
        .manager
        .import_private_key("zero", &"0".repeat(64))
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidKey(_)));
    assert_eq!(err.class(), ErrorClass::KeyInvalid);

    assert_eq!(env.manager.ledger().count().unwrap(), 0);
}

#[tokio::test]
async fn test_consistency_reports_mismatch_without_repairing() {
    let env = TestEnvironment::new().await.unwrap();
    let (_, stored) = env
        .manager
        .ledger()
        .codec()
        .generate_account_keys()
        .unwrap();
    let odd = env
        .manager
        .ledger()
        .create(NewAccount::with_key("odd", stored.clone(), KEY_ONE))
        .unwrap();

    let consistency = env.manager.check_consistency(&odd).unwrap();
    assert_eq!(
        consistency,
        KeyConsistency::Mismatch {
            derived: KEY_ONE_ADDRESS.to_string(),
            stored: stored.clone(),
        }
    );
    let reloaded = env.manager.ledger().get_by_id(odd.id).unwrap().unwrap();
    assert_eq!(reloaded.address, stored);
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_bootstrap_creates_and_funds_defaults() {
    let env = TestEnvironment::new().await.unwrap();

    let report = env.manager.ensure_default_accounts().await.unwrap();
    assert_eq!(report.created, vec!["qa", "qb", "qc"]);
    assert_eq!(report.funded, vec!["qa", "qb", "qc"]);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    for name in ["qa", "qb", "qc"] {
        let account = env.manager.ledger().get_by_name(name).unwrap().unwrap();
        assert!(!account.is_read_only());
        assert_eq!(
            env.chain().balance(&account.address, "uzeth"),
            FAUCET_THRESHOLD_UZETH
        );
    }

    // Everything is in place now: the next pass does nothing
    let report = env.manager.ensure_default_accounts().await.unwrap();
    assert!(report.created.is_empty());
    assert!(report.funded.is_empty());
}

#[tokio::test]
async fn test_concurrent_bootstraps_share_one_pass() {
    let env = TestEnvironment::new().await.unwrap();

    let (a, b, c) = tokio::join!(
        env.manager.ensure_default_accounts(),
        env.manager.ensure_default_accounts(),
        env.manager.ensure_default_accounts()
    );
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(a.created.len(), 3);

    assert_eq!(env.manager.ledger().count().unwrap(), 3);
    for name in ["qa", "qb", "qc"] {
        let account = env.manager.ledger().get_by_name(name).unwrap().unwrap();
        // Funded exactly once
        assert_eq!(
            env.chain().balance(&account.address, "uzeth"),
            FAUCET_THRESHOLD_UZETH
        );
    }
}

#[tokio::test]
async fn test_bootstrap_keeps_existing_defaults() {
    let env = TestEnvironment::new().await.unwrap();
    let qa = env.manager.import_private_key("qa", KEY_ONE).unwrap();
    env.chain().fund(&qa.address, 5 * FAUCET_THRESHOLD_UZETH, "uzeth");

    let report = env.manager.ensure_default_accounts().await.unwrap();

    assert_eq!(report.created, vec!["qb", "qc"]);
    assert_eq!(report.funded, vec!["qb", "qc"]);
    let qa_now = env.manager.ledger().get_by_name("qa").unwrap().unwrap();
    assert_eq!(qa_now.address, KEY_ONE_ADDRESS);
}

#[tokio::test]
async fn test_bootstrap_records_faucet_failures() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let server = chain_mock::spawn(Default::default()).await.unwrap();
    let config = WalletConfig {
        faucet_api: "http://127.0.0.1:9/faucet".to_string(),
        ..test_config(&server, dir.path())
    };
    let manager = AccountManager::new(config).unwrap();

    let report = manager.ensure_default_accounts().await.unwrap();

    assert_eq!(report.created.len(), 3);
    assert!(report.funded.is_empty());
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures[0].starts_with("qa: "));
}

// ============================================================================
// Balances
// ============================================================================

#[tokio::test]
async fn test_refresh_all_balances_covers_ledger() {
    let env = TestEnvironment::new().await.unwrap();
    let rich = env.funded_account("rich", 42).unwrap();
    env.manager
        .import_watch_only("watched", KEY_ONE_ADDRESS)
        .unwrap();
    let broken = env.manager.generate_account("broken").unwrap();
    env.chain().fail_balance_queries(&broken.address);

    let summary = env.manager.refresh_all_balances(2).await.unwrap();
    assert_eq!(summary.visited, 3);
    assert_eq!(summary.failed, 1);

    let book = env.manager.reconciler().balances();
    assert_eq!(book.get(&rich.address).amount_of("uzeth"), Some(42));
    // Unfunded address: known, just empty
    assert_eq!(book.get(KEY_ONE_ADDRESS).amount_of("uzeth"), Some(0));
    assert_eq!(book.get(&broken.address).amount_of("uzeth"), None);
}
