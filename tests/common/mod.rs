//! Common test utilities for wallet integration tests
//!
//! This module provides shared test infrastructure including:
//! - An in-process chain mock on a loopback port
//! - A ledger file in a temporary directory
//! - Fast broadcast polling so inclusion is observed within milliseconds

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use chain_mock::{MockChain, MockConfig, MockServer};
use tempfile::TempDir;
use zeth_wallet::chain::signer::PollConfig;
use zeth_wallet::{Account, AccountManager, WalletConfig};

/// Private key 1, the smallest valid scalar.
pub const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
pub const KEY_ONE_ADDRESS: &str = "zeth1w508d6qejxtdg4y5r3zarvary0c5xw7kdpjwtf";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(50),
        timeout: Duration::from_secs(5),
    }
}

/// Wallet configuration pointing every endpoint at `server`.
pub fn test_config(server: &MockServer, dir: &Path) -> WalletConfig {
    WalletConfig {
        rest_api: server.url.clone(),
        rpc_api: server.url.clone(),
        faucet_api: server.faucet_url(),
        ledger_path: dir.join("accounts.json"),
        poll: fast_poll(),
        ..WalletConfig::default()
    }
}

/// Test environment with automatic cleanup
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub server: MockServer,
    pub manager: AccountManager,
}

impl TestEnvironment {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_mock(MockConfig::default()).await
    }

    pub async fn with_mock(mock: MockConfig) -> anyhow::Result<Self> {
        init_logging();
        let temp_dir = TempDir::new()?;
        log::info!("📁 Test directory: {:?}", temp_dir.path());

        let server = chain_mock::spawn(mock).await?;
        log::info!("⛓️  Chain mock: {}", server.url);

        let manager = AccountManager::new(test_config(&server, temp_dir.path()))?;
        Ok(Self {
            temp_dir,
            server,
            manager,
        })
    }

    pub fn chain(&self) -> &MockChain {
        &self.server.chain
    }

    /// Fresh ledger account holding `uzeth` on the mock chain.
    pub fn funded_account(&self, name: &str, uzeth: u128) -> anyhow::Result<Account> {
        let account = self.manager.generate_account(name)?;
        self.chain().fund(&account.address, uzeth, "uzeth");
        Ok(account)
    }
}
