//! Wallet configuration from environment variables
//!
//! Endpoints, chain id and ledger location. Defaults target a local
//! development node.

use std::env;
use std::path::PathBuf;

use crate::address::ADDRESS_PREFIX;
use crate::chain::signer::{GasPrice, PollConfig};
use crate::transactions::SenderPolicy;
use crate::Result;

pub const DEFAULT_REST_API: &str = "http://localhost:1317";
pub const DEFAULT_RPC_API: &str = "http://localhost:26657";
pub const DEFAULT_FAUCET_API: &str = "http://localhost:4500";
pub const DEFAULT_CHAIN_ID: &str = "zethchain";
pub const DEFAULT_GAS_PRICE: &str = "0.025uzeth";
pub const DEFAULT_LEDGER_PATH: &str = "./zeth-wallet/accounts.json";

/// Accounts the bootstrap routine guarantees.
pub const DEFAULT_ACCOUNT_NAMES: [&str; 3] = ["qa", "qb", "qc"];

/// Balance below which bootstrap asks the faucet for a top-up (100 ZETH).
pub const FAUCET_THRESHOLD_UZETH: u128 = 100_000_000;

#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Ledger REST origin
    pub rest_api: String,
    /// Node RPC origin
    pub rpc_api: String,
    /// Faucet origin
    pub faucet_api: String,
    pub chain_id: String,
    /// Bech32 prefix of addresses
    pub address_prefix: String,
    pub gas_price: GasPrice,
    /// Accounts file
    pub ledger_path: PathBuf,
    pub sender_policy: SenderPolicy,
    /// Broadcast inclusion polling
    pub poll: PollConfig,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// Environment variables:
    /// - `ZETH_REST_API`: ledger REST endpoint
    /// - `ZETH_RPC_API`: node RPC endpoint
    /// - `ZETH_FAUCET_API`: faucet endpoint
    /// - `ZETH_CHAIN_ID`: chain id signed into every transaction
    /// - `ZETH_ADDRESS_PREFIX`: bech32 prefix
    /// - `ZETH_GAS_PRICE`: e.g. `0.025uzeth`
    /// - `ZETH_LEDGER_PATH`: accounts file
    /// - `ZETH_SENDER_POLICY`: `ledger` (default) or `derived`
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Point at a remote node
    /// ZETH_REST_API=https://node.example.org/rest ZETH_CHAIN_ID=zethchain-1 cargo test
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let rest_api = var_or("ZETH_REST_API", DEFAULT_REST_API);
        let rpc_api = var_or("ZETH_RPC_API", DEFAULT_RPC_API);
        let faucet_api = var_or("ZETH_FAUCET_API", DEFAULT_FAUCET_API);
        log::info!("REST API: {}", rest_api);
        log::info!("RPC API: {}", rpc_api);
        log::info!("Faucet API: {}", faucet_api);

        let chain_id = var_or("ZETH_CHAIN_ID", DEFAULT_CHAIN_ID);
        let address_prefix = var_or("ZETH_ADDRESS_PREFIX", ADDRESS_PREFIX);
        log::info!("Chain id: {} (address prefix '{}')", chain_id, address_prefix);

        let gas_price: GasPrice = var_or("ZETH_GAS_PRICE", DEFAULT_GAS_PRICE).parse()?;
        let ledger_path = PathBuf::from(var_or("ZETH_LEDGER_PATH", DEFAULT_LEDGER_PATH));
        log::info!("Ledger file: {}", ledger_path.display());

        let sender_policy = match env::var("ZETH_SENDER_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => SenderPolicy::default(),
        };
        if sender_policy == SenderPolicy::DerivedAddress {
            log::warn!("Sender policy 'derived': key-derived addresses override the ledger");
        }

        Ok(Self {
            rest_api,
            rpc_api,
            faucet_api,
            chain_id,
            address_prefix,
            gas_price,
            ledger_path,
            sender_policy,
            poll: PollConfig::default(),
        })
    }
}

impl Default for WalletConfig {
    /// Local development defaults
    fn default() -> Self {
        Self {
            rest_api: DEFAULT_REST_API.to_string(),
            rpc_api: DEFAULT_RPC_API.to_string(),
            faucet_api: DEFAULT_FAUCET_API.to_string(),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            address_prefix: ADDRESS_PREFIX.to_string(),
            gas_price: GasPrice::default(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            sender_policy: SenderPolicy::default(),
            poll: PollConfig::default(),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_local_node() {
        let config = WalletConfig::default();
        assert_eq!(config.rest_api, "http://localhost:1317");
        assert_eq!(config.chain_id, "zethchain");
        assert_eq!(config.gas_price.to_string(), "0.025uzeth");
        assert_eq!(config.sender_policy, SenderPolicy::LedgerAddress);
    }

    #[test]
    fn test_var_or_ignores_blank_values() {
        env::set_var("ZETH_CONFIG_TEST_BLANK", "   ");
        assert_eq!(var_or("ZETH_CONFIG_TEST_BLANK", "fallback"), "fallback");
        env::set_var("ZETH_CONFIG_TEST_SET", " value ");
        assert_eq!(var_or("ZETH_CONFIG_TEST_SET", "fallback"), "value");
    }
}
