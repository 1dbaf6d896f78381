/// Chain Mock Server
///
/// Serves an in-memory ZETH node (REST gateway, RPC status and faucet) for
/// local wallet development.

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use chain_mock::{run_server, MockChain, MockConfig};

#[derive(Debug)]
struct Settings {
    chain: MockConfig,
    /// `address:amount` pairs credited at startup
    genesis: Vec<(String, u128)>,
    host: String,
    port: u16,
}

impl Settings {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut chain = MockConfig::default();
        if let Ok(chain_id) = env::var("MOCK_CHAIN_ID") {
            chain.chain_id = chain_id;
        }
        if let Ok(reward) = env::var("MOCK_MINE_REWARD") {
            chain.mine_reward = reward.parse().context("Invalid MOCK_MINE_REWARD")?;
        }
        if let Ok(secs) = env::var("MOCK_MINING_COOLDOWN_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid MOCK_MINING_COOLDOWN_SECS")?;
            chain.mining_cooldown = Some(Duration::from_secs(secs));
        }

        let genesis = match env::var("MOCK_GENESIS_ACCOUNTS") {
            Ok(list) => parse_genesis(&list)?,
            Err(_) => Vec::new(),
        };

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("SERVER_PORT") {
            Ok(port) => port.parse().context("Invalid SERVER_PORT")?,
            Err(_) => 1317,
        };

        Ok(Self {
            chain,
            genesis,
            host,
            port,
        })
    }
}

/// `zeth1a:1000,zeth1b:5000`
fn parse_genesis(list: &str) -> Result<Vec<(String, u128)>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (address, amount) = entry
                .split_once(':')
                .with_context(|| format!("Genesis entry '{}' is not address:amount", entry))?;
            let amount = amount
                .parse()
                .with_context(|| format!("Invalid genesis amount in '{}'", entry))?;
            Ok((address.to_string(), amount))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env().context("Failed to load configuration")?;
    log::info!(
        "Starting chain mock for '{}' (reward {}{}, cooldown {:?})",
        settings.chain.chain_id,
        settings.chain.mine_reward,
        settings.chain.denom,
        settings.chain.mining_cooldown
    );

    let chain = Arc::new(MockChain::new(settings.chain));
    for (address, amount) in &settings.genesis {
        let denom = chain.config().denom.clone();
        chain.fund(address, *amount, &denom);
    }

    run_server(chain, settings.host, settings.port)
        .await
        .context("Server error")?;

    Ok(())
}
