//! Faucet client
//!
//! The faucet performs a funded transfer server-side. Its per-coin results
//! are passed through untouched.

use serde::{Deserialize, Serialize};

use crate::chain::query::trim_base;
use crate::error::WalletError;
use crate::Result;

#[derive(Debug, Serialize)]
struct CreditRequest<'a> {
    address: &'a str,
    coins: &'a [String],
}

/// Response body of the faucet. Each entry is whatever the faucet reported
/// for one coin.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FaucetResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct FaucetClient {
    client: reqwest::Client,
    url: String,
}

impl FaucetClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: trim_base(url.into()),
        }
    }

    /// Ask the faucet to send `coins` (e.g. `"100000000uzeth"`) to `address`.
    pub async fn credit(&self, address: &str, coins: &[String]) -> Result<FaucetResponse> {
        log::info!("Requesting {:?} from faucet for {}", coins, address);
        let response = self
            .client
            .post(&self.url)
            .json(&CreditRequest { address, coins })
            .send()
            .await
            .map_err(|e| WalletError::from_http(&self.url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::Faucet(format!(
                "faucet returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WalletError::Faucet(format!("unexpected faucet response: {}", e)))
    }
}
