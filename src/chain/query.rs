//! Read-only query channel

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::*;
use crate::error::WalletError;
use crate::Result;

/// Page size of event-filtered transaction searches.
pub const SEARCH_PAGE_LIMIT: u32 = 100;

/// Read-only view of the remote ledger.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn balances(&self, address: &str) -> Result<Vec<Coin>>;

    async fn total_supply(&self, denom: &str) -> Result<Coin>;

    async fn latest_block(&self) -> Result<BlockResponse>;

    async fn block_at(&self, height: u64) -> Result<BlockResponse>;

    async fn tx_by_hash(&self, hash: &str) -> Result<GetTxResponse>;

    /// One page of transactions matching a `key='value'` event filter.
    async fn search_txs(&self, event_filter: &str) -> Result<TxSearchResponse>;

    async fn node_status(&self) -> Result<NodeStatus>;

    async fn chain_stats(&self) -> Result<ChainStats>;

    async fn mining_history(&self, address: &str) -> Result<MiningHistory>;
}

/// [`ChainQuery`] over the ledger's REST origin (plus the RPC origin for
/// node status).
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    rest_url: String,
    rpc_url: String,
}

impl RestClient {
    pub fn new(rest_url: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: trim_base(rest_url.into()),
            rpc_url: trim_base(rpc_url.into()),
        }
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", base, path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| WalletError::from_http(base, &e))?;

        decode_response(&url, response).await
    }
}

/// Map a REST response to `T`, or to `NotFound`/`Query` carrying the body
/// text the node sent back.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        return Err(if status == reqwest::StatusCode::NOT_FOUND {
            WalletError::NotFound(format!("{}: {}", url, detail))
        } else {
            WalletError::Query(format!("{} returned {}: {}", url, status.as_u16(), detail))
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| WalletError::Query(format!("{}: unexpected response: {}", url, e)))
}

/// Pull `message` out of a gateway error body, or fall back to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub(crate) fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[async_trait]
impl ChainQuery for RestClient {
    async fn balances(&self, address: &str) -> Result<Vec<Coin>> {
        let resp: BalancesResponse = self
            .get_json(
                &self.rest_url,
                &format!("/cosmos/bank/v1beta1/balances/{}", address),
                &[],
            )
            .await?;
        Ok(resp.balances)
    }

    async fn total_supply(&self, denom: &str) -> Result<Coin> {
        let resp: SupplyResponse = self
            .get_json(
                &self.rest_url,
                &format!("/cosmos/bank/v1beta1/supply/{}", denom),
                &[],
            )
            .await?;
        Ok(resp.amount)
    }

    async fn latest_block(&self) -> Result<BlockResponse> {
        self.get_json(
            &self.rest_url,
            "/cosmos/base/tendermint/v1beta1/blocks/latest",
            &[],
        )
        .await
    }

    async fn block_at(&self, height: u64) -> Result<BlockResponse> {
        self.get_json(
            &self.rest_url,
            &format!("/cosmos/base/tendermint/v1beta1/blocks/{}", height),
            &[],
        )
        .await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<GetTxResponse> {
        self.get_json(
            &self.rest_url,
            &format!("/cosmos/tx/v1beta1/txs/{}", hash),
            &[],
        )
        .await
    }

    async fn search_txs(&self, event_filter: &str) -> Result<TxSearchResponse> {
        self.get_json(
            &self.rest_url,
            "/cosmos/tx/v1beta1/txs",
            &[
                ("events", event_filter.to_string()),
                ("pagination.limit", SEARCH_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    async fn node_status(&self) -> Result<NodeStatus> {
        let envelope: RpcEnvelope<NodeStatus> =
            self.get_json(&self.rpc_url, "/status", &[]).await?;
        Ok(envelope.result)
    }

    async fn chain_stats(&self) -> Result<ChainStats> {
        self.get_json(&self.rest_url, "/zethchain/explorer/v1/chain_stats", &[])
            .await
    }

    async fn mining_history(&self, address: &str) -> Result<MiningHistory> {
        self.get_json(
            &self.rest_url,
            "/zethchain/mining/v1/mining_history",
            &[("address", address.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_gateway_message() {
        let body = r#"{"code":3,"message":"height 5 is not available, lowest height is 100","details":[]}"#;
        assert_eq!(
            error_detail(body),
            "height 5 is not available, lowest height is 100"
        );
        assert_eq!(error_detail("  plain text \n"), "plain text");
    }

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let client = RestClient::new("http://localhost:1317/", "http://localhost:26657");
        assert_eq!(client.rest_url(), "http://localhost:1317");
    }
}
