/// REST gateway response types
///
/// Field names and string-encoded integers follow the gRPC gateway's JSON
/// so the wallet consumes them exactly as it would a real node's.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{MockBlock, StoredTx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinJson {
    pub denom: String,
    pub amount: String,
}

impl CoinJson {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub next_key: Option<String>,
    pub total: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesResponse {
    pub balances: Vec<CoinJson>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyResponse {
    pub amount: CoinJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseAccountJson {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub address: String,
    pub pub_key: Option<Value>,
    pub account_number: String,
    pub sequence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: BaseAccountJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoJson {
    pub network: String,
    pub moniker: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoResponse {
    pub default_node_info: NodeInfoJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockIdJson {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeaderJson {
    pub chain_id: String,
    pub height: String,
    pub time: String,
    pub last_block_id: BlockIdJson,
    pub proposer_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDataJson {
    pub txs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockJson {
    pub header: BlockHeaderJson,
    pub data: BlockDataJson,
}

/// Response of `/cosmos/base/tendermint/v1beta1/blocks/{height}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub block_id: BlockIdJson,
    pub block: BlockJson,
}

impl BlockResponse {
    pub fn from_block(block: &MockBlock, chain_id: &str, proposer: &str) -> Self {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        Self {
            block_id: BlockIdJson {
                hash: BASE64.encode(&block.hash),
            },
            block: BlockJson {
                header: BlockHeaderJson {
                    chain_id: chain_id.to_string(),
                    height: block.height.to_string(),
                    time: block.time.to_rfc3339(),
                    last_block_id: BlockIdJson {
                        hash: BASE64.encode(&block.parent_hash),
                    },
                    proposer_address: proposer.to_string(),
                },
                data: BlockDataJson {
                    txs: block.txs.iter().map(|tx| BASE64.encode(tx)).collect(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponseJson {
    pub height: String,
    pub txhash: String,
    pub codespace: String,
    pub code: u32,
    pub raw_log: String,
    pub gas_wanted: String,
    pub gas_used: String,
    pub timestamp: String,
}

impl From<&StoredTx> for TxResponseJson {
    fn from(tx: &StoredTx) -> Self {
        Self {
            height: tx.height.to_string(),
            txhash: tx.hash.clone(),
            codespace: tx.codespace.clone(),
            code: tx.code,
            raw_log: tx.raw_log.clone(),
            gas_wanted: tx.gas_wanted.to_string(),
            gas_used: tx.gas_used.to_string(),
            timestamp: tx.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBodyJson {
    pub messages: Vec<Value>,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxJson {
    pub body: TxBodyJson,
}

impl From<&StoredTx> for TxJson {
    fn from(tx: &StoredTx) -> Self {
        Self {
            body: TxBodyJson {
                messages: tx.messages.clone(),
                memo: tx.memo.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTxResponse {
    pub tx: TxJson,
    pub tx_response: TxResponseJson,
}

/// Response of the event search; `txs[i]` pairs with `tx_responses[i]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub txs: Vec<TxJson>,
    pub tx_responses: Vec<TxResponseJson>,
    pub total: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBytesRequest {
    pub tx_bytes: String,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasInfoJson {
    pub gas_wanted: String,
    pub gas_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub gas_info: GasInfoJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub tx_response: TxResponseJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfoJson {
    pub latest_block_hash: String,
    pub latest_block_height: String,
    pub latest_block_time: String,
    pub catching_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub node_info: NodeInfoJson,
    pub sync_info: SyncInfoJson,
}

/// JSON-RPC envelope of the node's `/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub jsonrpc: String,
    pub id: i64,
    pub result: StatusResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatsResponse {
    pub block_height: String,
    pub total_supply: String,
    pub validator_count: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningHistoryResponse {
    pub last_mine_time: String,
    pub total_mined: String,
    pub mine_count: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub address: String,
    pub coins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub results: Vec<Value>,
}

/// Body of `POST /mock/fund`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRequest {
    pub address: String,
    pub amount: String,
    #[serde(default)]
    pub denom: Option<String>,
}

/// Error body in the gateway's `{code, message, details}` shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    pub details: Vec<Value>,
}
