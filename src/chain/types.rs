//! Response shapes of the ledger's REST and RPC surfaces
//!
//! Integers arrive as JSON strings (`"12"`), occasionally as numbers.
//! Fields are required unless the remote contract allows them to be
//! omitted (timestamps, memos, empty pages).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// String-or-number integers, serialized back as strings.
pub(crate) mod num_str {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<T, D::Error>
    where
        T: FromStr + TryFrom<u64>,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(d)? {
            Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
            Raw::Number(n) => {
                T::try_from(n).map_err(|_| de::Error::custom(format!("{} out of range", n)))
            }
        }
    }
}

/// RFC 3339 timestamp that may be missing or sent as `""`.
pub(crate) mod opt_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_str(&ts.to_rfc3339()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "num_str")]
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancesResponse {
    #[serde(default)]
    pub balances: Vec<Coin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplyResponse {
    pub amount: Coin,
}

// ============================================================================
// Blocks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockId {
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(default)]
    pub chain_id: String,
    #[serde(with = "num_str")]
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub last_block_id: BlockId,
    #[serde(default)]
    pub proposer_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// Base64-encoded raw transactions.
    #[serde(default)]
    pub txs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub data: BlockData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    #[serde(default)]
    pub block_id: BlockId,
    pub block: Block,
}

impl BlockResponse {
    pub fn height(&self) -> u64 {
        self.block.header.height
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Execution metadata of a transaction, as reported by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(with = "num_str", default)]
    pub height: u64,
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(with = "num_str", default)]
    pub gas_wanted: u64,
    #[serde(with = "num_str", default)]
    pub gas_used: u64,
    #[serde(with = "opt_timestamp", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Decoded transaction body. Messages stay as JSON tagged by `@type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxBodyJson {
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    #[serde(default)]
    pub body: TxBodyJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetTxResponse {
    #[serde(default)]
    pub tx: Option<Tx>,
    pub tx_response: TxResponse,
}

/// One page of an event-filtered search. `txs[i]` belongs to `tx_responses[i]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxSearchResponse {
    #[serde(default)]
    pub txs: Vec<Tx>,
    #[serde(default)]
    pub tx_responses: Vec<TxResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResponse {
    pub tx_response: TxResponse,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GasInfo {
    #[serde(with = "num_str", default)]
    pub gas_wanted: u64,
    #[serde(with = "num_str", default)]
    pub gas_used: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulateResponse {
    pub gas_info: GasInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxBytesRequest<'a> {
    pub tx_bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'a str>,
}

// ============================================================================
// Accounts and node
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BaseAccount {
    #[serde(default)]
    pub address: String,
    #[serde(with = "num_str", default)]
    pub account_number: u64,
    #[serde(with = "num_str", default)]
    pub sequence: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub account: BaseAccount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultNodeInfo {
    /// The chain id.
    pub network: String,
    #[serde(default)]
    pub moniker: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfoResponse {
    pub default_node_info: DefaultNodeInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    #[serde(with = "num_str")]
    pub latest_block_height: u64,
    #[serde(with = "opt_timestamp", default)]
    pub latest_block_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub catching_up: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    pub node_info: DefaultNodeInfo,
    pub sync_info: SyncInfo,
}

/// JSON-RPC envelope of the RPC origin.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: T,
}

// ============================================================================
// Custom modules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    #[serde(with = "num_str", alias = "blockHeight")]
    pub block_height: u64,
    #[serde(alias = "totalSupply")]
    pub total_supply: String,
    #[serde(with = "num_str", alias = "validatorCount")]
    pub validator_count: u64,
}

/// Per-address mining record. Zeros for an address that never mined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningHistory {
    /// Unix seconds of the last successful mine.
    #[serde(with = "num_str", alias = "lastMineTime", default)]
    pub last_mine_time: u64,
    #[serde(with = "num_str", alias = "totalMined", default)]
    pub total_mined: u128,
    #[serde(with = "num_str", alias = "mineCount", default)]
    pub mine_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_amount_from_string_or_number() {
        let a: Coin = serde_json::from_str(r#"{"denom":"uzeth","amount":"100000000"}"#).unwrap();
        let b: Coin = serde_json::from_str(r#"{"denom":"uzeth","amount":100000000}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "100000000uzeth");
        assert_eq!(
            serde_json::to_value(&a).unwrap()["amount"],
            serde_json::json!("100000000")
        );
    }

    #[test]
    fn test_tx_response_tolerates_empty_timestamp() {
        let json = r#"{
            "height": "0",
            "txhash": "ABCD",
            "code": 0,
            "raw_log": "",
            "gas_wanted": "0",
            "gas_used": "0",
            "timestamp": ""
        }"#;
        let resp: TxResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.timestamp, None);
        assert_eq!(resp.txhash, "ABCD");
    }

    #[test]
    fn test_tx_response_parses_nanosecond_timestamp() {
        let json = r#"{"height":"12","txhash":"AA","timestamp":"2024-05-01T10:00:00.123456789Z"}"#;
        let resp: TxResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.height, 12);
        assert!(resp.timestamp.is_some());
    }

    #[test]
    fn test_chain_stats_accepts_camel_case() {
        let stats: ChainStats = serde_json::from_str(
            r#"{"blockHeight":"42","totalSupply":"21000000000","validatorCount":"1"}"#,
        )
        .unwrap();
        assert_eq!(stats.block_height, 42);
        assert_eq!(stats.validator_count, 1);
    }

    #[test]
    fn test_block_without_txs() {
        let json = r#"{
            "block_id": {"hash": "qg=="},
            "block": {"header": {"height": "7", "time": "2024-05-01T10:00:00Z"}, "data": {}}
        }"#;
        let block: BlockResponse = serde_json::from_str(json).unwrap();
        assert_eq!(block.height(), 7);
        assert!(block.block.data.txs.is_empty());
    }
}
