/// Axum HTTP handlers for the node's REST, RPC and faucet endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::{MockChain, MockError};
use crate::types::*;

/// Shared application state
pub type AppState = Arc<MockChain>;

const PROPOSER: &str = "chain-mock-validator";

/// Custom error type for handlers
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // gRPC status codes the gateway reports alongside the HTTP status
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, 5, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 3, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, 13, msg),
        };

        let body = ErrorBody {
            code,
            message,
            details: Vec::new(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MockError> for ApiError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::NotFound(msg) => ApiError::NotFound(msg),
            MockError::BadRequest(msg) => ApiError::BadRequest(msg),
            MockError::Unavailable(msg) => ApiError::Internal(msg),
        }
    }
}

fn node_info(chain: &MockChain) -> NodeInfoJson {
    NodeInfoJson {
        network: chain.config().chain_id.clone(),
        moniker: "chain-mock".to_string(),
        version: "0.38.0".to_string(),
    }
}

fn decode_tx_bytes(encoded: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("tx_bytes is not valid base64: {}", e)))
}

/// GET /cosmos/base/tendermint/v1beta1/node_info
pub async fn get_node_info(State(chain): State<AppState>) -> Json<NodeInfoResponse> {
    Json(NodeInfoResponse {
        default_node_info: node_info(&chain),
    })
}

/// GET /status
/// Node RPC status, wrapped in a JSON-RPC envelope
pub async fn get_status(State(chain): State<AppState>) -> Json<StatusResponse> {
    let tip = chain.latest_block();
    Json(StatusResponse {
        jsonrpc: "2.0".to_string(),
        id: -1,
        result: StatusResult {
            node_info: node_info(&chain),
            sync_info: SyncInfoJson {
                latest_block_hash: hex::encode_upper(&tip.hash),
                latest_block_height: tip.height.to_string(),
                latest_block_time: tip.time.to_rfc3339(),
                catching_up: false,
            },
        },
    })
}

/// GET /cosmos/auth/v1beta1/accounts/{address}
pub async fn get_account(
    State(chain): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = chain
        .account(&address)
        .ok_or_else(|| ApiError::NotFound(format!("account {} not found", address)))?;
    Ok(Json(AccountResponse {
        account: BaseAccountJson {
            type_url: "/cosmos.auth.v1beta1.BaseAccount".to_string(),
            address,
            pub_key: None,
            account_number: account.account_number.to_string(),
            sequence: account.sequence.to_string(),
        },
    }))
}

/// GET /cosmos/bank/v1beta1/balances/{address}
pub async fn get_balances(
    State(chain): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BalancesResponse>, ApiError> {
    let balances: Vec<CoinJson> = chain
        .balances(&address)?
        .into_iter()
        .map(|(denom, amount)| CoinJson::new(denom, amount))
        .collect();
    let total = balances.len().to_string();
    Ok(Json(BalancesResponse {
        balances,
        pagination: Pagination {
            next_key: None,
            total,
        },
    }))
}

/// GET /cosmos/bank/v1beta1/supply/{denom}
pub async fn get_supply(
    State(chain): State<AppState>,
    Path(denom): Path<String>,
) -> Json<SupplyResponse> {
    let amount = chain.total_supply(&denom);
    Json(SupplyResponse {
        amount: CoinJson::new(denom, amount),
    })
}

/// GET /cosmos/base/tendermint/v1beta1/blocks/latest
pub async fn get_latest_block(State(chain): State<AppState>) -> Json<BlockResponse> {
    let block = chain.latest_block();
    Json(BlockResponse::from_block(
        &block,
        &chain.config().chain_id,
        PROPOSER,
    ))
}

/// GET /cosmos/base/tendermint/v1beta1/blocks/{height}
pub async fn get_block(
    State(chain): State<AppState>,
    Path(height): Path<String>,
) -> Result<Json<BlockResponse>, ApiError> {
    let height: u64 = height
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid height: {}", height)))?;
    let block = chain.block(height)?;
    Ok(Json(BlockResponse::from_block(
        &block,
        &chain.config().chain_id,
        PROPOSER,
    )))
}

/// POST /cosmos/tx/v1beta1/simulate
pub async fn simulate(
    State(chain): State<AppState>,
    Json(req): Json<TxBytesRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    let tx_bytes = decode_tx_bytes(&req.tx_bytes)?;
    let gas = chain.simulate(&tx_bytes)?;
    Ok(Json(SimulateResponse {
        gas_info: GasInfoJson {
            gas_wanted: "0".to_string(),
            gas_used: gas.to_string(),
        },
    }))
}

/// POST /cosmos/tx/v1beta1/txs
/// Sync broadcast: the response carries the check result only
pub async fn broadcast_transaction(
    State(chain): State<AppState>,
    Json(req): Json<TxBytesRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    if let Some(mode) = req.mode.as_deref() {
        if mode != "BROADCAST_MODE_SYNC" {
            return Err(ApiError::BadRequest(format!(
                "unsupported broadcast mode {}",
                mode
            )));
        }
    }
    let tx_bytes = decode_tx_bytes(&req.tx_bytes)?;
    let check = chain.broadcast(&tx_bytes)?;

    Ok(Json(BroadcastResponse {
        tx_response: TxResponseJson {
            height: "0".to_string(),
            txhash: check.txhash,
            codespace: check.codespace,
            code: check.code,
            raw_log: check.raw_log,
            gas_wanted: "0".to_string(),
            gas_used: "0".to_string(),
            timestamp: String::new(),
        },
    }))
}

/// GET /cosmos/tx/v1beta1/txs/{hash}
pub async fn get_transaction(
    State(chain): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<GetTxResponse>, ApiError> {
    let tx = chain
        .tx(&hash)
        .ok_or_else(|| ApiError::NotFound(format!("tx not found: {}", hash)))?;
    Ok(Json(GetTxResponse {
        tx: TxJson::from(&tx),
        tx_response: TxResponseJson::from(&tx),
    }))
}

/// GET /cosmos/tx/v1beta1/txs?events=...
/// Supports `message.sender='...'` and `transfer.recipient='...'`
pub async fn search_transactions(
    State(chain): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SearchResponse>, ApiError> {
    let filter = params
        .get("events")
        .ok_or_else(|| ApiError::BadRequest("event query cannot be empty".to_string()))?;
    let (key, value) = parse_event_filter(filter)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid event query: {}", filter)))?;
    let limit = params
        .get("pagination.limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(100);

    let found = match key {
        "message.sender" => chain.search(Some(value), None),
        "transfer.recipient" => chain.search(None, Some(value)),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported event key: {}",
                other
            )))
        }
    };
    let total = found.len().to_string();
    let page: Vec<_> = found.into_iter().take(limit).collect();

    Ok(Json(SearchResponse {
        txs: page.iter().map(TxJson::from).collect(),
        tx_responses: page.iter().map(TxResponseJson::from).collect(),
        total,
    }))
}

/// Split `key='value'` into its parts
fn parse_event_filter(filter: &str) -> Option<(&str, &str)> {
    let (key, value) = filter.split_once('=')?;
    let value = value.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some((key.trim(), value))
}

/// GET /zethchain/explorer/v1/chain_stats
pub async fn get_chain_stats(State(chain): State<AppState>) -> Json<ChainStatsResponse> {
    let denom = chain.config().denom.clone();
    Json(ChainStatsResponse {
        block_height: chain.height().to_string(),
        total_supply: format!("{}{}", chain.total_supply(&denom), denom),
        validator_count: "1".to_string(),
    })
}

/// GET /zethchain/mining/v1/mining_history?address=...
pub async fn get_mining_history(
    State(chain): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<MiningHistoryResponse>, ApiError> {
    let address = params
        .get("address")
        .ok_or_else(|| ApiError::BadRequest("address is required".to_string()))?;
    let record = chain.mining_record(address);
    Ok(Json(MiningHistoryResponse {
        last_mine_time: record
            .last_mine_time
            .map(|t| t.timestamp().max(0) as u64)
            .unwrap_or(0)
            .to_string(),
        total_mined: record.total_mined.to_string(),
        mine_count: record.mine_count.to_string(),
    }))
}

/// POST /faucet
/// Credits each requested coin and reports one result per coin
pub async fn faucet_credit(
    State(chain): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Json<FaucetResponse>, ApiError> {
    let prefix = format!("{}1", chain.config().address_prefix);
    if !req.address.starts_with(&prefix) {
        return Err(ApiError::BadRequest(format!(
            "invalid address: {}",
            req.address
        )));
    }

    let mut results = Vec::with_capacity(req.coins.len());
    for coin in &req.coins {
        let (amount, denom) = split_coin(coin)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid coin: {}", coin)))?;
        chain.fund(&req.address, amount, denom);
        results.push(json!({ "coin": coin, "code": 0, "stdout": "", "stderr": "" }));
    }
    Ok(Json(FaucetResponse { results }))
}

/// Split `100uzeth` into amount and denom
fn split_coin(coin: &str) -> Option<(u128, &str)> {
    let split = coin.find(|c: char| !c.is_ascii_digit())?;
    let (amount, denom) = coin.split_at(split);
    Some((amount.parse().ok()?, denom))
}

/// POST /mock/fund
/// Development helper crediting an address directly
pub async fn fund_address(
    State(chain): State<AppState>,
    Json(req): Json<FundRequest>,
) -> Result<StatusCode, ApiError> {
    let amount: u128 = req
        .amount
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid amount: {}", req.amount)))?;
    let denom = req.denom.unwrap_or_else(|| chain.config().denom.clone());
    chain.fund(&req.address, amount, &denom);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_filter() {
        assert_eq!(
            parse_event_filter("message.sender='zeth1abc'"),
            Some(("message.sender", "zeth1abc"))
        );
        assert_eq!(parse_event_filter("message.sender=zeth1abc"), None);
        assert_eq!(parse_event_filter("nonsense"), None);
    }

    #[test]
    fn test_split_coin() {
        assert_eq!(split_coin("100000000uzeth"), Some((100_000_000, "uzeth")));
        assert_eq!(split_coin("uzeth"), None);
        assert_eq!(split_coin("100"), None);
    }
}
