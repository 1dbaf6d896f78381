//! Remote ledger channels
//!
//! - `query`: read-only REST/RPC queries
//! - `signer`: signing, simulation and broadcast
//! - `proto`: protobuf envelopes for signed transactions
//! - `types`: JSON response shapes

pub mod proto;
pub mod query;
pub mod signer;
pub mod types;

pub use query::{ChainQuery, RestClient, SEARCH_PAGE_LIMIT};
pub use signer::{
    auto_gas_limit, Fee, FeeSetting, GasPrice, MessageEncoder, PollConfig, Registry,
    RestSigningConnector, SigningChannel, SigningConnector, TxMessage,
};
pub use types::{
    BlockResponse, ChainStats, Coin, GetTxResponse, MiningHistory, NodeStatus, Tx, TxResponse,
    TxSearchResponse,
};
