/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::{MockChain, MockConfig};

pub fn create_router(chain: Arc<MockChain>) -> Router {
    // Configure CORS to allow requests from wallet frontend/tests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Node endpoints
        .route("/status", get(get_status))
        .route("/cosmos/base/tendermint/v1beta1/node_info", get(get_node_info))
        .route("/cosmos/base/tendermint/v1beta1/blocks/latest", get(get_latest_block))
        .route("/cosmos/base/tendermint/v1beta1/blocks/:height", get(get_block))

        // Account endpoints
        .route("/cosmos/auth/v1beta1/accounts/:address", get(get_account))
        .route("/cosmos/bank/v1beta1/balances/:address", get(get_balances))
        .route("/cosmos/bank/v1beta1/supply/:denom", get(get_supply))

        // Transaction endpoints
        .route("/cosmos/tx/v1beta1/simulate", post(simulate))
        .route(
            "/cosmos/tx/v1beta1/txs",
            get(search_transactions).post(broadcast_transaction),
        )
        .route("/cosmos/tx/v1beta1/txs/:hash", get(get_transaction))

        // Chain modules
        .route("/zethchain/explorer/v1/chain_stats", get(get_chain_stats))
        .route("/zethchain/mining/v1/mining_history", get(get_mining_history))

        // Faucet and development helpers
        .route("/faucet", post(faucet_credit))
        .route("/mock/fund", post(fund_address))

        // Shared state
        .with_state(chain)

        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(chain: Arc<MockChain>, host: String, port: u16) -> anyhow::Result<()> {
    let app = create_router(chain.clone());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("🚀 Chain mock listening on http://{}", addr);
    log::info!("⛓️  Chain id: {}", chain.config().chain_id);
    log::info!("🚰 Faucet endpoint: POST /faucet");

    axum::serve(listener, app).await?;

    Ok(())
}

/// A mock node serving on a loopback port in the background
pub struct MockServer {
    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub url: String,
    pub chain: Arc<MockChain>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub fn faucet_url(&self) -> String {
        format!("{}/faucet", self.url)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a mock node on an ephemeral port of the current runtime.
pub async fn spawn(config: MockConfig) -> anyhow::Result<MockServer> {
    let chain = Arc::new(MockChain::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(chain.clone());

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("Chain mock stopped: {}", e);
        }
    });
    log::debug!("Chain mock serving on {}", addr);

    Ok(MockServer {
        url: format!("http://{}", addr),
        chain,
        handle,
    })
}
