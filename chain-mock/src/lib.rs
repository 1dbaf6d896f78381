/// Chain Mock Server Library
///
/// In-memory stand-in for a ZETH node's REST gateway, RPC status endpoint
/// and faucet. Used by the wallet's integration tests and runnable as a
/// standalone binary for local development.

pub mod handlers;
pub mod proto;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use server::{create_router, run_server, spawn, MockServer};
pub use state::{MockChain, MockConfig, MockError};
