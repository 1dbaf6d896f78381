//! ZETH Wallet: local key management and chain reconciliation
//!
//! This crate holds key-pairs locally, derives ZETH addresses from them,
//! signs and broadcasts transfers and mining transactions, and keeps a
//! local view of balances, on-chain status and history in step with the
//! ledger.
//!
//! # Architecture
//!
//! - **Address codec**: secp256k1 key -> bech32 address
//! - **Account ledger**: durable store of named accounts
//! - **Mine message codec**: hand-written encoder for `MsgMine`
//! - **Transaction engine**: sign, simulate and broadcast over a signing channel
//! - **Chain reconciler**: batched balance, history and block refresh
//!
//! # Example
//!
//! ```ignore
//! use zeth_wallet::{AccountManager, WalletConfig};
//!
//! let manager = AccountManager::new(WalletConfig::from_env()?)?;
//! manager.ensure_default_accounts().await?;
//!
//! let qa = manager.ledger().get_by_name("qa")?.unwrap();
//! let result = manager
//!     .send_transfer(qa.id, "zeth1...", 1_000_000, "uzeth", None)
//!     .await?;
//! println!("{}", zeth_wallet::explain_failure(&result));
//! ```

// Public modules
pub mod address;
pub mod chain;
pub mod config;
pub mod error;
pub mod faucet;
pub mod format;
pub mod manager;
pub mod mine_msg;
pub mod reconciler;
pub mod storage;
pub mod transactions;

// Re-exports for convenience
pub use address::{
    generate_private_key, parse_private_key_hex, private_key_to_hex, AddressCodec, ADDRESS_PREFIX,
};
pub use chain::{ChainQuery, Coin, RestClient, RestSigningConnector, SigningChannel, SigningConnector};
pub use config::WalletConfig;
pub use error::{ErrorClass, StorageError, WalletError};
pub use faucet::{FaucetClient, FaucetResponse};
pub use format::{format_zeth, parse_coin, shorten_address, zeth_to_uzeth, NATIVE_DENOM};
pub use manager::{AccountManager, BootstrapReport, KeyConsistency};
pub use mine_msg::{MsgMine, MSG_MINE_TYPE_URL};
pub use reconciler::{
    recent_heights, tx_hash_from_base64, BalanceBook, BalanceStatus, BalanceUpdate, BlockDetail,
    BlockTransaction, ChainReconciler, HistoryEntry, MessageSummary,
};
pub use storage::{Account, AccountLedger, LedgerFile, NewAccount};
pub use transactions::{
    explain_failure, is_success, MineParams, SenderPolicy, SigningSession, TransactionEngine,
    TransactionIntent, TransactionResult,
};

// Common result type
pub type Result<T> = std::result::Result<T, WalletError>;
