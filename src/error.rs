//! Error types for wallet operations
//!
//! One enum covers key handling, the local ledger, and both remote
//! channels. Errors are `Clone` so a shared bootstrap future can hand the
//! same failure to every awaiter.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Invalid private key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Account name already exists: {0}")]
    DuplicateName(String),

    #[error("Account address already exists: {0}")]
    DuplicateAddress(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account '{0}' is read-only (no private key)")]
    NoPrivateKey(String),

    #[error("Account '{0}' already holds a private key")]
    PrivateKeyPresent(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("Field '{field}' is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid transaction: {0}")]
    InvalidIntent(String),

    #[error("Unregistered message type: {0}")]
    UnregisteredType(String),

    #[error(
        "Cannot reach node at {endpoint} ({reason}). Make sure the node is running and the endpoint is reachable"
    )]
    EndpointUnreachable { endpoint: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Block {height} is not available (lowest available height is {lowest})")]
    BlockUnavailable { height: u64, lowest: u64 },

    #[error("Block {height} is above the current tip {tip}")]
    BlockAboveTip { height: u64, tip: u64 },

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Mining cooldown has not elapsed: {0}")]
    Cooldown(String),

    #[error("Faucet error: {0}")]
    Faucet(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Ledger file {path} is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Json(err.to_string())
    }
}

/// Coarse category used at the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The account is read-only.
    NoKey,
    /// Secret material is malformed or not a valid scalar.
    KeyInvalid,
    /// Caller input failed validation.
    Validation,
    /// Local persistence or ledger bookkeeping.
    Local,
    /// The remote endpoint could not be reached or answered badly.
    Network,
    /// The ledger rejected the transaction.
    ChainRejected,
}

impl WalletError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoPrivateKey(_) => ErrorClass::NoKey,
            Self::InvalidKeyFormat(_) | Self::InvalidKey(_) => ErrorClass::KeyInvalid,
            Self::InvalidAddress(_)
            | Self::FieldTooLong { .. }
            | Self::MalformedMessage(_)
            | Self::InvalidIntent(_)
            | Self::UnregisteredType(_)
            | Self::BlockAboveTip { .. }
            | Self::Config(_) => ErrorClass::Validation,
            Self::DuplicateName(_)
            | Self::DuplicateAddress(_)
            | Self::AccountNotFound(_)
            | Self::PrivateKeyPresent(_)
            | Self::StorageUnavailable(_) => ErrorClass::Local,
            Self::EndpointUnreachable { .. }
            | Self::Connection(_)
            | Self::Query(_)
            | Self::NotFound(_)
            | Self::BlockUnavailable { .. }
            | Self::Faucet(_) => ErrorClass::Network,
            Self::Broadcast(_) | Self::Cooldown(_) => ErrorClass::ChainRejected,
        }
    }

    /// Network failures are safe to retry by hand. Nothing else is.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Network
    }

    /// Classify a transport failure against `endpoint`.
    pub fn from_http(endpoint: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::EndpointUnreachable {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Connection(format!("{}: {}", endpoint, err))
        }
    }

    pub fn storage(err: impl Into<StorageError>) -> Self {
        Self::StorageUnavailable(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_distinguish_ui_categories() {
        assert_eq!(
            WalletError::NoPrivateKey("qa".into()).class(),
            ErrorClass::NoKey
        );
        assert_eq!(
            WalletError::InvalidKeyFormat("short".into()).class(),
            ErrorClass::KeyInvalid
        );
        assert_eq!(
            WalletError::EndpointUnreachable {
                endpoint: "http://localhost:1317".into(),
                reason: "refused".into()
            }
            .class(),
            ErrorClass::Network
        );
        assert_eq!(
            WalletError::Cooldown("wait".into()).class(),
            ErrorClass::ChainRejected
        );
    }

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(WalletError::Connection("reset".into()).is_retryable());
        assert!(!WalletError::Broadcast("insufficient funds".into()).is_retryable());
        assert!(!WalletError::DuplicateName("qa".into()).is_retryable());
    }

    #[test]
    fn test_unreachable_message_is_actionable() {
        let err = WalletError::EndpointUnreachable {
            endpoint: "http://localhost:26657".into(),
            reason: "connection refused".into(),
        };
        let text = err.to_string();
        assert!(text.contains("http://localhost:26657"));
        assert!(text.contains("node is running"));
    }

    #[test]
    fn test_storage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = WalletError::storage(io);
        assert!(matches!(err, WalletError::StorageUnavailable(StorageError::Io(_))));
    }
}
