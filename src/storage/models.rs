//! Data models for ledger storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    /// 64 hex characters. `None` for read-only accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub on_chain: bool,
}

impl Account {
    pub fn is_read_only(&self) -> bool {
        self.private_key.is_none()
    }

    pub(crate) fn matches_keyword(&self, keyword_lower: &str) -> bool {
        self.name.to_lowercase().contains(keyword_lower)
            || self.address.to_lowercase().contains(keyword_lower)
    }
}

/// Input to [`AccountLedger::create`](super::AccountLedger::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub address: String,
    pub private_key: Option<String>,
}

impl NewAccount {
    pub fn with_key(
        name: impl Into<String>,
        address: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            private_key: Some(private_key.into()),
        }
    }

    pub fn watch_only(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            private_key: None,
        }
    }
}

/// On-disk shape of the ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub version: u32,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            accounts: Vec::new(),
        }
    }
}
