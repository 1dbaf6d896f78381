//! Reconciliation of the local view with the remote ledger
//!
//! Every operation is a single pass; scheduling belongs to the caller.
//! Batch passes fan out over a fixed pool of workers that claim accounts
//! from a shared cursor, and a failure for one account never fails the
//! pass.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::UnboundedSender;

use crate::chain::proto::MSG_SEND_TYPE_URL;
use crate::chain::query::ChainQuery;
use crate::chain::types::{
    BlockResponse, ChainStats, Coin, GetTxResponse, MiningHistory, Tx, TxResponse,
    TxSearchResponse,
};
use crate::error::WalletError;
use crate::mine_msg::MSG_MINE_TYPE_URL;
use crate::storage::{Account, AccountLedger};
use crate::Result;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Gas limit shown for every block.
pub const BLOCK_GAS_LIMIT: u64 = 10_000_000;

/// History entries kept per account by [`ChainReconciler::refresh_on_chain_accounts`].
pub const RECENT_HISTORY_LEN: usize = 5;

/// Heights listed by the explorer view.
pub const RECENT_BLOCKS: usize = 20;

// ============================================================================
// Balances
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum BalanceStatus {
    /// Not fetched yet in the current pass, or the fetch failed.
    #[default]
    Unknown,
    Known(Vec<Coin>),
}

impl BalanceStatus {
    /// Amount held in `denom`; 0 for a known balance without that denom.
    pub fn amount_of(&self, denom: &str) -> Option<u128> {
        match self {
            Self::Unknown => None,
            Self::Known(coins) => Some(
                coins
                    .iter()
                    .filter(|c| c.denom == denom)
                    .map(|c| c.amount)
                    .sum(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    pub address: String,
    pub balances: Vec<Coin>,
}

/// Per-address balances, readable while a pass is filling them in.
#[derive(Debug, Default)]
pub struct BalanceBook {
    entries: RwLock<HashMap<String, BalanceStatus>>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> BalanceStatus {
        self.read().get(address).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, BalanceStatus> {
        self.read().clone()
    }

    fn reset<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) {
        let mut entries = self.write();
        for address in addresses {
            entries.insert(address.to_string(), BalanceStatus::Unknown);
        }
    }

    fn set_known(&self, address: &str, coins: Vec<Coin>) {
        self.write()
            .insert(address.to_string(), BalanceStatus::Known(coins));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, BalanceStatus>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, BalanceStatus>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counters of one batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub visited: usize,
    pub failed: usize,
}

/// Run `work` over `items` with `concurrency` workers. Each worker claims
/// the next unprocessed index until the cursor runs past the end.
pub async fn run_pool<'a, T, F, Fut>(items: &'a [T], concurrency: usize, work: F)
where
    F: Fn(usize, &'a T) -> Fut,
    Fut: Future<Output = ()>,
{
    let cursor = AtomicUsize::new(0);
    let workers = concurrency.max(1).min(items.len().max(1));
    let pool = (0..workers).map(|_| async {
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(item) = items.get(index) else {
                break;
            };
            work(index, item).await;
        }
    });
    join_all(pool).await;
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Sent,
    Received,
    /// Sender and receiver are both the queried account.
    SelfTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MessageSummary {
    Transfer {
        counterpart: String,
        amount: u128,
        denom: String,
        direction: Direction,
    },
    Mine {
        miner: String,
    },
    Other {
        type_url: String,
        raw: serde_json::Value,
    },
}

impl MessageSummary {
    /// Classify a JSON message relative to `account`.
    pub fn classify(message: &serde_json::Value, account: &str) -> Self {
        let type_url = message_type(message);
        let field = |snake: &str, camel: &str| {
            message
                .get(snake)
                .or_else(|| message.get(camel))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        if type_url == MSG_SEND_TYPE_URL {
            let from = field("from_address", "fromAddress");
            let to = field("to_address", "toAddress");
            let first_coin = message
                .get("amount")
                .and_then(|a| a.get(0))
                .and_then(|c| serde_json::from_value::<Coin>(c.clone()).ok());
            let (amount, denom) = first_coin
                .map(|c| (c.amount, c.denom))
                .unwrap_or((0, String::new()));
            let (direction, counterpart) = if from == account && to == account {
                (Direction::SelfTransfer, to)
            } else if from == account {
                (Direction::Sent, to)
            } else if to == account {
                (Direction::Received, from)
            } else {
                return Self::Other {
                    type_url,
                    raw: message.clone(),
                };
            };
            return Self::Transfer {
                counterpart,
                amount,
                denom,
                direction,
            };
        }
        if type_url == MSG_MINE_TYPE_URL {
            return Self::Mine {
                miner: field("miner", "miner"),
            };
        }
        Self::Other {
            type_url,
            raw: message.clone(),
        }
    }
}

fn message_type(message: &serde_json::Value) -> String {
    message
        .get("@type")
        .or_else(|| message.get("type_url"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Empty when the ledger returned a transaction without its response.
    pub tx_hash: String,
    pub height: u64,
    pub code: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub memo: String,
    pub raw_log: String,
    pub gas_used: u64,
    pub gas_wanted: u64,
    pub messages: Vec<MessageSummary>,
}

impl HistoryEntry {
    fn from_parts(tx: Option<&Tx>, resp: Option<&TxResponse>, account: &str) -> Self {
        let resp = resp.cloned().unwrap_or_default();
        let (memo, messages) = match tx {
            Some(tx) => (
                tx.body.memo.clone(),
                tx.body
                    .messages
                    .iter()
                    .map(|m| MessageSummary::classify(m, account))
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        };
        Self {
            tx_hash: resp.txhash,
            height: resp.height,
            code: resp.code,
            timestamp: resp.timestamp,
            memo,
            raw_log: resp.raw_log,
            gas_used: resp.gas_used,
            gas_wanted: resp.gas_wanted,
            messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    fn involves_transfer(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, MessageSummary::Transfer { .. }))
    }
}

/// Merge pages of search results: pair `txs[i]` with `tx_responses[i]`,
/// drop repeats by hash (or by the serialized transaction when the hash is
/// missing) and order newest first. Entries without a timestamp sort as
/// the epoch.
pub fn merge_history(pages: &[TxSearchResponse], account: &str) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for page in pages {
        let len = page.txs.len().max(page.tx_responses.len());
        for i in 0..len {
            let tx = page.txs.get(i);
            let resp = page.tx_responses.get(i);
            let key = match resp {
                Some(r) if !r.txhash.is_empty() => r.txhash.clone(),
                _ => serde_json::to_string(&tx).unwrap_or_default(),
            };
            if seen.insert(key) {
                merged.push(HistoryEntry::from_parts(tx, resp, account));
            }
        }
    }
    merged.sort_by(|a, b| {
        let ta = a.timestamp.unwrap_or_default();
        let tb = b.timestamp.unwrap_or_default();
        tb.cmp(&ta)
    });
    merged
}

// ============================================================================
// Blocks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockTransaction {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub raw_log: String,
    pub gas_used: u64,
    pub gas_wanted: u64,
    pub memo: String,
    pub messages: Vec<serde_json::Value>,
}

impl BlockTransaction {
    fn from_lookup(hash: String, found: GetTxResponse) -> Self {
        let body = found.tx.map(|t| t.body).unwrap_or_default();
        let resp = found.tx_response;
        Self {
            hash,
            height: resp.height,
            code: resp.code,
            raw_log: resp.raw_log,
            gas_used: resp.gas_used,
            gas_wanted: resp.gas_wanted,
            memo: body.memo,
            messages: body.messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn message_types(&self) -> Vec<String> {
        self.messages.iter().map(message_type).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDetail {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub time: DateTime<Utc>,
    pub proposer: String,
    pub gas_limit: u64,
    /// Sum over the transactions that could be looked up.
    pub gas_used: u64,
    /// Transactions carried by the block, including any that failed lookup.
    pub tx_count: usize,
    pub transactions: Vec<BlockTransaction>,
}

/// Canonical id of a raw transaction: upper-case hex SHA-256 of its bytes.
pub fn tx_hash_from_base64(encoded: &str) -> Result<String> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| WalletError::MalformedMessage(format!("transaction is not base64: {}", e)))?;
    Ok(hex::encode_upper(Sha256::digest(raw)))
}

/// Up to `count` heights counting down from `tip`, never below 1.
pub fn recent_heights(tip: u64, count: usize) -> Vec<u64> {
    (1..=tip).rev().take(count).collect()
}

/// Pull `N` out of "... lowest height is N".
fn lowest_available_height(message: &str) -> Option<u64> {
    let marker = "lowest height is ";
    let start = message.find(marker)? + marker.len();
    let digits: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ============================================================================
// Reconciler
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub account: Account,
    pub balances: BalanceStatus,
    pub recent: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainOverview {
    pub latest_height: u64,
    pub latest_time: DateTime<Utc>,
    pub latest_tx_count: usize,
    pub stats: ChainStats,
    pub total_supply: Coin,
}

pub struct ChainReconciler {
    query: Arc<dyn ChainQuery>,
    ledger: Arc<AccountLedger>,
    balances: Arc<BalanceBook>,
    native_denom: String,
    pass: tokio::sync::Mutex<()>,
}

impl ChainReconciler {
    pub fn new(query: Arc<dyn ChainQuery>, ledger: Arc<AccountLedger>) -> Self {
        Self {
            query,
            ledger,
            balances: Arc::new(BalanceBook::new()),
            native_denom: crate::format::NATIVE_DENOM.to_string(),
            pass: tokio::sync::Mutex::new(()),
        }
    }

    pub fn balances(&self) -> Arc<BalanceBook> {
        Arc::clone(&self.balances)
    }

    pub fn query(&self) -> &Arc<dyn ChainQuery> {
        &self.query
    }

    /// One balance pass over `accounts`.
    pub async fn refresh_balances(&self, accounts: &[Account], concurrency: usize) -> PassSummary {
        self.balance_pass(accounts, concurrency, None).await
    }

    /// Like [`refresh_balances`](Self::refresh_balances), also sending each
    /// update to `updates` as soon as it is applied.
    pub async fn refresh_balances_streaming(
        &self,
        accounts: &[Account],
        concurrency: usize,
        updates: UnboundedSender<BalanceUpdate>,
    ) -> PassSummary {
        self.balance_pass(accounts, concurrency, Some(&updates)).await
    }

    async fn balance_pass(
        &self,
        accounts: &[Account],
        concurrency: usize,
        updates: Option<&UnboundedSender<BalanceUpdate>>,
    ) -> PassSummary {
        let _pass = self.pass.lock().await;
        self.balances
            .reset(accounts.iter().map(|a| a.address.as_str()));

        let visited = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        run_pool(accounts, concurrency, |_, account| {
            let visited = &visited;
            let failed = &failed;
            async move {
                visited.fetch_add(1, Ordering::SeqCst);
                match self.query.balances(&account.address).await {
                    Ok(coins) => {
                        self.balances.set_known(&account.address, coins.clone());
                        if let Some(tx) = updates {
                            let _ = tx.send(BalanceUpdate {
                                address: account.address.clone(),
                                balances: coins,
                            });
                        }
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::SeqCst);
                        log::warn!("Balance query for '{}' failed: {}", account.name, e);
                    }
                }
            }
        })
        .await;

        let summary = PassSummary {
            visited: visited.into_inner(),
            failed: failed.into_inner(),
        };
        log::debug!(
            "Balance pass: {} accounts, {} failed",
            summary.visited,
            summary.failed
        );
        summary
    }

    /// Sent and received transactions of `account`, newest first. Marks the
    /// account on-chain when a successful transfer shows up.
    pub async fn refresh_history(&self, account: &Account) -> Result<Vec<HistoryEntry>> {
        let sent_filter = format!("message.sender='{}'", account.address);
        let received_filter = format!("transfer.recipient='{}'", account.address);
        let (sent, received) = futures::try_join!(
            self.query.search_txs(&sent_filter),
            self.query.search_txs(&received_filter)
        )?;

        let history = merge_history(&[sent, received], &account.address);
        if !account.on_chain
            && history
                .iter()
                .any(|h| h.is_success() && h.involves_transfer())
        {
            if let Err(e) = self.ledger.mark_on_chain(&account.address) {
                log::warn!("Could not mark {} on-chain: {}", account.address, e);
            }
        }
        Ok(history)
    }

    /// Look up every transaction of `block` by its reconstructed hash.
    /// Entries whose lookup fails are left out.
    pub async fn reconstruct_block_transactions(
        &self,
        block: &BlockResponse,
    ) -> Vec<BlockTransaction> {
        let lookups = block.block.data.txs.iter().map(|encoded| async move {
            let hash = match tx_hash_from_base64(encoded) {
                Ok(hash) => hash,
                Err(e) => {
                    log::warn!("Skipping undecodable transaction in block {}: {}", block.height(), e);
                    return None;
                }
            };
            match self.query.tx_by_hash(&hash).await {
                Ok(found) => Some(BlockTransaction::from_lookup(hash, found)),
                Err(e) => {
                    log::warn!("Lookup of {} failed: {}", hash, e);
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    pub async fn current_height(&self) -> Result<u64> {
        Ok(self.query.latest_block().await?.height())
    }

    pub async fn load_block(&self, height: u64) -> Result<BlockDetail> {
        let tip = self.current_height().await?;
        if height > tip {
            return Err(WalletError::BlockAboveTip { height, tip });
        }

        let block = match self.query.block_at(height).await {
            Ok(block) => block,
            Err(WalletError::Query(msg)) | Err(WalletError::NotFound(msg)) => {
                return Err(match lowest_available_height(&msg) {
                    Some(lowest) => WalletError::BlockUnavailable { height, lowest },
                    None => WalletError::Query(msg),
                });
            }
            Err(e) => return Err(e),
        };

        let transactions = self.reconstruct_block_transactions(&block).await;
        let header = &block.block.header;
        Ok(BlockDetail {
            height: header.height,
            hash: block.block_id.hash.clone(),
            parent_hash: header.last_block_id.hash.clone(),
            time: header.time,
            proposer: header.proposer_address.clone(),
            gas_limit: BLOCK_GAS_LIMIT,
            gas_used: transactions.iter().map(|t| t.gas_used).sum(),
            tx_count: block.block.data.txs.len(),
            transactions,
        })
    }

    /// Latest block, explorer stats and native supply, fetched together.
    pub async fn chain_overview(&self) -> Result<ChainOverview> {
        let (latest, stats, total_supply) = futures::try_join!(
            self.query.latest_block(),
            self.query.chain_stats(),
            self.query.total_supply(&self.native_denom)
        )?;
        Ok(ChainOverview {
            latest_height: latest.height(),
            latest_time: latest.block.header.time,
            latest_tx_count: latest.block.data.txs.len(),
            stats,
            total_supply,
        })
    }

    pub async fn mining_history(&self, address: &str) -> Result<MiningHistory> {
        self.query.mining_history(address).await
    }

    pub async fn lookup_transaction(&self, hash: &str) -> Result<BlockTransaction> {
        let hash = hash.trim().to_uppercase();
        let found = self.query.tx_by_hash(&hash).await?;
        Ok(BlockTransaction::from_lookup(hash, found))
    }

    /// Balances and the latest few transactions of every on-chain account.
    pub async fn refresh_on_chain_accounts(
        &self,
        concurrency: usize,
    ) -> Result<Vec<AccountSnapshot>> {
        let accounts = self.ledger.list_on_chain()?;
        let _pass = self.pass.lock().await;
        self.balances
            .reset(accounts.iter().map(|a| a.address.as_str()));

        let slots: Mutex<Vec<Option<AccountSnapshot>>> = Mutex::new(vec![None; accounts.len()]);
        run_pool(&accounts, concurrency, |index, account| {
            let slots = &slots;
            async move {
                let balances = match self.query.balances(&account.address).await {
                    Ok(coins) => {
                        self.balances.set_known(&account.address, coins.clone());
                        BalanceStatus::Known(coins)
                    }
                    Err(e) => {
                        log::warn!("Balance query for '{}' failed: {}", account.name, e);
                        BalanceStatus::Unknown
                    }
                };
                let recent = match self.refresh_history(account).await {
                    Ok(mut history) => {
                        history.truncate(RECENT_HISTORY_LEN);
                        history
                    }
                    Err(e) => {
                        log::warn!("History query for '{}' failed: {}", account.name, e);
                        Vec::new()
                    }
                };
                let snapshot = AccountSnapshot {
                    account: account.clone(),
                    balances,
                    recent,
                };
                if let Ok(mut slots) = slots.lock() {
                    slots[index] = Some(snapshot);
                }
            }
        })
        .await;

        let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        Ok(slots.into_iter().flatten().collect())
    }
}
