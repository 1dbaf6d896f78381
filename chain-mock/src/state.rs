/// In-memory ledger state
///
/// Accounts, balances, blocks and transactions live behind one mutex. Every
/// accepted transaction is committed immediately in a block of its own.
/// Signatures, public keys and sequences are checked the way the real ante
/// handler checks them; fees are recorded but never charged.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bech32::{Bech32, Hrp};
use chrono::{DateTime, Utc};
use prost::Message;
use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, Message as SecpMessage, PublicKey, Secp256k1};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::proto::{self, AuthInfo, SignDoc, TxBody, TxRaw};

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub chain_id: String,
    pub address_prefix: String,
    pub denom: String,
    /// Credited to the miner for every accepted `MsgMine`
    pub mine_reward: u128,
    /// Minimum spacing between two mines by the same miner
    pub mining_cooldown: Option<Duration>,
    /// Gas reported by the simulate endpoint
    pub simulated_gas: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            chain_id: "zethchain".to_string(),
            address_prefix: "zeth".to_string(),
            denom: "uzeth".to_string(),
            mine_reward: 100_000_000,
            mining_cooldown: None,
            simulated_gas: 85_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountEntry {
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct MockBlock {
    pub height: u64,
    pub hash: Vec<u8>,
    pub parent_hash: Vec<u8>,
    pub time: DateTime<Utc>,
    /// Raw transaction bytes, in block order
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct StoredTx {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub codespace: String,
    pub raw_log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Value>,
    pub memo: String,
    pub sender: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MiningRecord {
    pub last_mine_time: Option<DateTime<Utc>>,
    pub total_mined: u128,
    pub mine_count: u64,
}

/// Outcome of the check stage, as returned by a sync broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub txhash: String,
    pub code: u32,
    pub codespace: String,
    pub raw_log: String,
}

struct Rejection {
    code: u32,
    codespace: &'static str,
    log: String,
}

impl Rejection {
    fn sdk(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            codespace: "sdk",
            log: log.into(),
        }
    }
}

enum DecodedMsg {
    Send(proto::MsgSend),
    Mine(proto::MsgMine),
    Unknown(String),
}

impl DecodedMsg {
    fn signer(&self) -> Option<&str> {
        match self {
            DecodedMsg::Send(msg) => Some(&msg.from_address),
            DecodedMsg::Mine(msg) => Some(&msg.creator),
            DecodedMsg::Unknown(_) => None,
        }
    }

    fn recipient(&self) -> Option<&str> {
        match self {
            DecodedMsg::Send(msg) => Some(&msg.to_address),
            DecodedMsg::Mine(msg) => Some(&msg.miner),
            DecodedMsg::Unknown(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            DecodedMsg::Send(msg) => json!({
                "@type": proto::MSG_SEND_TYPE_URL,
                "from_address": msg.from_address,
                "to_address": msg.to_address,
                "amount": msg
                    .amount
                    .iter()
                    .map(|c| json!({ "denom": c.denom, "amount": c.amount }))
                    .collect::<Vec<_>>(),
            }),
            DecodedMsg::Mine(msg) => json!({
                "@type": proto::MSG_MINE_TYPE_URL,
                "creator": msg.creator,
                "miner": msg.miner,
            }),
            DecodedMsg::Unknown(type_url) => json!({ "@type": type_url }),
        }
    }
}

struct DecodedTx {
    hash: String,
    raw: TxRaw,
    body: TxBody,
    auth: AuthInfo,
    messages: Vec<DecodedMsg>,
}

impl DecodedTx {
    fn signer(&self) -> Option<&str> {
        self.messages.iter().find_map(DecodedMsg::signer)
    }
}

#[derive(Default)]
struct ChainState {
    blocks: Vec<MockBlock>,
    lowest_height: u64,
    balances: HashMap<String, BTreeMap<String, u128>>,
    accounts: HashMap<String, AccountEntry>,
    next_account_number: u64,
    txs: HashMap<String, StoredTx>,
    tx_order: Vec<String>,
    mining: HashMap<String, MiningRecord>,
    hidden_txs: HashSet<String>,
    failing_balances: HashSet<String>,
}

impl ChainState {
    fn tip(&self) -> u64 {
        self.blocks.last().map(|b| b.height).unwrap_or(0)
    }

    fn push_block(&mut self, chain_id: &str, txs: Vec<Vec<u8>>) -> &MockBlock {
        let height = self.tip() + 1;
        let parent_hash = self.blocks.last().map(|b| b.hash.clone()).unwrap_or_default();
        let hash = Sha256::digest(format!("{}/{}", chain_id, height).as_bytes()).to_vec();
        self.blocks.push(MockBlock {
            height,
            hash,
            parent_hash,
            time: Utc::now(),
            txs,
        });
        &self.blocks[self.blocks.len() - 1]
    }

    fn ensure_account(&mut self, address: &str) {
        if !self.accounts.contains_key(address) {
            self.next_account_number += 1;
            self.accounts.insert(
                address.to_string(),
                AccountEntry {
                    account_number: self.next_account_number,
                    sequence: 0,
                },
            );
        }
    }

    fn credit(&mut self, address: &str, denom: &str, amount: u128) {
        self.ensure_account(address);
        *self
            .balances
            .entry(address.to_string())
            .or_default()
            .entry(denom.to_string())
            .or_insert(0) += amount;
    }
}

pub struct MockChain {
    config: MockConfig,
    state: Mutex<ChainState>,
}

impl MockChain {
    /// New chain holding only a genesis block at height 1
    pub fn new(config: MockConfig) -> Self {
        let mut state = ChainState {
            lowest_height: 1,
            ..ChainState::default()
        };
        state.push_block(&config.chain_id, Vec::new());
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credit an address out of thin air, creating the account if needed.
    pub fn fund(&self, address: &str, amount: u128, denom: &str) {
        log::info!("Funding {} with {}{}", address, amount, denom);
        self.state().credit(address, denom, amount);
    }

    pub fn balances(&self, address: &str) -> Result<Vec<(String, u128)>, MockError> {
        let state = self.state();
        if state.failing_balances.contains(address) {
            return Err(MockError::Unavailable(format!(
                "balance store unavailable for {}",
                address
            )));
        }
        Ok(state
            .balances
            .get(address)
            .map(|coins| coins.iter().map(|(d, a)| (d.clone(), *a)).collect())
            .unwrap_or_default())
    }

    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.state()
            .balances
            .get(address)
            .and_then(|coins| coins.get(denom).copied())
            .unwrap_or(0)
    }

    pub fn total_supply(&self, denom: &str) -> u128 {
        self.state()
            .balances
            .values()
            .filter_map(|coins| coins.get(denom))
            .sum()
    }

    pub fn account(&self, address: &str) -> Option<AccountEntry> {
        self.state().accounts.get(address).copied()
    }

    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    pub fn height(&self) -> u64 {
        self.state().tip()
    }

    pub fn latest_block(&self) -> MockBlock {
        let state = self.state();
        state.blocks[state.blocks.len() - 1].clone()
    }

    pub fn block(&self, height: u64) -> Result<MockBlock, MockError> {
        let state = self.state();
        if height < state.lowest_height {
            return Err(MockError::BadRequest(format!(
                "height {} is not available, lowest height is {}",
                height, state.lowest_height
            )));
        }
        let tip = state.tip();
        if height > tip {
            return Err(MockError::BadRequest(format!(
                "requested block height {} is bigger than the chain length {}",
                height, tip
            )));
        }
        Ok(state.blocks[(height - 1) as usize].clone())
    }

    /// Seal an empty block and return its height.
    pub fn advance(&self) -> u64 {
        let mut state = self.state();
        state.push_block(&self.config.chain_id, Vec::new()).height
    }

    /// Forget blocks below `height`, as a pruned node does.
    pub fn prune_below(&self, height: u64) {
        self.state().lowest_height = height;
    }

    /// Make a committed transaction invisible to hash lookups and search.
    pub fn hide_tx(&self, hash: &str) {
        self.state().hidden_txs.insert(hash.to_uppercase());
    }

    /// Answer balance queries for `address` with a server error.
    pub fn fail_balance_queries(&self, address: &str) {
        self.state().failing_balances.insert(address.to_string());
    }

    pub fn tx(&self, hash: &str) -> Option<StoredTx> {
        let state = self.state();
        let hash = hash.to_uppercase();
        if state.hidden_txs.contains(&hash) {
            return None;
        }
        state.txs.get(&hash).cloned()
    }

    /// Committed transactions matching both filters, oldest first
    pub fn search(&self, sender: Option<&str>, recipient: Option<&str>) -> Vec<StoredTx> {
        let state = self.state();
        state
            .tx_order
            .iter()
            .filter(|hash| !state.hidden_txs.contains(*hash))
            .filter_map(|hash| state.txs.get(hash))
            .filter(|tx| sender.map_or(true, |s| tx.sender == s))
            .filter(|tx| recipient.map_or(true, |r| tx.recipients.iter().any(|a| a == r)))
            .cloned()
            .collect()
    }

    pub fn tx_count(&self) -> usize {
        self.state().tx_order.len()
    }

    pub fn mining_record(&self, address: &str) -> MiningRecord {
        self.state().mining.get(address).cloned().unwrap_or_default()
    }

    /// Gas estimate for a signed transaction
    pub fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, MockError> {
        let tx = self.decode_tx(tx_bytes)?;
        if let Some(DecodedMsg::Unknown(type_url)) = tx
            .messages
            .iter()
            .find(|m| matches!(m, DecodedMsg::Unknown(_)))
        {
            return Err(MockError::BadRequest(format!(
                "unable to resolve type URL {}",
                type_url
            )));
        }
        let signer = tx
            .signer()
            .ok_or_else(|| MockError::BadRequest("transaction has no messages".to_string()))?;
        if self.account(signer).is_none() {
            return Err(MockError::NotFound(format!("account {} not found", signer)));
        }
        Ok(self.config.simulated_gas)
    }

    /// Check and, if accepted, immediately commit a transaction.
    ///
    /// The returned result is the check stage only. Execution failures
    /// such as insufficient funds are recorded on the committed transaction.
    pub fn broadcast(&self, tx_bytes: &[u8]) -> Result<CheckResult, MockError> {
        let tx = self.decode_tx(tx_bytes)?;
        let mut state = self.state();

        if let Err(rejection) = self.check(&state, &tx) {
            log::warn!("Rejected {}: {}", tx.hash, rejection.log);
            return Ok(CheckResult {
                txhash: tx.hash,
                code: rejection.code,
                codespace: rejection.codespace.to_string(),
                raw_log: rejection.log,
            });
        }

        let sender = tx.signer().unwrap_or_default().to_string();
        if let Some(account) = state.accounts.get_mut(&sender) {
            account.sequence += 1;
        }

        let outcome = self.deliver(&mut state, &tx);
        let (height, time) = {
            let block = state.push_block(&self.config.chain_id, vec![tx_bytes.to_vec()]);
            (block.height, block.time)
        };
        let (code, codespace, raw_log) = match outcome {
            Ok(()) => (0, String::new(), String::new()),
            Err(r) => (r.code, r.codespace.to_string(), r.log),
        };
        log::info!("Committed {} at height {} (code {})", tx.hash, height, code);

        let stored = StoredTx {
            hash: tx.hash.clone(),
            height,
            code,
            codespace,
            raw_log,
            gas_wanted: tx.auth.fee.as_ref().map(|f| f.gas_limit).unwrap_or(0),
            gas_used: self.config.simulated_gas,
            timestamp: time,
            messages: tx.messages.iter().map(DecodedMsg::to_json).collect(),
            memo: tx.body.memo.clone(),
            sender,
            recipients: tx
                .messages
                .iter()
                .filter_map(DecodedMsg::recipient)
                .map(str::to_string)
                .collect(),
        };
        state.tx_order.push(tx.hash.clone());
        state.txs.insert(tx.hash.clone(), stored);

        Ok(CheckResult {
            txhash: tx.hash,
            code: 0,
            codespace: String::new(),
            raw_log: String::new(),
        })
    }

    fn decode_tx(&self, tx_bytes: &[u8]) -> Result<DecodedTx, MockError> {
        let bad = |what: &str, e: prost::DecodeError| {
            MockError::BadRequest(format!("failed to decode {}: {}", what, e))
        };
        let raw = TxRaw::decode(tx_bytes).map_err(|e| bad("TxRaw", e))?;
        let body = TxBody::decode(raw.body_bytes.as_slice()).map_err(|e| bad("TxBody", e))?;
        let auth =
            AuthInfo::decode(raw.auth_info_bytes.as_slice()).map_err(|e| bad("AuthInfo", e))?;

        let mut messages = Vec::with_capacity(body.messages.len());
        for any in &body.messages {
            let msg = match any.type_url.as_str() {
                proto::MSG_SEND_TYPE_URL => DecodedMsg::Send(
                    proto::MsgSend::decode(any.value.as_slice()).map_err(|e| bad("MsgSend", e))?,
                ),
                proto::MSG_MINE_TYPE_URL => DecodedMsg::Mine(
                    proto::MsgMine::decode(any.value.as_slice()).map_err(|e| bad("MsgMine", e))?,
                ),
                other => DecodedMsg::Unknown(other.to_string()),
            };
            messages.push(msg);
        }

        Ok(DecodedTx {
            hash: hex::encode_upper(Sha256::digest(tx_bytes)),
            raw,
            body,
            auth,
            messages,
        })
    }

    fn address_of(&self, compressed_key: &[u8]) -> Option<String> {
        let hrp = Hrp::parse(&self.config.address_prefix).ok()?;
        let hash = Ripemd160::digest(Sha256::digest(compressed_key));
        bech32::encode::<Bech32>(hrp, &hash).ok()
    }

    fn check(&self, state: &ChainState, tx: &DecodedTx) -> Result<(), Rejection> {
        if let Some(DecodedMsg::Unknown(type_url)) = tx
            .messages
            .iter()
            .find(|m| matches!(m, DecodedMsg::Unknown(_)))
        {
            return Err(Rejection::sdk(
                2,
                format!("unable to resolve type URL {}: tx parse error", type_url),
            ));
        }
        let signer = tx
            .signer()
            .ok_or_else(|| Rejection::sdk(2, "must contain at least one message: tx parse error"))?;
        let account = state.accounts.get(signer).copied().ok_or_else(|| {
            Rejection::sdk(9, format!("account {} not found: unknown address", signer))
        })?;

        let info = tx
            .auth
            .signer_infos
            .first()
            .ok_or_else(|| Rejection::sdk(4, "no signatures supplied: unauthorized"))?;
        if info.sequence != account.sequence {
            return Err(Rejection::sdk(
                32,
                format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    account.sequence, info.sequence
                ),
            ));
        }

        let key = info
            .public_key
            .as_ref()
            .and_then(|any| proto::PubKey::decode(any.value.as_slice()).ok())
            .map(|pk| pk.key)
            .ok_or_else(|| Rejection::sdk(8, "missing public key: invalid pubkey"))?;
        if self.address_of(&key).as_deref() != Some(signer) {
            return Err(Rejection::sdk(
                8,
                format!(
                    "pubKey does not match signer address {} with signer index: 0: invalid pubkey",
                    signer
                ),
            ));
        }

        let sign_doc = SignDoc {
            body_bytes: tx.raw.body_bytes.clone(),
            auth_info_bytes: tx.raw.auth_info_bytes.clone(),
            chain_id: self.config.chain_id.clone(),
            account_number: account.account_number,
        }
        .encode_to_vec();
        let digest = Sha256::digest(&sign_doc);
        let verified = (|| {
            let public_key = PublicKey::from_slice(&key).ok()?;
            let signature = Signature::from_compact(tx.raw.signatures.first()?).ok()?;
            let message = SecpMessage::from_digest_slice(&digest).ok()?;
            Some(
                Secp256k1::verification_only()
                    .verify_ecdsa(&message, &signature, &public_key)
                    .is_ok(),
            )
        })()
        .unwrap_or(false);
        if !verified {
            return Err(Rejection::sdk(
                4,
                format!(
                    "signature verification failed; please verify account number ({}) and chain-id ({}): unauthorized",
                    account.account_number, self.config.chain_id
                ),
            ));
        }

        if let Some(cooldown) = self.config.mining_cooldown {
            let cooldown = chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::weeks(52));
            for msg in &tx.messages {
                let DecodedMsg::Mine(mine) = msg else { continue };
                let last = state.mining.get(&mine.miner).and_then(|r| r.last_mine_time);
                if let Some(last) = last {
                    let remaining = cooldown - (Utc::now() - last);
                    if remaining > chrono::Duration::zero() {
                        return Err(Rejection {
                            code: 2,
                            codespace: "mining",
                            log: format!(
                                "mining cooldown active: {} seconds remaining",
                                remaining.num_seconds() + 1
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn deliver(&self, state: &mut ChainState, tx: &DecodedTx) -> Result<(), Rejection> {
        let mut balances = state.balances.clone();
        let mut credited = Vec::new();

        for msg in &tx.messages {
            match msg {
                DecodedMsg::Send(send) => {
                    for coin in &send.amount {
                        let amount: u128 = coin.amount.parse().map_err(|_| {
                            Rejection::sdk(10, format!("{}{}: invalid coins", coin.amount, coin.denom))
                        })?;
                        let from = balances.entry(send.from_address.clone()).or_default();
                        let have = from.get(&coin.denom).copied().unwrap_or(0);
                        if have < amount {
                            return Err(Rejection::sdk(
                                5,
                                format!(
                                    "spendable balance {}{} is smaller than {}{}: insufficient funds",
                                    have, coin.denom, amount, coin.denom
                                ),
                            ));
                        }
                        from.insert(coin.denom.clone(), have - amount);
                        *balances
                            .entry(send.to_address.clone())
                            .or_default()
                            .entry(coin.denom.clone())
                            .or_insert(0) += amount;
                        credited.push(send.to_address.clone());
                    }
                }
                DecodedMsg::Mine(mine) => {
                    *balances
                        .entry(mine.miner.clone())
                        .or_default()
                        .entry(self.config.denom.clone())
                        .or_insert(0) += self.config.mine_reward;
                    credited.push(mine.miner.clone());
                }
                DecodedMsg::Unknown(_) => {}
            }
        }

        state.balances = balances;
        for address in credited {
            state.ensure_account(&address);
        }
        let now = Utc::now();
        for msg in &tx.messages {
            if let DecodedMsg::Mine(mine) = msg {
                let record = state.mining.entry(mine.miner.clone()).or_default();
                record.last_mine_time = Some(now);
                record.total_mined += self.config.mine_reward;
                record.mine_count += 1;
            }
        }
        Ok(())
    }
}
