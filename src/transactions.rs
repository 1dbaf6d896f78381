//! Transaction engine
//!
//! Every operation opens its own signing channel and holds it in a
//! [`SigningSession`], which disconnects it when dropped: on success, on
//! error, and when the operation's future is cancelled.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::address::{parse_private_key_hex, AddressCodec};
use crate::chain::signer::{FeeSetting, Registry, SigningChannel, SigningConnector, TxMessage};
use crate::chain::types::{Coin, TxResponse};
use crate::error::WalletError;
use crate::mine_msg::{MsgMine, MSG_MINE_TYPE_URL};
use crate::Result;

/// Gas limit reported when simulation is impossible.
pub const FALLBACK_GAS_LIMIT: u64 = 200_000;

/// Memo prefix of mining transactions; the nonce follows it.
pub const MINE_MEMO: &str = "PoS Block Production";

/// Which address signs when the ledger's address and the key disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SenderPolicy {
    /// Use the address stored in the ledger. A mismatching key is then
    /// refused by the signing channel.
    #[default]
    LedgerAddress,
    /// Use the address the key derives to.
    DerivedAddress,
}

impl FromStr for SenderPolicy {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ledger" => Ok(Self::LedgerAddress),
            "derived" => Ok(Self::DerivedAddress),
            other => Err(WalletError::Config(format!(
                "unknown sender policy '{}', expected 'ledger' or 'derived'",
                other
            ))),
        }
    }
}

impl fmt::Display for SenderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LedgerAddress => write!(f, "ledger"),
            Self::DerivedAddress => write!(f, "derived"),
        }
    }
}

/// A requested single-coin transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub sender: String,
    pub receiver: String,
    /// Base units.
    pub amount: u128,
    pub denom: String,
    #[serde(default)]
    pub memo: Option<String>,
}

impl TransactionIntent {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u128,
        denom: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            denom: denom.into(),
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn validate(&self, codec: &AddressCodec) -> Result<()> {
        if self.amount == 0 {
            return Err(WalletError::InvalidIntent(
                "amount must be positive".to_string(),
            ));
        }
        if self.denom.trim().is_empty() {
            return Err(WalletError::InvalidIntent("denom is empty".to_string()));
        }
        for address in [&self.sender, &self.receiver] {
            if !codec.is_well_formed_address(address) {
                return Err(WalletError::InvalidAddress(address.clone()));
            }
        }
        Ok(())
    }

    fn memo(&self) -> &str {
        self.memo.as_deref().unwrap_or("")
    }
}

/// Outcome of a broadcast once the transaction is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub tx_hash: String,
    pub height: u64,
    /// 0 is success.
    pub code: u32,
    pub raw_log: String,
    pub gas_used: u64,
    pub gas_wanted: u64,
}

impl From<TxResponse> for TransactionResult {
    fn from(resp: TxResponse) -> Self {
        Self {
            tx_hash: resp.txhash,
            height: resp.height,
            code: resp.code,
            raw_log: resp.raw_log,
            gas_used: resp.gas_used,
            gas_wanted: resp.gas_wanted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineParams {
    /// Ledger address of the miner.
    pub miner: String,
    /// Freshness token; the current time in milliseconds when absent.
    pub nonce: Option<String>,
}

impl MineParams {
    pub fn new(miner: impl Into<String>) -> Self {
        Self {
            miner: miner.into(),
            nonce: None,
        }
    }
}

pub fn is_success(result: &TransactionResult) -> bool {
    result.code == 0
}

/// Empty for a success; otherwise the raw log when it names the failure,
/// or a generic line with the code.
pub fn explain_failure(result: &TransactionResult) -> String {
    if is_success(result) {
        return String::new();
    }
    let log = result.raw_log.to_lowercase();
    if ["insufficient funds", "invalid", "failed"]
        .iter()
        .any(|keyword| log.contains(keyword))
    {
        return result.raw_log.clone();
    }
    format!("Transaction failed (code {})", result.code)
}

fn mentions_cooldown(text: &str) -> bool {
    text.to_lowercase().contains("cooldown")
}

/// Exclusive hold on a signing channel for one operation.
pub struct SigningSession {
    channel: Box<dyn SigningChannel>,
}

impl SigningSession {
    pub fn new(channel: Box<dyn SigningChannel>) -> Self {
        Self { channel }
    }
}

impl Deref for SigningSession {
    type Target = dyn SigningChannel;

    fn deref(&self) -> &Self::Target {
        self.channel.as_ref()
    }
}

impl DerefMut for SigningSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.channel.as_mut()
    }
}

impl Drop for SigningSession {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}

/// `ceil(simulated * 1.3)`, or `None` when it does not fit in a `u64`.
fn scaled_estimate(simulated: u64) -> Option<u64> {
    simulated
        .checked_mul(13)
        .and_then(|g| g.checked_add(9))
        .map(|g| g / 10)
}

fn encode_mine(value: &serde_json::Value) -> Result<Vec<u8>> {
    let msg: MsgMine = serde_json::from_value(value.clone())
        .map_err(|e| WalletError::InvalidIntent(format!("bad MsgMine value: {}", e)))?;
    msg.encode()
}

pub struct TransactionEngine {
    connector: Arc<dyn SigningConnector>,
    codec: AddressCodec,
    policy: SenderPolicy,
}

impl TransactionEngine {
    pub fn new(connector: Arc<dyn SigningConnector>, codec: AddressCodec) -> Self {
        Self {
            connector,
            codec,
            policy: SenderPolicy::default(),
        }
    }

    pub fn with_sender_policy(mut self, policy: SenderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sender_policy(&self) -> SenderPolicy {
        self.policy
    }

    /// Open a channel for the key with the mining message registered.
    pub async fn create_signing_channel(&self, private_key_hex: &str) -> Result<SigningSession> {
        let key = parse_private_key_hex(private_key_hex.trim())?;
        // Rejects out-of-range scalars before any network traffic.
        self.codec.derive_public_address(&key)?;

        let mut registry = Registry::default();
        registry.register(MSG_MINE_TYPE_URL, encode_mine);
        let channel = self.connector.connect(&key, registry).await?;
        Ok(SigningSession::new(channel))
    }

    pub async fn transfer(
        &self,
        private_key_hex: &str,
        intent: &TransactionIntent,
    ) -> Result<TransactionResult> {
        intent.validate(&self.codec)?;
        let mut channel = self.create_signing_channel(private_key_hex).await?;
        let sender = self.resolve_sender(channel.address(), &intent.sender);
        let amount = [Coin::new(intent.amount, intent.denom.clone())];

        log::info!(
            "Transfer {}{} {} -> {}",
            intent.amount,
            intent.denom,
            sender,
            intent.receiver
        );
        let result = channel
            .send_tokens(
                &sender,
                &intent.receiver,
                &amount,
                FeeSetting::Auto,
                intent.memo(),
            )
            .await?;
        drop(channel);

        if !is_success(&result) {
            log::warn!("Transfer {} failed: {}", result.tx_hash, explain_failure(&result));
        }
        Ok(result)
    }

    pub async fn mine(&self, private_key_hex: &str, params: &MineParams) -> Result<TransactionResult> {
        let mut channel = self.create_signing_channel(private_key_hex).await?;
        let miner = self.resolve_sender(channel.address(), &params.miner);
        let nonce = params
            .nonce
            .clone()
            .unwrap_or_else(|| Utc::now().timestamp_millis().to_string());

        let outcome = self.submit_mine(&mut *channel, &miner, &nonce).await;
        drop(channel);

        match outcome {
            Err(WalletError::Broadcast(text)) if mentions_cooldown(&text) => {
                Err(WalletError::Cooldown(text))
            }
            Err(e) => Err(e),
            Ok(result) if !is_success(&result) && mentions_cooldown(&result.raw_log) => {
                Err(WalletError::Cooldown(result.raw_log))
            }
            Ok(result) => {
                log::info!("Mined by {} in {} (height {})", miner, result.tx_hash, result.height);
                Ok(result)
            }
        }
    }

    async fn submit_mine(
        &self,
        channel: &mut dyn SigningChannel,
        miner: &str,
        nonce: &str,
    ) -> Result<TransactionResult> {
        let msg = MsgMine::for_miner(miner);
        // Oversized fields fail here, before a channel round-trip.
        msg.encode()?;
        let value = serde_json::to_value(&msg)
            .map_err(|e| WalletError::InvalidIntent(e.to_string()))?;
        let message = TxMessage {
            type_url: MSG_MINE_TYPE_URL.to_string(),
            value,
        };
        let memo = format!("{} {}", MINE_MEMO, nonce);
        channel
            .sign_and_broadcast(miner, &[message], FeeSetting::Auto, &memo)
            .await
    }

    /// Simulated gas scaled by 1.3, rounded up. Any failure yields
    /// [`FALLBACK_GAS_LIMIT`].
    pub async fn estimate_gas(&self, private_key_hex: &str, intent: &TransactionIntent) -> u64 {
        match self.simulate_transfer(private_key_hex, intent).await {
            Ok(simulated) => scaled_estimate(simulated).unwrap_or_else(|| {
                log::warn!(
                    "Simulated gas {} is out of range, using {}",
                    simulated,
                    FALLBACK_GAS_LIMIT
                );
                FALLBACK_GAS_LIMIT
            }),
            Err(e) => {
                log::warn!("Gas estimation failed, using {}: {}", FALLBACK_GAS_LIMIT, e);
                FALLBACK_GAS_LIMIT
            }
        }
    }

    async fn simulate_transfer(
        &self,
        private_key_hex: &str,
        intent: &TransactionIntent,
    ) -> Result<u64> {
        intent.validate(&self.codec)?;
        let mut channel = self.create_signing_channel(private_key_hex).await?;
        let sender = self.resolve_sender(channel.address(), &intent.sender);
        let message = TxMessage::send(
            &sender,
            &intent.receiver,
            &[Coin::new(intent.amount, intent.denom.clone())],
        );
        channel.simulate(&sender, &[message], intent.memo()).await
    }

    fn resolve_sender(&self, derived: &str, stated: &str) -> String {
        if derived != stated {
            log::warn!(
                "Key derives to {} but the stated sender is {}; using the {} address",
                derived,
                stated,
                self.policy
            );
        }
        match self.policy {
            SenderPolicy::LedgerAddress => stated.to_string(),
            SenderPolicy::DerivedAddress => derived.to_string(),
        }
    }
}
