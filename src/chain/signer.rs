//! Signing/broadcast channel
//!
//! A [`SigningConnector`] opens a [`SigningChannel`] bound to one private
//! key. The channel builds `TxRaw` envelopes from registered message types,
//! signs them in SIGN_MODE_DIRECT, simulates gas and broadcasts.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use prost::Message as _;
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::proto;
use super::query::{decode_response, trim_base};
use super::types::{
    AccountResponse, BaseAccount, BroadcastResponse, Coin, GetTxResponse, NodeInfoResponse,
    SimulateResponse, TxBytesRequest,
};
use crate::address::{compressed_public_key, AddressCodec, PRIVATE_KEY_LEN};
use crate::error::WalletError;
use crate::transactions::TransactionResult;
use crate::Result;

/// Multiplier applied to simulated gas when the fee is automatic.
pub const AUTO_GAS_MULTIPLIER_TENTHS: u64 = 14;

const BROADCAST_MODE_SYNC: &str = "BROADCAST_MODE_SYNC";

/// A message before protobuf encoding: its type URL and a JSON value the
/// registered encoder understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxMessage {
    pub type_url: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct MsgSendValue {
    from_address: String,
    to_address: String,
    amount: Vec<Coin>,
}

impl TxMessage {
    pub fn send(from: &str, to: &str, amount: &[Coin]) -> Self {
        let amount: Vec<serde_json::Value> = amount
            .iter()
            .map(|c| json!({ "denom": c.denom, "amount": c.amount.to_string() }))
            .collect();
        Self {
            type_url: proto::MSG_SEND_TYPE_URL.to_string(),
            value: json!({
                "from_address": from,
                "to_address": to,
                "amount": amount,
            }),
        }
    }
}

pub type MessageEncoder = fn(&serde_json::Value) -> Result<Vec<u8>>;

/// Type URL -> encoder table consulted when building a transaction body.
#[derive(Debug, Clone)]
pub struct Registry {
    encoders: HashMap<String, MessageEncoder>,
}

impl Default for Registry {
    /// Registry with the bank `MsgSend` type.
    fn default() -> Self {
        let mut registry = Self {
            encoders: HashMap::new(),
        };
        registry.register(proto::MSG_SEND_TYPE_URL, encode_msg_send);
        registry
    }
}

impl Registry {
    pub fn register(&mut self, type_url: impl Into<String>, encoder: MessageEncoder) {
        self.encoders.insert(type_url.into(), encoder);
    }

    pub fn is_registered(&self, type_url: &str) -> bool {
        self.encoders.contains_key(type_url)
    }

    pub fn encode(&self, message: &TxMessage) -> Result<proto::Any> {
        let encoder = self
            .encoders
            .get(&message.type_url)
            .ok_or_else(|| WalletError::UnregisteredType(message.type_url.clone()))?;
        Ok(proto::Any {
            type_url: message.type_url.clone(),
            value: encoder(&message.value)?,
        })
    }
}

fn encode_msg_send(value: &serde_json::Value) -> Result<Vec<u8>> {
    let msg: MsgSendValue = serde_json::from_value(value.clone())
        .map_err(|e| WalletError::InvalidIntent(format!("bad MsgSend value: {}", e)))?;
    Ok(proto::MsgSend {
        from_address: msg.from_address,
        to_address: msg.to_address,
        amount: msg.amount.iter().map(proto::Coin::from).collect(),
    }
    .encode_to_vec())
}

// ============================================================================
// Fees
// ============================================================================

/// Gas price such as `0.025uzeth`, held as an exact decimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPrice {
    mantissa: u128,
    scale: u32,
    denom: String,
}

impl Default for GasPrice {
    /// `0.025uzeth`
    fn default() -> Self {
        Self {
            mantissa: 25,
            scale: 3,
            denom: crate::format::NATIVE_DENOM.to_string(),
        }
    }
}

impl GasPrice {
    pub fn denom(&self) -> &str {
        &self.denom
    }

    /// `ceil(gas * price)` in the price's denom.
    pub fn fee_for(&self, gas: u64) -> Result<Fee> {
        let divisor = 10u128.pow(self.scale);
        let amount = (gas as u128)
            .checked_mul(self.mantissa)
            .map(|product| product / divisor + u128::from(product % divisor != 0))
            .ok_or_else(|| {
                WalletError::InvalidIntent(format!(
                    "fee for {} gas at {} does not fit in an amount",
                    gas, self
                ))
            })?;
        Ok(Fee {
            amount: vec![Coin::new(amount, self.denom.clone())],
            gas,
        })
    }
}

impl FromStr for GasPrice {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| WalletError::Config(format!("gas price '{}' has no denom", s)))?;
        let (number, denom) = s.split_at(split);
        if number.is_empty() || !denom.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(WalletError::Config(format!("invalid gas price '{}'", s)));
        }

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if fraction.contains('.') || fraction.len() > 18 || (whole.is_empty() && fraction.is_empty())
        {
            return Err(WalletError::Config(format!("invalid gas price '{}'", s)));
        }
        let digits = format!("{}{}", whole, fraction);
        let mantissa: u128 = digits
            .parse()
            .map_err(|e| WalletError::Config(format!("invalid gas price '{}': {}", s, e)))?;

        Ok(Self {
            mantissa,
            scale: fraction.len() as u32,
            denom: denom.to_string(),
        })
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divisor = 10u128.pow(self.scale);
        if self.scale == 0 {
            write!(f, "{}{}", self.mantissa, self.denom)
        } else {
            write!(
                f,
                "{}.{:0width$}{}",
                self.mantissa / divisor,
                self.mantissa % divisor,
                self.denom,
                width = self.scale as usize
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeSetting {
    /// Simulate, scale gas by 1.4 and price it at the channel's gas price.
    Auto,
    Fixed(Fee),
}

/// `round(simulated * 1.4)`, saturating at `u64::MAX`.
pub fn auto_gas_limit(simulated: u64) -> u64 {
    let scaled = (u128::from(simulated) * u128::from(AUTO_GAS_MULTIPLIER_TENTHS) + 5) / 10;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// How long to wait for a broadcast transaction to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Channel traits
// ============================================================================

#[async_trait]
pub trait SigningConnector: Send + Sync {
    /// Open a channel for `private_key`. Messages are encoded through
    /// `registry`.
    async fn connect(
        &self,
        private_key: &[u8; PRIVATE_KEY_LEN],
        registry: Registry,
    ) -> Result<Box<dyn SigningChannel>>;
}

/// An authenticated channel for one key. Owned by a single operation and
/// released with [`disconnect`](SigningChannel::disconnect), which must be
/// safe to call more than once.
#[async_trait]
pub trait SigningChannel: Send {
    /// Address derived from the channel's key.
    fn address(&self) -> &str;

    /// Gas used by a dry run of `messages`.
    async fn simulate(&mut self, signer: &str, messages: &[TxMessage], memo: &str)
        -> Result<u64>;

    async fn sign_and_broadcast(
        &mut self,
        signer: &str,
        messages: &[TxMessage],
        fee: FeeSetting,
        memo: &str,
    ) -> Result<TransactionResult>;

    async fn send_tokens(
        &mut self,
        from: &str,
        to: &str,
        amount: &[Coin],
        fee: FeeSetting,
        memo: &str,
    ) -> Result<TransactionResult> {
        let msg = TxMessage::send(from, to, amount);
        self.sign_and_broadcast(from, &[msg], fee, memo).await
    }

    fn disconnect(&mut self);
}

// ============================================================================
// REST implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct RestSigningConnector {
    client: reqwest::Client,
    rest_url: String,
    chain_id: String,
    codec: AddressCodec,
    gas_price: GasPrice,
    poll: PollConfig,
}

impl RestSigningConnector {
    pub fn new(
        rest_url: impl Into<String>,
        chain_id: impl Into<String>,
        codec: AddressCodec,
        gas_price: GasPrice,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: trim_base(rest_url.into()),
            chain_id: chain_id.into(),
            codec,
            gas_price,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl SigningConnector for RestSigningConnector {
    async fn connect(
        &self,
        private_key: &[u8; PRIVATE_KEY_LEN],
        registry: Registry,
    ) -> Result<Box<dyn SigningChannel>> {
        let secret =
            SecretKey::from_slice(private_key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let pubkey = compressed_public_key(&secret);
        let address = self.codec.address_for_pubkey(&pubkey)?;

        let url = format!("{}/cosmos/base/tendermint/v1beta1/node_info", self.rest_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::from_http(&self.rest_url, &e))?;
        let info: NodeInfoResponse = decode_response(&url, response)
            .await
            .map_err(|e| WalletError::Connection(e.to_string()))?;
        if info.default_node_info.network != self.chain_id {
            return Err(WalletError::Connection(format!(
                "node at {} serves chain '{}', expected '{}'",
                self.rest_url, info.default_node_info.network, self.chain_id
            )));
        }

        log::info!("Signing channel open for {} on {}", address, self.chain_id);
        Ok(Box::new(RestSigningChannel {
            client: self.client.clone(),
            rest_url: self.rest_url.clone(),
            chain_id: self.chain_id.clone(),
            secret,
            pubkey,
            address,
            registry,
            gas_price: self.gas_price.clone(),
            poll: self.poll,
            open: true,
        }))
    }
}

pub struct RestSigningChannel {
    client: reqwest::Client,
    rest_url: String,
    chain_id: String,
    secret: SecretKey,
    pubkey: [u8; 33],
    address: String,
    registry: Registry,
    gas_price: GasPrice,
    poll: PollConfig,
    open: bool,
}

impl RestSigningChannel {
    fn ensure_ready(&self, signer: &str) -> Result<()> {
        if !self.open {
            return Err(WalletError::Connection(
                "signing channel is disconnected".to_string(),
            ));
        }
        if signer != self.address {
            return Err(WalletError::InvalidIntent(format!(
                "signer {} is not the channel key's address {}",
                signer, self.address
            )));
        }
        Ok(())
    }

    async fn account(&self) -> Result<BaseAccount> {
        let url = format!("{}/cosmos/auth/v1beta1/accounts/{}", self.rest_url, self.address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::from_http(&self.rest_url, &e))?;
        match decode_response::<AccountResponse>(&url, response).await {
            Ok(resp) => Ok(resp.account),
            Err(WalletError::NotFound(_)) => Err(WalletError::Broadcast(format!(
                "Account '{}' does not exist on chain. Send some tokens there before trying to query sequence.",
                self.address
            ))),
            Err(e) => Err(e),
        }
    }

    fn body_bytes(&self, messages: &[TxMessage], memo: &str) -> Result<Vec<u8>> {
        let messages = messages
            .iter()
            .map(|m| self.registry.encode(m))
            .collect::<Result<Vec<_>>>()?;
        Ok(proto::TxBody {
            messages,
            memo: memo.to_string(),
            timeout_height: 0,
        }
        .encode_to_vec())
    }

    fn auth_info_bytes(&self, sequence: u64, fee: proto::Fee, mode: i32) -> Vec<u8> {
        proto::AuthInfo {
            signer_infos: vec![proto::SignerInfo {
                public_key: Some(proto::secp256k1_pubkey_any(&self.pubkey)),
                mode_info: Some(proto::ModeInfo {
                    single: Some(proto::ModeInfoSingle { mode }),
                }),
                sequence,
            }],
            fee: Some(fee),
        }
        .encode_to_vec()
    }

    /// Compact 64-byte ECDSA signature over SHA-256 of the sign doc.
    fn sign(&self, body_bytes: &[u8], auth_info_bytes: &[u8], account_number: u64) -> Result<Vec<u8>> {
        let doc = proto::SignDoc {
            body_bytes: body_bytes.to_vec(),
            auth_info_bytes: auth_info_bytes.to_vec(),
            chain_id: self.chain_id.clone(),
            account_number,
        };
        let digest = Sha256::digest(doc.encode_to_vec());
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let secp = Secp256k1::signing_only();
        let signature = secp.sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_compact().to_vec())
    }

    async fn post_tx<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        tx: proto::TxRaw,
        mode: Option<&str>,
    ) -> Result<T> {
        let url = format!("{}{}", self.rest_url, path);
        let body = TxBytesRequest {
            tx_bytes: BASE64.encode(tx.encode_to_vec()),
            mode,
        };
        log::debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::from_http(&self.rest_url, &e))?;
        decode_response(&url, response).await
    }

    async fn wait_for_tx(&self, hash: &str) -> Result<TransactionResult> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.rest_url, hash);
        let deadline = tokio::time::Instant::now() + self.poll.timeout;
        loop {
            let found = match self.client.get(&url).send().await {
                Ok(response) => decode_response::<GetTxResponse>(&url, response).await.ok(),
                Err(e) => {
                    log::debug!("Polling {} failed: {}", hash, e);
                    None
                }
            };
            if let Some(found) = found {
                return Ok(TransactionResult::from(found.tx_response));
            }
            if tokio::time::Instant::now() + self.poll.interval > deadline {
                return Err(WalletError::Broadcast(format!(
                    "Transaction with ID {} was submitted but was not yet found on the chain. You might want to check later. There was a wait of {} seconds.",
                    hash,
                    self.poll.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }
}

#[async_trait]
impl SigningChannel for RestSigningChannel {
    fn address(&self) -> &str {
        &self.address
    }

    async fn simulate(
        &mut self,
        signer: &str,
        messages: &[TxMessage],
        memo: &str,
    ) -> Result<u64> {
        self.ensure_ready(signer)?;
        let account = self.account().await?;
        let body_bytes = self.body_bytes(messages, memo)?;
        let auth_info_bytes = self.auth_info_bytes(
            account.sequence,
            proto::Fee::default(),
            proto::SIGN_MODE_UNSPECIFIED,
        );
        let tx = proto::TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![Vec::new()],
        };
        let resp: SimulateResponse = self
            .post_tx("/cosmos/tx/v1beta1/simulate", tx, None)
            .await?;
        log::debug!("Simulated gas for {}: {}", self.address, resp.gas_info.gas_used);
        Ok(resp.gas_info.gas_used)
    }

    async fn sign_and_broadcast(
        &mut self,
        signer: &str,
        messages: &[TxMessage],
        fee: FeeSetting,
        memo: &str,
    ) -> Result<TransactionResult> {
        self.ensure_ready(signer)?;
        let fee = match fee {
            FeeSetting::Auto => {
                let simulated = self.simulate(signer, messages, memo).await?;
                self.gas_price.fee_for(auto_gas_limit(simulated))?
            }
            FeeSetting::Fixed(fee) => fee,
        };

        let account = self.account().await?;
        let body_bytes = self.body_bytes(messages, memo)?;
        let auth_info_bytes = self.auth_info_bytes(
            account.sequence,
            proto::Fee {
                amount: fee.amount.iter().map(proto::Coin::from).collect(),
                gas_limit: fee.gas,
                ..Default::default()
            },
            proto::SIGN_MODE_DIRECT,
        );
        let signature = self.sign(&body_bytes, &auth_info_bytes, account.account_number)?;
        let tx = proto::TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };

        let resp: BroadcastResponse = self
            .post_tx("/cosmos/tx/v1beta1/txs", tx, Some(BROADCAST_MODE_SYNC))
            .await?;
        let check = resp.tx_response;
        if check.code != 0 {
            return Err(WalletError::Broadcast(format!(
                "Broadcasting transaction failed with code {} (codespace: {}). Log: {}",
                check.code, check.codespace, check.raw_log
            )));
        }
        log::info!(
            "Broadcast {} from {} (gas limit {})",
            check.txhash,
            self.address,
            fee.gas
        );
        self.wait_for_tx(&check.txhash).await
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            log::debug!("Signing channel for {} closed", self.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as ProstMessage;

    #[test]
    fn test_gas_price_parse_and_fee() {
        let price: GasPrice = "0.025uzeth".parse().unwrap();
        assert_eq!(price.denom(), "uzeth");
        assert_eq!(price.to_string(), "0.025uzeth");

        let fee = price.fee_for(200_000).unwrap();
        assert_eq!(fee.amount, vec![Coin::new(5_000, "uzeth")]);

        // 0.025 * 101 = 2.525 -> 3
        assert_eq!(price.fee_for(101).unwrap().amount[0].amount, 3);
        assert_eq!(price.fee_for(0).unwrap().amount[0].amount, 0);
    }

    #[test]
    fn test_fee_overflow_is_an_error() {
        let price: GasPrice = format!("{}uzeth", "9".repeat(38)).parse().unwrap();
        assert!(matches!(
            price.fee_for(u64::MAX),
            Err(WalletError::InvalidIntent(_))
        ));
        assert!(price.fee_for(1).is_ok());
    }

    #[test]
    fn test_gas_price_rejects_garbage() {
        assert!("uzeth".parse::<GasPrice>().is_err());
        assert!("0.025".parse::<GasPrice>().is_err());
        assert!("1.2.3uzeth".parse::<GasPrice>().is_err());
        assert!(".uzeth".parse::<GasPrice>().is_err());
        assert!("5uzeth".parse::<GasPrice>().is_ok());
    }

    #[test]
    fn test_auto_gas_rounds_to_nearest() {
        assert_eq!(auto_gas_limit(100_000), 140_000);
        assert_eq!(auto_gas_limit(3), 4); // 4.2
        assert_eq!(auto_gas_limit(5), 7); // 7.0
        assert_eq!(auto_gas_limit(1), 1); // 1.4
        assert_eq!(auto_gas_limit(u64::MAX), u64::MAX);
        assert_eq!(auto_gas_limit(u64::MAX / 4), 6_456_360_425_798_343_064);
    }

    #[test]
    fn test_registry_rejects_unknown_type() {
        let registry = Registry::default();
        let msg = TxMessage {
            type_url: "/zethchain.mining.v1.MsgMine".to_string(),
            value: serde_json::json!({}),
        };
        assert_eq!(
            registry.encode(&msg).unwrap_err(),
            WalletError::UnregisteredType("/zethchain.mining.v1.MsgMine".to_string())
        );
    }

    #[test]
    fn test_msg_send_encoding() {
        let registry = Registry::default();
        let msg = TxMessage::send("zeth1a", "zeth1b", &[Coin::new(5, "uzeth")]);
        let any = registry.encode(&msg).unwrap();
        assert_eq!(any.type_url, proto::MSG_SEND_TYPE_URL);

        let decoded = <proto::MsgSend as ProstMessage>::decode(any.value.as_slice()).unwrap();
        assert_eq!(decoded.from_address, "zeth1a");
        assert_eq!(decoded.to_address, "zeth1b");
        assert_eq!(decoded.amount[0].amount, "5");
        assert_eq!(msg.value["amount"][0], serde_json::json!({ "denom": "uzeth", "amount": "5" }));
    }
}
