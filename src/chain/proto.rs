//! Protobuf envelope types for SIGN_MODE_DIRECT transactions
//!
//! Hand-declared prost messages with the field numbers of the
//! `cosmos.tx.v1beta1`, `cosmos.bank.v1beta1` and `cosmos.crypto.secp256k1`
//! packages. Only the fields this wallet fills in are declared.

pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// `cosmos.tx.signing.v1beta1.SignMode`
pub const SIGN_MODE_UNSPECIFIED: i32 = 0;
pub const SIGN_MODE_DIRECT: i32 = 1;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

impl From<&crate::chain::types::Coin> for Coin {
    fn from(coin: &crate::chain::types::Coin) -> Self {
        Self {
            denom: coin.denom.clone(),
            amount: coin.amount.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgSend {
    #[prost(string, tag = "1")]
    pub from_address: String,
    #[prost(string, tag = "2")]
    pub to_address: String,
    #[prost(message, repeated, tag = "3")]
    pub amount: Vec<Coin>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModeInfoSingle {
    #[prost(int32, tag = "1")]
    pub mode: i32,
}

/// Only the `single` arm of the `sum` oneof; on the wire an optional
/// message at tag 1 is indistinguishable from that arm.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModeInfo {
    #[prost(message, optional, tag = "1")]
    pub single: Option<ModeInfoSingle>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(message, optional, tag = "2")]
    pub mode_info: Option<ModeInfo>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignDoc {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub account_number: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

/// `Any`-wrapped compressed secp256k1 public key.
pub fn secp256k1_pubkey_any(compressed: &[u8]) -> Any {
    use prost::Message;
    Any {
        type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
        value: PubKey {
            key: compressed.to_vec(),
        }
        .encode_to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_pubkey_any_layout() {
        let any = secp256k1_pubkey_any(&[2u8; 33]);
        assert_eq!(any.type_url, SECP256K1_PUBKEY_TYPE_URL);
        // tag 1, length 33
        assert_eq!(&any.value[..2], &[0x0a, 33]);
        assert_eq!(any.value.len(), 35);
    }

    #[test]
    fn test_mode_info_matches_oneof_encoding() {
        let mode = ModeInfo {
            single: Some(ModeInfoSingle {
                mode: SIGN_MODE_DIRECT,
            }),
        };
        // single { mode: DIRECT } -> 0a 02 08 01
        assert_eq!(mode.encode_to_vec(), vec![0x0a, 0x02, 0x08, 0x01]);
    }

    #[test]
    fn test_tx_raw_decodes_what_it_encodes() {
        let raw = TxRaw {
            body_bytes: vec![1, 2, 3],
            auth_info_bytes: vec![4],
            signatures: vec![vec![9; 64]],
        };
        let bytes = raw.encode_to_vec();
        assert_eq!(TxRaw::decode(bytes.as_slice()).unwrap(), raw);
    }
}
