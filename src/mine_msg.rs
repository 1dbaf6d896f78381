//! Codec for the mining module's `MsgMine`
//!
//! Wire form is the protobuf encoding of two short string fields:
//!
//! ```text
//! 0x0a <len> <creator bytes> 0x12 <len> <miner bytes>
//! ```
//!
//! Only single-byte lengths are produced, so each field is capped at 127
//! bytes. Longer fields are rejected instead of being truncated.

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::Result;

pub const MSG_MINE_TYPE_URL: &str = "/zethchain.mining.v1.MsgMine";

/// Largest field length expressible in one varint byte.
pub const MAX_FIELD_LEN: usize = 127;

/// Field 1, wire type 2 (length-delimited).
const CREATOR_TAG: u8 = 0x0a;
/// Field 2, wire type 2 (length-delimited).
const MINER_TAG: u8 = 0x12;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMine {
    pub creator: String,
    pub miner: String,
}

impl MsgMine {
    /// Self-mining message: the signer is also the reward recipient.
    pub fn for_miner(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            creator: address.clone(),
            miner: address,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let creator = checked_field("creator", &self.creator)?;
        let miner = checked_field("miner", &self.miner)?;

        let mut out = Vec::with_capacity(4 + creator.len() + miner.len());
        out.push(CREATOR_TAG);
        out.push(creator.len() as u8);
        out.extend_from_slice(creator);
        out.push(MINER_TAG);
        out.push(miner.len() as u8);
        out.extend_from_slice(miner);
        Ok(out)
    }

    /// Decodes what [`encode`](Self::encode) produces. Absent fields decode
    /// as empty strings.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut msg = MsgMine::default();
        let mut pos = 0;
        while pos < bytes.len() {
            let tag = bytes[pos];
            let len = *bytes
                .get(pos + 1)
                .ok_or_else(|| WalletError::MalformedMessage("truncated length".to_string()))?
                as usize;
            if len > MAX_FIELD_LEN {
                return Err(WalletError::MalformedMessage(format!(
                    "multi-byte length at offset {}",
                    pos + 1
                )));
            }
            let start = pos + 2;
            let end = start + len;
            let raw = bytes.get(start..end).ok_or_else(|| {
                WalletError::MalformedMessage(format!("field at offset {} overruns input", pos))
            })?;
            let value = std::str::from_utf8(raw)
                .map_err(|e| WalletError::MalformedMessage(e.to_string()))?
                .to_string();
            match tag {
                CREATOR_TAG => msg.creator = value,
                MINER_TAG => msg.miner = value,
                other => {
                    return Err(WalletError::MalformedMessage(format!(
                        "unexpected tag 0x{:02x}",
                        other
                    )))
                }
            }
            pos = end;
        }
        Ok(msg)
    }
}

fn checked_field<'a>(field: &'static str, value: &'a str) -> Result<&'a [u8]> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FIELD_LEN {
        return Err(WalletError::FieldTooLong {
            field,
            len: bytes.len(),
            max: MAX_FIELD_LEN,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_layout() {
        let msg = MsgMine {
            creator: "ab".to_string(),
            miner: "c".to_string(),
        };
        assert_eq!(
            msg.encode().unwrap(),
            vec![0x0a, 2, b'a', b'b', 0x12, 1, b'c']
        );
    }

    #[test]
    fn test_empty_fields_still_emitted() {
        assert_eq!(
            MsgMine::default().encode().unwrap(),
            vec![0x0a, 0, 0x12, 0]
        );
    }

    #[test]
    fn test_round_trip_of_address() {
        let msg = MsgMine::for_miner("zeth1w508d6qejxtdg4y5r3zarvary0c5xw7kdpjwtf");
        let decoded = MsgMine::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_boundary_127_accepted_128_rejected() {
        let ok = MsgMine {
            creator: "a".repeat(127),
            miner: "b".to_string(),
        };
        let encoded = ok.encode().unwrap();
        assert_eq!(encoded[1], 127);

        let too_long = MsgMine {
            creator: "a".to_string(),
            miner: "b".repeat(128),
        };
        assert_eq!(
            too_long.encode().unwrap_err(),
            WalletError::FieldTooLong {
                field: "miner",
                len: 128,
                max: 127
            }
        );
    }

    #[test]
    fn test_limit_counts_bytes_not_chars() {
        // 64 two-byte characters = 128 bytes
        let msg = MsgMine::for_miner("é".repeat(64));
        assert!(matches!(
            msg.encode(),
            Err(WalletError::FieldTooLong { field: "creator", len: 128, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(MsgMine::decode(&[0x0a, 5, b'a']).is_err());
        assert!(MsgMine::decode(&[0x1a, 1, b'a']).is_err());
        assert!(MsgMine::decode(&[0x0a]).is_err());
    }
}
