//! Deterministic key -> address derivation
//!
//! `address = bech32(prefix, ripemd160(sha256(compressed_secp256k1_pubkey)))`
//!
//! This is the same derivation the chain's own key tooling uses, so an
//! address produced here is the address a signature from the key is
//! checked against.

use bech32::{Bech32, Hrp};
use ripemd::Ripemd160;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::WalletError;
use crate::Result;

/// Human-readable prefix of ZETH addresses.
pub const ADDRESS_PREFIX: &str = "zeth";

/// Upper bound accepted by the structural address check.
pub const MAX_ADDRESS_LEN: usize = 100;

/// Length of a raw private key in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCodec {
    prefix: String,
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self {
            prefix: ADDRESS_PREFIX.to_string(),
        }
    }
}

impl AddressCodec {
    /// Codec for a non-default prefix. The prefix must be a valid bech32 HRP.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        Hrp::parse(&prefix)
            .map_err(|e| WalletError::Config(format!("invalid address prefix '{}': {}", prefix, e)))?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the chain address for a raw 32-byte private key.
    pub fn derive_public_address(&self, private_key: &[u8]) -> Result<String> {
        if private_key.len() != PRIVATE_KEY_LEN {
            return Err(WalletError::InvalidKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                private_key.len()
            )));
        }
        let secret = SecretKey::from_slice(private_key)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        self.address_for_pubkey(&compressed_public_key(&secret))
    }

    /// Same as [`derive_public_address`](Self::derive_public_address) for a hex key.
    pub fn derive_from_hex(&self, private_key_hex: &str) -> Result<String> {
        let bytes = parse_private_key_hex(private_key_hex)?;
        self.derive_public_address(&bytes)
    }

    /// Encode the address of an already-compressed public key.
    pub fn address_for_pubkey(&self, compressed_pubkey: &[u8]) -> Result<String> {
        let hrp = Hrp::parse(&self.prefix)
            .map_err(|e| WalletError::Config(format!("invalid address prefix: {}", e)))?;
        let hash = pubkey_hash(compressed_pubkey);
        bech32::encode::<Bech32>(hrp, &hash)
            .map_err(|e| WalletError::InvalidAddress(format!("bech32 encoding failed: {}", e)))
    }

    /// Structural filter only: prefix and length window.
    ///
    /// Checksums are not verified; `zeth1x` passes.
    pub fn is_well_formed_address(&self, address: &str) -> bool {
        address.starts_with(&self.prefix)
            && address.len() >= self.prefix.len() + 2
            && address.len() <= MAX_ADDRESS_LEN
    }

    /// Fresh random key and its address, key hex-encoded.
    pub fn generate_account_keys(&self) -> Result<(String, String)> {
        let key = generate_private_key();
        let address = self.derive_public_address(&key)?;
        Ok((private_key_to_hex(&key), address))
    }
}

/// Parse exactly 64 hex characters into a 32-byte key.
pub fn parse_private_key_hex(s: &str) -> Result<[u8; PRIVATE_KEY_LEN]> {
    if s.len() != PRIVATE_KEY_LEN * 2 {
        return Err(WalletError::InvalidKeyFormat(format!(
            "private key must be {} hex characters, got {}",
            PRIVATE_KEY_LEN * 2,
            s.len()
        )));
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidKeyFormat(
            "private key contains non-hex characters".to_string(),
        ));
    }
    let mut out = [0u8; PRIVATE_KEY_LEN];
    hex::decode_to_slice(s, &mut out)
        .map_err(|e| WalletError::InvalidKeyFormat(e.to_string()))?;
    Ok(out)
}

pub fn private_key_to_hex(key: &[u8; PRIVATE_KEY_LEN]) -> String {
    hex::encode(key)
}

/// CSPRNG-backed private key. Always a valid curve scalar.
pub fn generate_private_key() -> [u8; PRIVATE_KEY_LEN] {
    let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
    secret.secret_bytes()
}

/// 33-byte SEC1 compressed public key.
pub fn compressed_public_key(secret: &SecretKey) -> [u8; 33] {
    let secp = Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, secret).serialize()
}

/// RIPEMD-160 over SHA-256.
pub fn pubkey_hash(pubkey: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(pubkey);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_from_u8(last: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = last;
        key
    }

    #[test]
    fn test_known_vector_generator_point() {
        let codec = AddressCodec::default();
        let address = codec.derive_public_address(&key_from_u8(1)).unwrap();
        assert_eq!(address, "zeth1w508d6qejxtdg4y5r3zarvary0c5xw7kdpjwtf");
    }

    #[test]
    fn test_pubkey_hash_of_generator() {
        let secret = SecretKey::from_slice(&key_from_u8(1)).unwrap();
        let pubkey = compressed_public_key(&secret);
        assert_eq!(
            hex::encode(pubkey),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(
            hex::encode(pubkey_hash(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_custom_prefix() {
        let codec = AddressCodec::new("cosmos").unwrap();
        let address = codec.derive_public_address(&key_from_u8(1)).unwrap();
        assert_eq!(address, "cosmos1w508d6qejxtdg4y5r3zarvary0c5xw7k6ah60c");
    }

    #[test]
    fn test_rejects_wrong_length_and_zero_scalar() {
        let codec = AddressCodec::default();
        assert!(matches!(
            codec.derive_public_address(&[1u8; 31]),
            Err(WalletError::InvalidKey(_))
        ));
        assert!(matches!(
            codec.derive_public_address(&[0u8; 32]),
            Err(WalletError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_well_formed_window() {
        let codec = AddressCodec::default();
        assert!(codec.is_well_formed_address("zeth1x"));
        assert!(!codec.is_well_formed_address("zeth1"));
        assert!(!codec.is_well_formed_address("cosmos1xxxx"));
        assert!(!codec.is_well_formed_address(&format!("zeth1{}", "x".repeat(100))));
        assert!(codec.is_well_formed_address(&format!("zeth1{}", "x".repeat(95))));
    }

    #[test]
    fn test_parse_private_key_hex() {
        let key = parse_private_key_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
        assert!(parse_private_key_hex(&"ABCDEF01".repeat(8)).is_ok());
        assert!(matches!(
            parse_private_key_hex("abcd"),
            Err(WalletError::InvalidKeyFormat(_))
        ));
        assert!(matches!(
            parse_private_key_hex(&"zz".repeat(32)),
            Err(WalletError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_generated_keys_round_trip() {
        let codec = AddressCodec::default();
        let (key_hex, address) = codec.generate_account_keys().unwrap();
        assert_eq!(key_hex.len(), 64);
        assert_eq!(codec.derive_from_hex(&key_hex).unwrap(), address);
    }
}
