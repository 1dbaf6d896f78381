//! Display helpers for amounts and addresses

use crate::chain::types::Coin;
use crate::error::WalletError;
use crate::Result;

/// Base unit of the native token.
pub const NATIVE_DENOM: &str = "uzeth";

pub const UZETH_PER_ZETH: u128 = 1_000_000;

const ZETH_DECIMALS: usize = 6;

/// `10000000` -> `"10.000000 ZETH"`
pub fn format_zeth(uzeth: u128) -> String {
    format!(
        "{}.{:06} ZETH",
        uzeth / UZETH_PER_ZETH,
        uzeth % UZETH_PER_ZETH
    )
}

/// Decimal ZETH to uzeth. Digits past the sixth decimal are dropped.
pub fn zeth_to_uzeth(zeth: &str) -> Result<u128> {
    let zeth = zeth.trim();
    let invalid = || WalletError::InvalidIntent(format!("'{}' is not a ZETH amount", zeth));

    let (whole, fraction) = zeth.split_once('.').unwrap_or((zeth, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut fraction: String = fraction.chars().take(ZETH_DECIMALS).collect();
    while fraction.len() < ZETH_DECIMALS {
        fraction.push('0');
    }
    let fraction: u128 = fraction.parse().map_err(|_| invalid())?;

    whole
        .checked_mul(UZETH_PER_ZETH)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

/// `head...tail`, or the address unchanged when it is already short.
pub fn shorten_address(address: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= head + tail {
        return address.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", start, end)
}

/// `"100000000uzeth"` -> `Coin { amount: 100000000, denom: "uzeth" }`
pub fn parse_coin(s: &str) -> Result<Coin> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| WalletError::InvalidIntent(format!("coin '{}' has no denom", s)))?;
    let (amount, denom) = s.split_at(split);
    if amount.is_empty() || !denom.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(WalletError::InvalidIntent(format!("invalid coin '{}'", s)));
    }
    let amount = amount
        .parse()
        .map_err(|e| WalletError::InvalidIntent(format!("invalid coin '{}': {}", s, e)))?;
    Ok(Coin::new(amount, denom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_zeth() {
        assert_eq!(format_zeth(10_000_000), "10.000000 ZETH");
        assert_eq!(format_zeth(1), "0.000001 ZETH");
        assert_eq!(format_zeth(0), "0.000000 ZETH");
    }

    #[test]
    fn test_zeth_to_uzeth() {
        assert_eq!(zeth_to_uzeth("1").unwrap(), 1_000_000);
        assert_eq!(zeth_to_uzeth("0.5").unwrap(), 500_000);
        assert_eq!(zeth_to_uzeth("1.1234567").unwrap(), 1_123_456);
        assert_eq!(zeth_to_uzeth(".25").unwrap(), 250_000);
        assert!(zeth_to_uzeth("").is_err());
        assert!(zeth_to_uzeth("1e3").is_err());
        assert!(zeth_to_uzeth("-1").is_err());
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("zeth1nqvabcdefghijklmnop0p9fuc", 8, 6),
            "zeth1nqv...0p9fuc"
        );
        assert_eq!(shorten_address("zeth1short", 8, 6), "zeth1short");
    }

    #[test]
    fn test_parse_coin() {
        assert_eq!(parse_coin("100000000uzeth").unwrap(), Coin::new(100_000_000, "uzeth"));
        assert!(parse_coin("uzeth").is_err());
        assert!(parse_coin("100").is_err());
        assert!(parse_coin("10 uzeth").is_err());
    }
}
