//! Asset pairs

use crate::error::{CoreError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tessera_store::KeyCodec;

/// An ordered `(base, quote)` pair, written `base:quote`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AssetPair {
    base: String,
    quote: String,
}

fn valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 32
        && symbol
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'/')
}

impl AssetPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self> {
        let (base, quote) = (base.into(), quote.into());
        if !valid_symbol(&base) || !valid_symbol(&quote) {
            return Err(CoreError::InvalidPair(format!("{base}:{quote}")));
        }
        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// `quote:base`
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.quote)
    }
}

impl fmt::Debug for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetPair({self})")
    }
}

impl FromStr for AssetPair {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => Self::new(base, quote),
            _ => Err(CoreError::InvalidPair(s.to_string())),
        }
    }
}

impl PartialOrd for AssetPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AssetPair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl Serialize for AssetPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl KeyCodec for AssetPair {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.to_string().encode_key(out);
    }

    fn decode_key(input: &mut &[u8]) -> tessera_store::Result<Self> {
        let s = String::decode_key(input)?;
        s.parse()
            .map_err(|e: CoreError| tessera_store::StoreError::InvalidKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let pair: AssetPair = "ubtc:uusd".parse().unwrap();
        assert_eq!(pair.base(), "ubtc");
        assert_eq!(pair.quote(), "uusd");
        assert_eq!(pair.to_string(), "ubtc:uusd");
        assert_eq!(pair.inverse().to_string(), "uusd:ubtc");
    }

    #[test]
    fn test_invalid_pairs() {
        assert!("ubtc".parse::<AssetPair>().is_err());
        assert!("a:b:c".parse::<AssetPair>().is_err());
        assert!(":uusd".parse::<AssetPair>().is_err());
        assert!("u btc:uusd".parse::<AssetPair>().is_err());
    }

    #[test]
    fn test_order_by_string_form() {
        let a: AssetPair = "a1:x".parse().unwrap();
        let b: AssetPair = "a:y".parse().unwrap();
        // '1' sorts before ':'
        assert!(a < b);
        assert!(a.to_key_bytes() < b.to_key_bytes());
    }

    #[test]
    fn test_key_round_trip() {
        let pair: AssetPair = "ueth:unusd".parse().unwrap();
        assert_eq!(AssetPair::from_key_bytes(&pair.to_key_bytes()).unwrap(), pair);
    }
}
