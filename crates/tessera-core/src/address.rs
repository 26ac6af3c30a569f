//! Account and validator addresses
//!
//! Both are 20-byte identifiers. The text form `<hrp>1<hex>` appears in logs,
//! events and the oracle prevote hash.

use crate::error::CoreError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tessera_store::key::take_bytes;
use tessera_store::KeyCodec;

/// Address length in bytes
pub const ADDRESS_LEN: usize = 20;

/// Human readable prefix of account addresses
pub const ACCOUNT_HRP: &str = "tsr";

/// Human readable prefix of validator operator addresses
pub const VALIDATOR_HRP: &str = "tsrvaloper";

macro_rules! define_address {
    ($name:ident, $hrp:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; ADDRESS_LEN]);

        impl $name {
            pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
                &self.0
            }

            /// Deterministic address derived from a label
            pub fn from_seed(seed: &str) -> Self {
                let digest = Sha256::digest(seed.as_bytes());
                let mut bytes = [0u8; ADDRESS_LEN];
                bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}1{}", $hrp, hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, CoreError> {
                let invalid = || CoreError::InvalidAddress(s.to_string());
                let body = s
                    .strip_prefix($hrp)
                    .and_then(|rest| rest.strip_prefix('1'))
                    .ok_or_else(invalid)?;
                let raw = hex::decode(body).map_err(|_| invalid())?;
                let bytes: [u8; ADDRESS_LEN] = raw.try_into().map_err(|_| invalid())?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }

        impl KeyCodec for $name {
            fn encode_key(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.0);
            }

            fn decode_key(input: &mut &[u8]) -> tessera_store::Result<Self> {
                let mut bytes = [0u8; ADDRESS_LEN];
                bytes.copy_from_slice(take_bytes(input, ADDRESS_LEN)?);
                Ok(Self(bytes))
            }
        }
    };
}

define_address!(AccAddress, ACCOUNT_HRP, "Account address");
define_address!(ValAddress, VALIDATOR_HRP, "Validator operator address");

impl AccAddress {
    /// Address of a module-owned account: `sha256(name)[..20]`
    pub fn module(name: &str) -> Self {
        Self::from_seed(name)
    }
}

/// A validator's operator account shares its address bytes
impl From<ValAddress> for AccAddress {
    fn from(val: ValAddress) -> Self {
        AccAddress(val.0)
    }
}

impl From<AccAddress> for ValAddress {
    fn from(acc: AccAddress) -> Self {
        ValAddress(acc.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        let val = ValAddress::from_seed("validator-1");
        let text = val.to_string();
        assert!(text.starts_with("tsrvaloper1"));
        assert_eq!(text.parse::<ValAddress>().unwrap(), val);

        let acc = AccAddress::from(val);
        assert!(acc.to_string().starts_with("tsr1"));
        assert_eq!(acc.0, val.0);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let acc = AccAddress::from_seed("trader");
        assert!(acc.to_string().parse::<ValAddress>().is_err());
        assert!("tsr1zz".parse::<AccAddress>().is_err());
    }

    #[test]
    fn test_module_address_stable() {
        assert_eq!(AccAddress::module("vault"), AccAddress::module("vault"));
        assert_ne!(AccAddress::module("vault"), AccAddress::module("perp_ef"));
    }
}
