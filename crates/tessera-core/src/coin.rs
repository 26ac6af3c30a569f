//! Coins and coin sets

use crate::dec::Dec;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An amount of a single denomination
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

/// `u128` amounts as decimal strings, for `#[serde(with = ...)]`
pub mod amount_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// A normalised set of coins: sorted by denom, one entry per denom, no zeros
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalise an arbitrary list, merging duplicate denoms
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> Result<Self> {
        let mut merged: BTreeMap<String, u128> = BTreeMap::new();
        for coin in coins {
            if coin.denom.is_empty() {
                return Err(CoreError::InvalidCoins("empty denom".into()));
            }
            let entry = merged.entry(coin.denom).or_default();
            *entry = entry
                .checked_add(coin.amount)
                .ok_or_else(|| CoreError::InvalidCoins("amount overflow".into()))?;
        }
        Ok(Self(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        ))
    }

    pub fn single(amount: u128, denom: impl Into<String>) -> Self {
        if amount == 0 {
            return Self::empty();
        }
        Self(vec![Coin::new(amount, denom)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map_or(0, |c| c.amount)
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins> {
        Coins::new(self.0.iter().chain(other.0.iter()).cloned())
    }

    /// `None` when any denom would go negative
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut remaining: BTreeMap<&str, u128> =
            self.0.iter().map(|c| (c.denom.as_str(), c.amount)).collect();
        for coin in &other.0 {
            let have = remaining.get_mut(coin.denom.as_str())?;
            *have = have.checked_sub(coin.amount)?;
        }
        Some(Coins(
            remaining
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin::new(amount, denom))
                .collect(),
        ))
    }

    /// Every amount multiplied by `ratio`, truncated
    pub fn mul_dec_truncate(&self, ratio: &Dec) -> Result<Coins> {
        let mut out = Vec::with_capacity(self.0.len());
        for coin in &self.0 {
            let scaled = Dec::from(coin.amount).checked_mul_truncate(ratio)?;
            out.push(Coin::new(scaled.to_u128_truncated()?, coin.denom.clone()));
        }
        Coins::new(out)
    }

    /// Every amount divided by `n`, truncated
    pub fn quo_truncate(&self, n: u64) -> Coins {
        if n == 0 {
            return Coins::empty();
        }
        Coins(
            self.0
                .iter()
                .map(|c| Coin::new(c.amount / n as u128, c.denom.clone()))
                .filter(|c| c.amount > 0)
                .collect(),
        )
    }

    pub fn into_vec(self) -> Vec<Coin> {
        self.0
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Coins::single(coin.amount, coin.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(list: &[(u128, &str)]) -> Coins {
        Coins::new(list.iter().map(|(a, d)| Coin::new(*a, *d))).unwrap()
    }

    #[test]
    fn test_normalisation() {
        let c = coins(&[(5, "unibi"), (0, "uatom"), (3, "uusdc"), (2, "unibi")]);
        assert_eq!(c.to_string(), "7unibi,3uusdc");
        assert_eq!(c.amount_of("uatom"), 0);
    }

    #[test]
    fn test_checked_sub() {
        let have = coins(&[(10, "uusdc"), (4, "unibi")]);
        assert_eq!(
            have.checked_sub(&coins(&[(4, "unibi")])),
            Some(coins(&[(10, "uusdc")]))
        );
        assert_eq!(have.checked_sub(&coins(&[(11, "uusdc")])), None);
        assert_eq!(have.checked_sub(&coins(&[(1, "uatom")])), None);
    }

    #[test]
    fn test_mul_dec_truncate() {
        let pool = coins(&[(100_000_000, "uusdc"), (7, "unibi")]);
        let share = pool.mul_dec_truncate(&"0.6".parse().unwrap()).unwrap();
        assert_eq!(share, coins(&[(60_000_000, "uusdc"), (4, "unibi")]));
    }

    #[test]
    fn test_quo_truncate() {
        let pool = coins(&[(10, "uusdc"), (2, "unibi")]);
        assert_eq!(pool.quo_truncate(3), coins(&[(3, "uusdc")]));
        assert!(pool.quo_truncate(0).is_empty());
    }
}
