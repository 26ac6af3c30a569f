//! Oracle state records and the prevote hash

use crate::error::{OracleError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tessera_core::{AssetPair, Coins, Dec, ValAddress};

/// Length of a prevote hash in bytes
pub const VOTE_HASH_LEN: usize = 20;

/// Truncated SHA-256 commitment to a vote
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateVoteHash(pub [u8; VOTE_HASH_LEN]);

impl AggregateVoteHash {
    /// `SHA256("{salt}:{rates}:{validator}")[..20]`
    pub fn new(salt: &str, rates: &str, validator: &ValAddress) -> Self {
        let digest = Sha256::digest(format!("{salt}:{rates}:{validator}").as_bytes());
        let mut bytes = [0u8; VOTE_HASH_LEN];
        bytes.copy_from_slice(&digest[..VOTE_HASH_LEN]);
        Self(bytes)
    }
}

impl fmt::Display for AggregateVoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for AggregateVoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregateVoteHash({self})")
    }
}

impl FromStr for AggregateVoteHash {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim()).map_err(|e| OracleError::InvalidHash(e.to_string()))?;
        let bytes: [u8; VOTE_HASH_LEN] = raw
            .try_into()
            .map_err(|_| OracleError::InvalidHash(format!("expected {VOTE_HASH_LEN} bytes")))?;
        Ok(Self(bytes))
    }
}

/// One `(pair, rate)` entry of a vote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateTuple {
    pub pair: AssetPair,
    pub rate: Dec,
}

impl ExchangeRateTuple {
    pub fn new(pair: AssetPair, rate: Dec) -> Self {
        Self { pair, rate }
    }
}

/// Render tuples as `pair,rate|pair,rate`
pub fn format_rates(tuples: &[ExchangeRateTuple]) -> String {
    tuples
        .iter()
        .map(|t| format!("{},{}", t.pair, t.rate))
        .collect::<Vec<_>>()
        .join("|")
}

/// Parse `pair,rate|pair,rate`; pairs must be unique
pub fn parse_rates(s: &str) -> Result<Vec<ExchangeRateTuple>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(OracleError::InvalidRates("empty rates".into()));
    }
    let mut seen = BTreeSet::new();
    let mut tuples = Vec::new();
    for entry in trimmed.split('|') {
        let (pair, rate) = entry
            .split_once(',')
            .ok_or_else(|| OracleError::InvalidRates(format!("malformed entry {entry:?}")))?;
        let pair: AssetPair = pair.trim().parse()?;
        let rate: Dec = rate.trim().parse()?;
        if !seen.insert(pair.clone()) {
            return Err(OracleError::DuplicatePair(pair));
        }
        tuples.push(ExchangeRateTuple { pair, rate });
    }
    Ok(tuples)
}

/// A hash commitment awaiting its reveal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePrevote {
    pub hash: AggregateVoteHash,
    pub voter: ValAddress,
    pub submit_block: u64,
}

/// Revealed rates of one validator for the current period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateVote {
    pub voter: ValAddress,
    pub rates: Vec<ExchangeRateTuple>,
}

/// One validator's claim for one pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeRateBallot {
    pub pair: AssetPair,
    pub rate: Dec,
    pub voter: ValAddress,
    pub power: i64,
}

impl ExchangeRateBallot {
    /// A zero or negative rate abstains
    pub fn is_abstain(&self) -> bool {
        !self.rate.is_positive()
    }
}

/// Per-validator outcome of one vote period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPerformance {
    pub validator: ValAddress,
    /// Consensus power at the start of the period
    pub power: i64,
    /// Power contributed by winning ballots
    pub reward_weight: i64,
    /// Winning or abstaining ballots
    pub win_count: i64,
}

impl ValidatorPerformance {
    pub fn new(validator: ValAddress, power: i64) -> Self {
        Self {
            validator,
            power,
            reward_weight: 0,
            win_count: 0,
        }
    }
}

/// Performances of the active validator set, keyed by address
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorPerformances(pub BTreeMap<ValAddress, ValidatorPerformance>);

impl ValidatorPerformances {
    pub fn get(&self, val: &ValAddress) -> Option<&ValidatorPerformance> {
        self.0.get(val)
    }

    pub fn get_mut(&mut self, val: &ValAddress) -> Option<&mut ValidatorPerformance> {
        self.0.get_mut(val)
    }

    pub fn contains(&self, val: &ValAddress) -> bool {
        self.0.contains_key(val)
    }

    pub fn insert(&mut self, perf: ValidatorPerformance) {
        self.0.insert(perf.validator, perf);
    }

    pub fn total_reward_weight(&self) -> i64 {
        self.0.values().map(|p| p.reward_weight).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorPerformance> {
        self.0.values()
    }
}

/// A published rate and the block that produced it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedPrice {
    pub rate: Dec,
    pub created_block: u64,
}

/// A rate observation kept for the index TWAP
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub pair: AssetPair,
    pub price: Dec,
    pub timestamp_ms: i64,
}

/// Coins paid out to accurate voters of a pair over several periods
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReward {
    pub id: u64,
    pub pair: AssetPair,
    /// Periods left to pay out
    pub vote_periods: u64,
    /// Coins not yet paid
    pub coins: Coins,
}

impl PairReward {
    /// Share paid in the next passing period
    pub fn period_share(&self) -> Coins {
        self.coins.quo_truncate(self.vote_periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(s: &str) -> AssetPair {
        s.parse().unwrap()
    }

    #[test]
    fn test_rates_round_trip() {
        let rates = "ubtc:uusd,42000.5|ueth:uusd,-1";
        let tuples = parse_rates(rates).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[1].rate, Dec::from(-1i64));
        assert_eq!(format_rates(&tuples), rates);
    }

    #[test]
    fn test_rates_canonicalised() {
        let tuples = parse_rates(" ubtc:uusd , 42000.500 ").unwrap();
        assert_eq!(format_rates(&tuples), "ubtc:uusd,42000.5");
    }

    #[test]
    fn test_duplicate_pairs_rejected() {
        let err = parse_rates("ubtc:uusd,1|ubtc:uusd,2").unwrap_err();
        assert_eq!(err, OracleError::DuplicatePair(pair("ubtc:uusd")));
        assert!(parse_rates("").is_err());
        assert!(parse_rates("ubtc:uusd").is_err());
    }

    #[test]
    fn test_vote_hash() {
        let val = ValAddress::from_seed("validator");
        let a = AggregateVoteHash::new("salt", "ubtc:uusd,1", &val);
        let b = AggregateVoteHash::new("salt", "ubtc:uusd,2", &val);
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 40);
        assert_eq!(a.to_string().parse::<AggregateVoteHash>().unwrap(), a);
        assert!("abcd".parse::<AggregateVoteHash>().is_err());
    }

    #[test]
    fn test_period_share() {
        let reward = PairReward {
            id: 0,
            pair: pair("ubtc:uusd"),
            vote_periods: 3,
            coins: Coins::single(10, "unibi"),
        };
        assert_eq!(reward.period_share(), Coins::single(3, "unibi"));
    }
}
