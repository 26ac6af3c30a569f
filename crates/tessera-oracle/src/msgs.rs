//! Oracle transaction messages

use crate::error::{OracleError, Result};
use crate::params::ParamsUpdate;
use crate::types::{parse_rates, AggregateVoteHash};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair, Coins, ValAddress};

/// Longest accepted salt, in characters
pub const MAX_SALT_LEN: usize = 4;

/// Commit to a vote by its hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAggregateExchangeRatePrevote {
    /// Hex-encoded 20-byte hash
    pub hash: String,
    pub feeder: AccAddress,
    pub validator: ValAddress,
}

impl MsgAggregateExchangeRatePrevote {
    pub fn validate_basic(&self) -> Result<AggregateVoteHash> {
        self.hash.parse()
    }
}

/// Reveal the rates committed to by the previous period's prevote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAggregateExchangeRateVote {
    pub salt: String,
    /// `pair,rate|pair,rate`
    pub rates: String,
    pub feeder: AccAddress,
    pub validator: ValAddress,
}

impl MsgAggregateExchangeRateVote {
    pub fn validate_basic(&self) -> Result<()> {
        let len = self.salt.chars().count();
        if len == 0 || len > MAX_SALT_LEN {
            return Err(OracleError::InvalidSalt(format!(
                "salt must be 1 to {MAX_SALT_LEN} characters, got {len}"
            )));
        }
        if self.salt.contains(':') {
            return Err(OracleError::InvalidSalt("salt must not contain ':'".into()));
        }
        parse_rates(&self.rates)?;
        Ok(())
    }
}

/// Let `delegate` vote on behalf of the operator's validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegateFeedConsent {
    pub operator: AccAddress,
    pub delegate: AccAddress,
}

/// Sudo: change oracle params
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditOracleParams {
    pub sender: AccAddress,
    pub update: ParamsUpdate,
}

/// Sudo: add and remove whitelisted pairs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditWhitelist {
    pub sender: AccAddress,
    #[serde(default)]
    pub add: Vec<AssetPair>,
    #[serde(default)]
    pub remove: Vec<AssetPair>,
}

/// Sudo: fund a pair reward from the treasury module account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreatePairReward {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub vote_periods: u64,
    pub coins: Coins,
}

/// Any oracle message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleMsg {
    AggregateExchangeRatePrevote(MsgAggregateExchangeRatePrevote),
    AggregateExchangeRateVote(MsgAggregateExchangeRateVote),
    DelegateFeedConsent(MsgDelegateFeedConsent),
    EditParams(MsgEditOracleParams),
    EditWhitelist(MsgEditWhitelist),
    CreatePairReward(MsgCreatePairReward),
}

impl OracleMsg {
    /// Account that must have signed the message
    pub fn signer(&self) -> AccAddress {
        match self {
            Self::AggregateExchangeRatePrevote(m) => m.feeder,
            Self::AggregateExchangeRateVote(m) => m.feeder,
            Self::DelegateFeedConsent(m) => m.operator,
            Self::EditParams(m) => m.sender,
            Self::EditWhitelist(m) => m.sender,
            Self::CreatePairReward(m) => m.sender,
        }
    }
}
