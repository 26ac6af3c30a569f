//! Oracle module parameters

use crate::error::{OracleError, Result};
use serde::{Deserialize, Serialize};
use tessera_core::{AssetPair, Dec};

/// Parameters governing voting, tallying and slashing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Blocks per vote period
    pub vote_period: u64,

    /// Fraction of bonded power a pair's ballot needs to pass
    pub vote_threshold: Dec,

    /// Relative width around the median in which a ballot wins
    pub reward_band: Dec,

    /// Pairs the oracle publishes rates for
    pub whitelist: Vec<AssetPair>,

    /// Fraction of bonded stake slashed for missing too many periods
    pub slash_fraction: Dec,

    /// Blocks per slash window; a multiple of `vote_period`
    pub slash_window: u64,

    /// Minimum fraction of valid periods per window to avoid slashing
    pub min_valid_per_window: Dec,

    /// Lookback for the index TWAP, in milliseconds
    pub twap_lookback_window_ms: i64,

    /// Minimum non-abstaining voters for a pair to pass
    pub min_voters: u64,

    /// Blocks after which a published rate is discarded
    pub expiration_blocks: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            vote_period: 10,
            vote_threshold: Dec::percent(33),
            reward_band: Dec::percent(2),
            whitelist: Vec::new(),
            slash_fraction: Dec::with_prec(5, 3),
            slash_window: 3_600,
            min_valid_per_window: Dec::percent(69),
            twap_lookback_window_ms: 15 * 60 * 1_000,
            min_voters: 4,
            expiration_blocks: 900,
        }
    }
}

fn check_ratio(name: &str, value: &Dec) -> Result<()> {
    if value.is_negative() || *value > Dec::one() {
        return Err(OracleError::InvalidParams(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if self.vote_period == 0 {
            return Err(OracleError::InvalidParams("vote_period must be positive".into()));
        }
        if !self.vote_threshold.is_positive() {
            return Err(OracleError::InvalidParams("vote_threshold must be positive".into()));
        }
        check_ratio("vote_threshold", &self.vote_threshold)?;
        check_ratio("reward_band", &self.reward_band)?;
        check_ratio("slash_fraction", &self.slash_fraction)?;
        check_ratio("min_valid_per_window", &self.min_valid_per_window)?;
        if self.slash_window < self.vote_period || self.slash_window % self.vote_period != 0 {
            return Err(OracleError::InvalidParams(format!(
                "slash_window {} must be a positive multiple of vote_period {}",
                self.slash_window, self.vote_period
            )));
        }
        if self.twap_lookback_window_ms < 0 {
            return Err(OracleError::InvalidParams(
                "twap_lookback_window_ms must not be negative".into(),
            ));
        }
        let mut seen = self.whitelist.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.whitelist.len() {
            return Err(OracleError::InvalidParams("whitelist has duplicates".into()));
        }
        Ok(())
    }

    /// Vote periods in one slash window
    pub fn vote_periods_per_window(&self) -> u64 {
        self.slash_window / self.vote_period
    }

    /// Vote period a block belongs to; periods end on multiples of `vote_period`
    pub fn period_of(&self, height: u64) -> u64 {
        height.saturating_sub(1) / self.vote_period
    }

    pub fn is_period_end(&self, height: u64) -> bool {
        height % self.vote_period == 0
    }

    pub fn is_slash_window_end(&self, height: u64) -> bool {
        height % self.slash_window == 0
    }
}

/// Partial update applied by the sudo edit message; `None` keeps the value
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsUpdate {
    pub vote_period: Option<u64>,
    pub vote_threshold: Option<Dec>,
    pub reward_band: Option<Dec>,
    pub whitelist: Option<Vec<AssetPair>>,
    pub slash_fraction: Option<Dec>,
    pub slash_window: Option<u64>,
    pub min_valid_per_window: Option<Dec>,
    pub twap_lookback_window_ms: Option<i64>,
    pub min_voters: Option<u64>,
    pub expiration_blocks: Option<u64>,
}

impl ParamsUpdate {
    pub fn apply(&self, params: &Params) -> Params {
        let mut next = params.clone();
        if let Some(v) = self.vote_period {
            next.vote_period = v;
        }
        if let Some(v) = &self.vote_threshold {
            next.vote_threshold = v.clone();
        }
        if let Some(v) = &self.reward_band {
            next.reward_band = v.clone();
        }
        if let Some(v) = &self.whitelist {
            next.whitelist = v.clone();
        }
        if let Some(v) = &self.slash_fraction {
            next.slash_fraction = v.clone();
        }
        if let Some(v) = self.slash_window {
            next.slash_window = v;
        }
        if let Some(v) = &self.min_valid_per_window {
            next.min_valid_per_window = v.clone();
        }
        if let Some(v) = self.twap_lookback_window_ms {
            next.twap_lookback_window_ms = v;
        }
        if let Some(v) = self.min_voters {
            next.min_voters = v;
        }
        if let Some(v) = self.expiration_blocks {
            next.expiration_blocks = v;
        }
        next
    }
}
