//! Market parameters and per-version accounting

use crate::error::{PerpError, Result};
use serde::{Deserialize, Serialize};
use tessera_core::{AssetPair, Dec};

/// A perpetual market; one per `(pair, version)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub pair: AssetPair,
    pub enabled: bool,
    pub version: u64,

    /// Margin ratio below which a position can be liquidated
    pub maintenance_margin_ratio: Dec,
    pub max_leverage: Dec,

    /// Largest relative mark move allowed within a block; zero disables
    pub price_fluctuation_limit_ratio: Dec,

    /// Largest relative mark/index spread for trading; zero disables
    pub max_oracle_spread_ratio: Dec,

    pub exchange_fee_ratio: Dec,
    pub ecosystem_fund_fee_ratio: Dec,
    pub liquidation_fee_ratio: Dec,
    pub partial_liquidation_ratio: Dec,

    /// Epoch identifier that triggers funding for this market
    pub funding_rate_epoch_id: String,
    pub twap_lookback_window_ms: i64,

    pub latest_cumulative_premium_fraction: Dec,

    /// Collateral pulled from the ecosystem fund ahead of realised bad debt
    pub prepaid_bad_debt: Dec,
}

impl Market {
    pub fn new(pair: AssetPair) -> Self {
        Self {
            pair,
            enabled: false,
            version: 0,
            maintenance_margin_ratio: Dec::with_prec(625, 4),
            max_leverage: Dec::from(10i64),
            price_fluctuation_limit_ratio: Dec::percent(10),
            max_oracle_spread_ratio: Dec::percent(10),
            exchange_fee_ratio: Dec::with_prec(1, 3),
            ecosystem_fund_fee_ratio: Dec::with_prec(1, 3),
            liquidation_fee_ratio: Dec::percent(5),
            partial_liquidation_ratio: Dec::percent(50),
            funding_rate_epoch_id: "30min".into(),
            twap_lookback_window_ms: 30 * 60 * 1_000,
            latest_cumulative_premium_fraction: Dec::zero(),
            prepaid_bad_debt: Dec::zero(),
        }
    }

    /// `1 / max_leverage`
    pub fn initial_margin_ratio(&self) -> Result<Dec> {
        Ok(Dec::one().checked_quo(&self.max_leverage)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("maintenance_margin_ratio", &self.maintenance_margin_ratio),
            ("price_fluctuation_limit_ratio", &self.price_fluctuation_limit_ratio),
            ("max_oracle_spread_ratio", &self.max_oracle_spread_ratio),
            ("exchange_fee_ratio", &self.exchange_fee_ratio),
            ("ecosystem_fund_fee_ratio", &self.ecosystem_fund_fee_ratio),
            ("liquidation_fee_ratio", &self.liquidation_fee_ratio),
            ("partial_liquidation_ratio", &self.partial_liquidation_ratio),
        ] {
            if value.is_negative() || *value > Dec::one() {
                return Err(PerpError::InvalidMarket(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_leverage < Dec::one() {
            return Err(PerpError::InvalidMarket(format!(
                "max_leverage must be at least 1, got {}",
                self.max_leverage
            )));
        }
        if self.maintenance_margin_ratio >= self.initial_margin_ratio()? {
            return Err(PerpError::InvalidMarket(format!(
                "maintenance_margin_ratio {} must be below 1 / max_leverage",
                self.maintenance_margin_ratio
            )));
        }
        if self.twap_lookback_window_ms < 0 {
            return Err(PerpError::InvalidMarket("twap lookback must not be negative".into()));
        }
        if self.funding_rate_epoch_id.is_empty() {
            return Err(PerpError::InvalidMarket("funding epoch id must be set".into()));
        }
        if self.prepaid_bad_debt.is_negative() {
            return Err(PerpError::InvalidMarket("prepaid bad debt must not be negative".into()));
        }
        Ok(())
    }
}
