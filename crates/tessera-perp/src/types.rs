//! Position types and trade results

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{AccAddress, AssetPair, Dec};

/// Side of a swap or a position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Direction that unwinds a signed base amount
    pub fn closing(size: &Dec) -> Self {
        if size.is_positive() {
            Self::Short
        } else {
            Self::Long
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Why a position changed, carried on [`crate::events::PositionChanged`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    MarketOrder,
    ClosePosition,
    AddMargin,
    RemoveMargin,
    PartialLiquidation,
    FullLiquidation,
    Settlement,
}

/// A trader's open position in one market version
///
/// `size > 0` is long, `size < 0` short. A zero-size position is never
/// stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pair: AssetPair,
    pub trader: AccAddress,
    pub version: u64,
    pub size: Dec,
    pub margin: Dec,
    pub open_notional: Dec,
    pub latest_cumulative_premium_fraction: Dec,
    pub last_updated_block: u64,
}

impl Position {
    pub fn zero(pair: AssetPair, trader: AccAddress, version: u64, cpf: Dec, height: u64) -> Self {
        Self {
            pair,
            trader,
            version,
            size: Dec::zero(),
            margin: Dec::zero(),
            open_notional: Dec::zero(),
            latest_cumulative_premium_fraction: cpf,
            last_updated_block: height,
        }
    }

    /// `(market_cpf - position_cpf) * size`, taken out of margin
    pub fn funding_payment(&self, market_cpf: &Dec) -> Dec {
        (market_cpf - &self.latest_cumulative_premium_fraction) * &self.size
    }

    /// Profit if the position were closed at `notional`
    pub fn unrealized_pnl(&self, notional: &Dec) -> Dec {
        if self.size.is_positive() {
            notional - &self.open_notional
        } else if self.size.is_negative() {
            &self.open_notional - notional
        } else {
            Dec::zero()
        }
    }

    /// `(margin + unrealized_pnl - funding) / notional`; zero for an empty position
    pub fn margin_ratio(&self, notional: &Dec, market_cpf: &Dec) -> Dec {
        if self.size.is_zero() || notional.is_zero() {
            return Dec::zero();
        }
        let remaining = &self.margin + self.unrealized_pnl(notional) - self.funding_payment(market_cpf);
        remaining / notional
    }
}

/// Mark state captured for TWAPs and the fluctuation guard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub version: u64,
    pub base_reserve: Dec,
    pub quote_reserve: Dec,
    pub price_multiplier: Dec,
    pub timestamp_ms: i64,
}

impl ReserveSnapshot {
    pub fn mark_price(&self) -> Dec {
        if self.base_reserve.is_zero() || self.quote_reserve.is_zero() {
            return Dec::zero();
        }
        &self.quote_reserve / &self.base_reserve * &self.price_multiplier
    }
}

/// Outcome of one position mutation before funds move
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionResp {
    pub position: Position,
    /// Signed base amount traded
    pub exchanged_position_size: Dec,
    /// Signed quote notional traded
    pub exchanged_notional: Dec,
    /// Notional of the resulting position at spot
    pub position_notional: Dec,
    pub funding_payment: Dec,
    pub realized_pnl: Dec,
    pub bad_debt: Dec,
    pub unrealized_pnl_after: Dec,
    /// Collateral flowing into the vault; negative flows to the trader
    pub margin_to_vault: Dec,
}

impl PositionResp {
    pub(crate) fn empty(position: Position) -> Self {
        Self {
            position,
            exchanged_position_size: Dec::zero(),
            exchanged_notional: Dec::zero(),
            position_notional: Dec::zero(),
            funding_payment: Dec::zero(),
            realized_pnl: Dec::zero(),
            bad_debt: Dec::zero(),
            unrealized_pnl_after: Dec::zero(),
            margin_to_vault: Dec::zero(),
        }
    }
}

/// One entry of a multi-liquidation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateRequest {
    pub pair: AssetPair,
    pub trader: AccAddress,
}

/// Result of one liquidation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResponse {
    pub pair: AssetPair,
    pub trader: AccAddress,
    pub success: bool,
    pub liquidator_fee: u128,
    pub ecosystem_fund_fee: u128,
    pub error: Option<String>,
}
