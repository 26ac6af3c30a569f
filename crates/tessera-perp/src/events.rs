//! Perp events
//!
//! [`PerpEvent`] decodes any of them from a block's event list.

use crate::types::{ChangeReason, Position};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair, Coin, Dec, TypedEvent};
use tessera_store::AbciEvent;

/// Emitted after every change to a trader's position
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChanged {
    pub final_position: Position,
    pub position_notional: Dec,
    pub realized_pnl: Dec,
    pub bad_debt: Coin,
    pub funding_payment: Dec,
    pub transaction_fee: Coin,
    pub block_height: u64,
    /// Collateral paid to the trader; negative when the trader paid in
    pub margin_to_user: Dec,
    pub change_reason: ChangeReason,
    pub exchanged_size: Dec,
    pub exchanged_notional: Dec,
}

impl TypedEvent for PositionChanged {
    const TYPE: &'static str = "perp.position_changed";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationFailed {
    pub pair: AssetPair,
    pub trader: AccAddress,
    pub liquidator: AccAddress,
    pub reason: String,
}

impl TypedEvent for LiquidationFailed {
    const TYPE: &'static str = "perp.liquidation_failed";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSuccess {
    pub pair: AssetPair,
    pub trader: AccAddress,
    pub liquidator: AccAddress,
    pub partial: bool,
    pub liquidator_fee: Coin,
    pub ecosystem_fund_fee: Coin,
    pub bad_debt: Coin,
}

impl TypedEvent for LiquidationSuccess {
    const TYPE: &'static str = "perp.liquidation_success";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPegMultiplier {
    pub pair: AssetPair,
    pub old_peg_multiplier: Dec,
    pub new_peg_multiplier: Dec,
    /// Paid by the ecosystem fund; negative when the fund received
    pub cost_paid: Dec,
}

impl TypedEvent for ShiftPegMultiplier {
    const TYPE: &'static str = "perp.shift_peg_multiplier";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSwapInvariant {
    pub pair: AssetPair,
    pub old_swap_invariant: Dec,
    pub new_swap_invariant: Dec,
    pub cost_paid: Dec,
}

impl TypedEvent for ShiftSwapInvariant {
    const TYPE: &'static str = "perp.shift_swap_invariant";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRateChanged {
    pub pair: AssetPair,
    pub mark_price_twap: Dec,
    pub index_price_twap: Dec,
    pub premium_fraction: Dec,
    pub cumulative_premium_fraction: Dec,
}

impl TypedEvent for FundingRateChanged {
    const TYPE: &'static str = "perp.funding_rate_changed";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCreated {
    pub pair: AssetPair,
    pub version: u64,
    pub sqrt_depth: Dec,
    pub price_multiplier: Dec,
}

impl TypedEvent for MarketCreated {
    const TYPE: &'static str = "perp.market_created";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketClosed {
    pub pair: AssetPair,
    pub version: u64,
    pub settlement_price: Dec,
}

impl TypedEvent for MarketClosed {
    const TYPE: &'static str = "perp.market_closed";
}

/// Any perp event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PerpEvent {
    PositionChanged(PositionChanged),
    LiquidationFailed(LiquidationFailed),
    LiquidationSuccess(LiquidationSuccess),
    ShiftPegMultiplier(ShiftPegMultiplier),
    ShiftSwapInvariant(ShiftSwapInvariant),
    FundingRateChanged(FundingRateChanged),
    MarketCreated(MarketCreated),
    MarketClosed(MarketClosed),
}

impl PerpEvent {
    /// Decode an event emitted by this module; `None` for foreign types
    pub fn decode(event: &AbciEvent) -> Option<Self> {
        match event.ty.as_str() {
            PositionChanged::TYPE => PositionChanged::from_abci(event).ok().map(Self::PositionChanged),
            LiquidationFailed::TYPE => {
                LiquidationFailed::from_abci(event).ok().map(Self::LiquidationFailed)
            }
            LiquidationSuccess::TYPE => {
                LiquidationSuccess::from_abci(event).ok().map(Self::LiquidationSuccess)
            }
            ShiftPegMultiplier::TYPE => {
                ShiftPegMultiplier::from_abci(event).ok().map(Self::ShiftPegMultiplier)
            }
            ShiftSwapInvariant::TYPE => {
                ShiftSwapInvariant::from_abci(event).ok().map(Self::ShiftSwapInvariant)
            }
            FundingRateChanged::TYPE => {
                FundingRateChanged::from_abci(event).ok().map(Self::FundingRateChanged)
            }
            MarketCreated::TYPE => MarketCreated::from_abci(event).ok().map(Self::MarketCreated),
            MarketClosed::TYPE => MarketClosed::from_abci(event).ok().map(Self::MarketClosed),
            _ => None,
        }
    }

    pub fn decode_all(events: &[AbciEvent]) -> Vec<Self> {
        events.iter().filter_map(Self::decode).collect()
    }
}
