//! Perp transaction messages

use crate::market::Market;
use crate::types::{Direction, LiquidateRequest};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair, Coin, Dec};

/// Open or change a position at market price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMarketOrder {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub side: Direction,
    #[serde(with = "tessera_core::coin::amount_string")]
    pub quote_asset_amount: u128,
    pub leverage: Dec,
    /// Minimum base received (long) or maximum base given (short); zero disables
    #[serde(default)]
    pub base_asset_amount_limit: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddMargin {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub margin: Coin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveMargin {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub margin: Coin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgClosePosition {
    pub sender: AccAddress,
    pub pair: AssetPair,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMultiLiquidate {
    pub sender: AccAddress,
    pub liquidations: Vec<LiquidateRequest>,
}

/// Pay out a position in a closed market version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSettlePosition {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateMarket {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub sqrt_depth: Dec,
    pub price_multiplier: Dec,
    /// Market parameters; defaults apply when absent
    #[serde(default)]
    pub market: Option<Market>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCloseMarket {
    pub sender: AccAddress,
    pub pair: AssetPair,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgShiftPegMultiplier {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub new_peg_multiplier: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgShiftSwapInvariant {
    pub sender: AccAddress,
    pub pair: AssetPair,
    pub new_swap_invariant: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgChangeCollateralDenom {
    pub sender: AccAddress,
    pub new_denom: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWhitelistLiquidator {
    pub sender: AccAddress,
    pub liquidator: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PerpMsg {
    MarketOrder(MsgMarketOrder),
    AddMargin(MsgAddMargin),
    RemoveMargin(MsgRemoveMargin),
    ClosePosition(MsgClosePosition),
    MultiLiquidate(MsgMultiLiquidate),
    SettlePosition(MsgSettlePosition),
    CreateMarket(MsgCreateMarket),
    CloseMarket(MsgCloseMarket),
    ShiftPegMultiplier(MsgShiftPegMultiplier),
    ShiftSwapInvariant(MsgShiftSwapInvariant),
    ChangeCollateralDenom(MsgChangeCollateralDenom),
    WhitelistLiquidator(MsgWhitelistLiquidator),
}

impl PerpMsg {
    pub fn signer(&self) -> AccAddress {
        match self {
            Self::MarketOrder(m) => m.sender,
            Self::AddMargin(m) => m.sender,
            Self::RemoveMargin(m) => m.sender,
            Self::ClosePosition(m) => m.sender,
            Self::MultiLiquidate(m) => m.sender,
            Self::SettlePosition(m) => m.sender,
            Self::CreateMarket(m) => m.sender,
            Self::CloseMarket(m) => m.sender,
            Self::ShiftPegMultiplier(m) => m.sender,
            Self::ShiftSwapInvariant(m) => m.sender,
            Self::ChangeCollateralDenom(m) => m.sender,
            Self::WhitelistLiquidator(m) => m.sender,
        }
    }

    /// Messages that require sudo permissions
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::CreateMarket(_)
                | Self::CloseMarket(_)
                | Self::ShiftPegMultiplier(_)
                | Self::ShiftSwapInvariant(_)
                | Self::ChangeCollateralDenom(_)
                | Self::WhitelistLiquidator(_)
        )
    }
}
