//! # Tessera Perp
//!
//! Perpetual futures against a virtual constant-product AMM.
//!
//! ## Layout
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`amm`] | reserve math, peg and invariant shifts |
//! | [`market`] | per-version market parameters |
//! | [`keeper`] | state access, swaps, TWAPs, vault accounting |
//! | [`position`] | market orders, margin, close and settlement |
//! | [`liquidate`] | partial and full liquidation |
//! | [`admin`] | market lifecycle and sudo operations |
//! | [`hooks`] | reserve snapshots per block, funding per epoch |
//!
//! Positions, AMMs and markets are keyed by `(pair, version)`. Closing a
//! market freezes its version at a settlement price; a new version can then
//! be created for the same pair while old positions settle one by one.

pub mod admin;
pub mod amm;
pub mod error;
pub mod events;
pub mod genesis;
pub mod hooks;
pub mod keeper;
pub mod liquidate;
pub mod market;
pub mod msg_server;
pub mod msgs;
pub mod position;
pub mod state;
pub mod types;

pub use amm::Amm;
pub use error::{PerpError, Result};
pub use events::PerpEvent;
pub use genesis::GenesisState;
pub use keeper::Keeper;
pub use liquidate::LiquidationFees;
pub use market::Market;
pub use msgs::{
    MsgAddMargin, MsgChangeCollateralDenom, MsgCloseMarket, MsgClosePosition, MsgCreateMarket,
    MsgMarketOrder, MsgMultiLiquidate, MsgRemoveMargin, MsgSettlePosition, MsgShiftPegMultiplier,
    MsgShiftSwapInvariant, MsgWhitelistLiquidator, PerpMsg,
};
pub use types::{
    ChangeReason, Direction, LiquidateRequest, LiquidationResponse, Position, PositionResp,
    ReserveSnapshot,
};
