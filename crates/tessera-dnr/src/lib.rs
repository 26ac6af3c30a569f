//! # Tessera DnR
//!
//! Discount and rebate accounting per epoch:
//! - every trade adds `|notional|` to the trader's and the global volume of
//!   the current epoch
//! - the fee ratio a trader pays depends on last epoch's volume, through a
//!   per-trader override or the global threshold schedule
//! - at each epoch boundary the allocation account moves into escrow, and
//!   traders withdraw their volume-weighted share of past epochs

pub mod error;
pub mod events;
pub mod genesis;
pub mod hooks;
pub mod keeper;
pub mod msg_server;
pub mod msgs;
pub mod state;

pub use error::{DnrError, Result};
pub use events::DnrEvent;
pub use genesis::GenesisState;
pub use keeper::Keeper;
pub use msgs::{
    DnrMsg, MsgAllocateEpochRebates, MsgRemoveGlobalDiscount, MsgRemoveTraderDiscount,
    MsgSetGlobalDiscount, MsgSetTraderDiscount, MsgWithdrawEpochRebates,
};
