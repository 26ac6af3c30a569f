//! DnR transaction messages

use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, Coins, Dec};

/// Fund the current epoch's rebates
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAllocateEpochRebates {
    pub sender: AccAddress,
    pub coins: Coins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawEpochRebates {
    pub sender: AccAddress,
    pub epoch: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetGlobalDiscount {
    pub sender: AccAddress,
    pub volume_threshold: Dec,
    pub fee_ratio: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveGlobalDiscount {
    pub sender: AccAddress,
    pub volume_threshold: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetTraderDiscount {
    pub sender: AccAddress,
    pub trader: AccAddress,
    pub volume_threshold: Dec,
    pub fee_ratio: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRemoveTraderDiscount {
    pub sender: AccAddress,
    pub trader: AccAddress,
    pub volume_threshold: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnrMsg {
    AllocateEpochRebates(MsgAllocateEpochRebates),
    WithdrawEpochRebates(MsgWithdrawEpochRebates),
    SetGlobalDiscount(MsgSetGlobalDiscount),
    RemoveGlobalDiscount(MsgRemoveGlobalDiscount),
    SetTraderDiscount(MsgSetTraderDiscount),
    RemoveTraderDiscount(MsgRemoveTraderDiscount),
}

impl DnrMsg {
    pub fn signer(&self) -> AccAddress {
        match self {
            Self::AllocateEpochRebates(m) => m.sender,
            Self::WithdrawEpochRebates(m) => m.sender,
            Self::SetGlobalDiscount(m) => m.sender,
            Self::RemoveGlobalDiscount(m) => m.sender,
            Self::SetTraderDiscount(m) => m.sender,
            Self::RemoveTraderDiscount(m) => m.sender,
        }
    }
}
