//! DnR events

use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, Coins, TypedEvent};
use tessera_store::AbciEvent;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebatesAllocated {
    pub sender: AccAddress,
    pub epoch: u64,
    pub coins: Coins,
}

impl TypedEvent for RebatesAllocated {
    const TYPE: &'static str = "dnr.rebates_allocated";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebatesWithdrawn {
    pub trader: AccAddress,
    pub epoch: u64,
    pub coins: Coins,
}

impl TypedEvent for RebatesWithdrawn {
    const TYPE: &'static str = "dnr.rebates_withdrawn";
}

/// A new DnR epoch began and the previous allocation moved to escrow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnrEpochStarted {
    pub epoch: u64,
    pub escrowed: Coins,
}

impl TypedEvent for DnrEpochStarted {
    const TYPE: &'static str = "dnr.epoch_started";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnrEvent {
    RebatesAllocated(RebatesAllocated),
    RebatesWithdrawn(RebatesWithdrawn),
    DnrEpochStarted(DnrEpochStarted),
}

impl DnrEvent {
    pub fn decode(event: &AbciEvent) -> Option<Self> {
        match event.ty.as_str() {
            RebatesAllocated::TYPE => RebatesAllocated::from_abci(event).ok().map(Self::RebatesAllocated),
            RebatesWithdrawn::TYPE => RebatesWithdrawn::from_abci(event).ok().map(Self::RebatesWithdrawn),
            DnrEpochStarted::TYPE => DnrEpochStarted::from_abci(event).ok().map(Self::DnrEpochStarted),
            _ => None,
        }
    }

    pub fn decode_all(events: &[AbciEvent]) -> Vec<Self> {
        events.iter().filter_map(Self::decode).collect()
    }
}
