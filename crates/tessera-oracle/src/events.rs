//! Oracle events
//!
//! Each event is a [`TypedEvent`] struct; [`OracleEvent`] wraps them for
//! decoding a block's event list in one pass.

use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair, Dec, TypedEvent, ValAddress};
use tessera_store::AbciEvent;

/// A pair's rate was written at the end of a vote period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateUpdate {
    pub pair: AssetPair,
    pub rate: Dec,
}

impl TypedEvent for ExchangeRateUpdate {
    const TYPE: &'static str = "oracle.exchange_rate_update";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePrevoteEvent {
    pub validator: ValAddress,
    pub feeder: AccAddress,
    pub hash: String,
}

impl TypedEvent for AggregatePrevoteEvent {
    const TYPE: &'static str = "oracle.aggregate_prevote";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateVoteEvent {
    pub validator: ValAddress,
    pub feeder: AccAddress,
    pub rates: String,
}

impl TypedEvent for AggregateVoteEvent {
    const TYPE: &'static str = "oracle.aggregate_vote";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederDelegationEvent {
    pub validator: ValAddress,
    pub feeder: AccAddress,
}

impl TypedEvent for FeederDelegationEvent {
    const TYPE: &'static str = "oracle.feeder_delegation";
}

/// A validator fell below the valid-vote ratio at a slash window boundary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSlashed {
    pub validator: ValAddress,
    pub miss_count: u64,
    pub slash_fraction: Dec,
}

impl TypedEvent for ValidatorSlashed {
    const TYPE: &'static str = "oracle.validator_slashed";
}

/// Any oracle event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleEvent {
    ExchangeRateUpdate(ExchangeRateUpdate),
    AggregatePrevote(AggregatePrevoteEvent),
    AggregateVote(AggregateVoteEvent),
    FeederDelegation(FeederDelegationEvent),
    ValidatorSlashed(ValidatorSlashed),
}

impl OracleEvent {
    /// Decode an event emitted by this module; `None` for foreign types
    pub fn decode(event: &AbciEvent) -> Option<Self> {
        match event.ty.as_str() {
            ExchangeRateUpdate::TYPE => {
                ExchangeRateUpdate::from_abci(event).ok().map(Self::ExchangeRateUpdate)
            }
            AggregatePrevoteEvent::TYPE => {
                AggregatePrevoteEvent::from_abci(event).ok().map(Self::AggregatePrevote)
            }
            AggregateVoteEvent::TYPE => {
                AggregateVoteEvent::from_abci(event).ok().map(Self::AggregateVote)
            }
            FeederDelegationEvent::TYPE => {
                FeederDelegationEvent::from_abci(event).ok().map(Self::FeederDelegation)
            }
            ValidatorSlashed::TYPE => ValidatorSlashed::from_abci(event).ok().map(Self::ValidatorSlashed),
            _ => None,
        }
    }

    pub fn decode_all(events: &[AbciEvent]) -> Vec<Self> {
        events.iter().filter_map(Self::decode).collect()
    }
}
