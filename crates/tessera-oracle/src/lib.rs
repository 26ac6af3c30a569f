//! # Tessera Oracle
//!
//! Validators publish exchange rates in two phases:
//!
//! | Phase | Message | Stored as |
//! |-------|---------|-----------|
//! | commit (period n) | [`MsgAggregateExchangeRatePrevote`] | hash of `salt:rates:validator` |
//! | reveal (period n+1) | [`MsgAggregateExchangeRateVote`] | rates, checked against the hash |
//!
//! At the end of each vote period the stored votes are tallied per pair into
//! a stake-weighted median ([`ballot::tally`]). Validators outside the reward
//! band miss the period; too many misses in a slash window get them slashed
//! and jailed. Passing pairs pay out their pair rewards to accurate voters.
//!
//! Other modules read rates through [`tessera_core::host::PriceOracle`],
//! implemented by [`Keeper`].

pub mod abci;
pub mod ballot;
pub mod error;
pub mod events;
pub mod genesis;
pub mod keeper;
pub mod msg_server;
pub mod msgs;
pub mod params;
pub mod rewards;
pub mod slashing;
pub mod state;
pub mod types;

pub use error::{OracleError, Result};
pub use events::OracleEvent;
pub use genesis::GenesisState;
pub use keeper::Keeper;
pub use msgs::{
    MsgAggregateExchangeRatePrevote, MsgAggregateExchangeRateVote, MsgCreatePairReward,
    MsgDelegateFeedConsent, MsgEditOracleParams, MsgEditWhitelist, OracleMsg,
};
pub use params::{Params, ParamsUpdate};
pub use types::{
    format_rates, parse_rates, AggregatePrevote, AggregateVote, AggregateVoteHash, DatedPrice,
    ExchangeRateBallot, ExchangeRateTuple, PairReward, PriceSnapshot, ValidatorPerformance,
    ValidatorPerformances,
};
