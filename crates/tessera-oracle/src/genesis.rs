//! Oracle genesis import and export

use crate::error::{OracleError, Result};
use crate::keeper::Keeper;
use crate::params::Params;
use crate::state::{
    EXCHANGE_RATES, FEEDER_DELEGATIONS, MISS_COUNTERS, PAIR_REWARDS, PAIR_REWARD_SEQ, PREVOTES,
    VOTES,
};
use crate::types::{AggregatePrevote, AggregateVote, DatedPrice, PairReward};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair, ValAddress};
use tessera_store::Context;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub params: Params,
    pub exchange_rates: Vec<(AssetPair, DatedPrice)>,
    pub feeder_delegations: Vec<(ValAddress, AccAddress)>,
    pub miss_counters: Vec<(ValAddress, u64)>,
    pub prevotes: Vec<AggregatePrevote>,
    pub votes: Vec<AggregateVote>,
    pub pair_rewards: Vec<PairReward>,
}

impl GenesisState {
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for reward in &self.pair_rewards {
            if reward.vote_periods == 0 {
                return Err(OracleError::InvalidReward(format!(
                    "reward {} has no vote periods",
                    reward.id
                )));
            }
        }
        Ok(())
    }
}

impl Keeper {
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &GenesisState) -> Result<()> {
        genesis.validate()?;
        self.set_params(ctx, &genesis.params)?;
        for (pair, price) in &genesis.exchange_rates {
            EXCHANGE_RATES.save(ctx, pair, price)?;
        }
        for (val, feeder) in &genesis.feeder_delegations {
            FEEDER_DELEGATIONS.save(ctx, val, feeder)?;
        }
        for (val, misses) in &genesis.miss_counters {
            MISS_COUNTERS.save(ctx, val, misses)?;
        }
        for prevote in &genesis.prevotes {
            PREVOTES.save(ctx, &prevote.voter, prevote)?;
        }
        for vote in &genesis.votes {
            VOTES.save(ctx, &vote.voter, vote)?;
        }
        let mut next_id = 0;
        for reward in &genesis.pair_rewards {
            PAIR_REWARDS.save(ctx, &reward.id, reward)?;
            next_id = next_id.max(reward.id + 1);
        }
        PAIR_REWARD_SEQ.save(ctx, &next_id)?;
        Ok(())
    }

    pub fn export_genesis(&self, ctx: &mut Context<'_>) -> Result<GenesisState> {
        Ok(GenesisState {
            params: self.params(ctx)?,
            exchange_rates: EXCHANGE_RATES.all(ctx)?,
            feeder_delegations: FEEDER_DELEGATIONS.all(ctx)?,
            miss_counters: MISS_COUNTERS.all(ctx)?,
            prevotes: PREVOTES.all(ctx)?.into_iter().map(|(_, p)| p).collect(),
            votes: VOTES.all(ctx)?.into_iter().map(|(_, v)| v).collect(),
            pair_rewards: self.pair_rewards(ctx)?,
        })
    }
}
