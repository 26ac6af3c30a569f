//! # End-of-block processing
//!
//! At the last block of every vote period:
//!
//! ```text
//! votes ──► ballots per pair ──► drop failing pairs ──► tally ──► rates
//!                                                     │
//!                                                     ├──► miss counters
//!                                                     └──► pair rewards
//! ```
//!
//! then votes are cleared and stale prevotes evicted. At the last block of a
//! slash window, low-participation validators are slashed.

use crate::ballot::{num_valid_voters, tally, total_power};
use crate::error::Result;
use crate::keeper::Keeper;
use crate::params::Params;
use crate::state::{MISS_COUNTERS, PREVOTES, VOTES};
use crate::types::{ExchangeRateBallot, ValidatorPerformance, ValidatorPerformances};
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::{AssetPair, Dec};
use tessera_store::Context;
use tracing::{debug, info, warn};

impl Keeper {
    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> Result<()> {
        let params = self.params(ctx)?;
        let height = ctx.block_height();
        if params.is_period_end(height) {
            self.update_exchange_rates(ctx, &params)?;
        }
        if params.is_slash_window_end(height) {
            self.slash_and_reset_miss_counters(ctx, &params)?;
        }
        Ok(())
    }

    /// Tally the period's votes and publish passing rates
    pub(crate) fn update_exchange_rates(&self, ctx: &mut Context<'_>, params: &Params) -> Result<()> {
        let height = ctx.block_height();
        let mut performances = self.validator_performances(ctx)?;
        let ballots = self.ballots_by_pair(ctx, &performances)?;
        let passing = self.passing_ballots(ctx, params, ballots)?;

        for pair in passing.keys() {
            self.clear_rate(ctx, pair)?;
        }
        self.clear_expired_rates(ctx, params)?;

        for (pair, ballots) in &passing {
            let rate = tally(pair, ballots, &params.reward_band, &mut performances)?;
            self.set_price(ctx, pair, &rate)?;
        }

        // a validator misses the period unless it won every passing pair
        let targets = passing.len() as i64;
        if targets > 0 {
            for perf in performances.iter() {
                if perf.win_count < targets {
                    let misses = self.miss_counter(ctx, &perf.validator)?;
                    MISS_COUNTERS.save(ctx, &perf.validator, &(misses + 1))?;
                }
            }
        }

        let passed: BTreeSet<AssetPair> = passing.into_keys().collect();
        self.distribute_rewards(ctx, &passed, &performances)?;

        VOTES.clear(ctx)?;
        for (val, prevote) in PREVOTES.all(ctx)? {
            if height.saturating_sub(prevote.submit_block) >= params.vote_period {
                PREVOTES.remove(ctx, &val)?;
            }
        }

        info!(
            height,
            period = params.period_of(height),
            pairs = passed.len(),
            "closed vote period"
        );
        Ok(())
    }

    /// Performance entries for the active validator set
    fn validator_performances(&self, ctx: &mut Context<'_>) -> Result<ValidatorPerformances> {
        let mut performances = ValidatorPerformances::default();
        for val in self.staking.active_validators(ctx)? {
            let power = self.staking.validator_power(ctx, &val)?;
            performances.insert(ValidatorPerformance::new(val, power));
        }
        Ok(performances)
    }

    /// Stored votes of active validators grouped by pair; abstains carry no power
    fn ballots_by_pair(
        &self,
        ctx: &mut Context<'_>,
        performances: &ValidatorPerformances,
    ) -> Result<BTreeMap<AssetPair, Vec<ExchangeRateBallot>>> {
        let mut ballots: BTreeMap<AssetPair, Vec<ExchangeRateBallot>> = BTreeMap::new();
        for (voter, vote) in self.votes(ctx)? {
            let Some(perf) = performances.get(&voter) else {
                debug!(%voter, "ignoring vote of inactive validator");
                continue;
            };
            for tuple in vote.rates {
                let power = if tuple.rate.is_positive() { perf.power } else { 0 };
                ballots.entry(tuple.pair.clone()).or_default().push(ExchangeRateBallot {
                    pair: tuple.pair,
                    rate: tuple.rate,
                    voter,
                    power,
                });
            }
        }
        Ok(ballots)
    }

    /// Keep whitelisted pairs with enough power and voters, in pair order
    fn passing_ballots(
        &self,
        ctx: &mut Context<'_>,
        params: &Params,
        ballots: BTreeMap<AssetPair, Vec<ExchangeRateBallot>>,
    ) -> Result<BTreeMap<AssetPair, Vec<ExchangeRateBallot>>> {
        let total_bonded = self.staking.total_bonded_power(ctx)?;
        let threshold = Dec::from(total_bonded)
            .checked_mul(&params.vote_threshold)?
            .to_i64_rounded()?;

        let mut passing = BTreeMap::new();
        for (pair, pair_ballots) in ballots {
            if !self.is_whitelisted(ctx, &pair)? {
                debug!(%pair, "dropping ballot for unlisted pair");
                continue;
            }
            let power = total_power(&pair_ballots);
            let voters = num_valid_voters(&pair_ballots) as u64;
            if power <= 0 || power < threshold || voters < params.min_voters {
                warn!(%pair, power, threshold, voters, "ballot failed vote threshold");
                continue;
            }
            passing.insert(pair, pair_ballots);
        }
        Ok(passing)
    }
}
