//! Oracle keeper: state access and the price interface other modules read

use crate::error::{OracleError, Result};
use crate::events::ExchangeRateUpdate;
use crate::params::Params;
use crate::state::{
    EXCHANGE_RATES, FEEDER_DELEGATIONS, MISS_COUNTERS, PAIR_REWARDS, PAIR_REWARD_SEQ, PARAMS,
    PREVOTES, PRICE_SNAPSHOTS, VOTES, WHITELISTED_PAIRS,
};
use crate::types::{AggregatePrevote, AggregateVote, DatedPrice, PairReward, PriceSnapshot};
use std::ops::Bound;
use std::sync::Arc;
use tessera_core::host::{
    accounts, BankKeeper, DistributionKeeper, PriceOracle, StakingKeeper, SudoKeeper,
};
use tessera_core::{event, twap, AccAddress, AssetPair, Coins, CoreError, Dec, ValAddress};
use tessera_store::{Context, Order};
use tracing::{debug, info};

/// Oracle module keeper
#[derive(Clone)]
pub struct Keeper {
    pub(crate) staking: Arc<dyn StakingKeeper>,
    pub(crate) bank: Arc<dyn BankKeeper>,
    pub(crate) distribution: Arc<dyn DistributionKeeper>,
    pub(crate) sudo: Arc<dyn SudoKeeper>,
}

impl Keeper {
    pub fn new(
        staking: Arc<dyn StakingKeeper>,
        bank: Arc<dyn BankKeeper>,
        distribution: Arc<dyn DistributionKeeper>,
        sudo: Arc<dyn SudoKeeper>,
    ) -> Self {
        Self {
            staking,
            bank,
            distribution,
            sudo,
        }
    }

    // === Params and whitelist ===

    pub fn params(&self, ctx: &mut Context<'_>) -> Result<Params> {
        Ok(PARAMS.may_load(ctx)?.unwrap_or_default())
    }

    /// Validate and store params; the whitelist collection follows `params.whitelist`
    pub fn set_params(&self, ctx: &mut Context<'_>, params: &Params) -> Result<()> {
        params.validate()?;
        PARAMS.save(ctx, params)?;
        WHITELISTED_PAIRS.clear(ctx)?;
        for pair in &params.whitelist {
            WHITELISTED_PAIRS.save(ctx, pair, &())?;
        }
        Ok(())
    }

    pub fn is_whitelisted(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<bool> {
        Ok(WHITELISTED_PAIRS.has(ctx, pair)?)
    }

    /// Whitelisted pairs in ascending pair-string order
    pub fn whitelisted_pairs(&self, ctx: &mut Context<'_>) -> Result<Vec<AssetPair>> {
        Ok(WHITELISTED_PAIRS.keys(ctx, Order::Ascending)?)
    }

    /// Add and remove whitelist entries, keeping params in step
    pub fn edit_whitelist(
        &self,
        ctx: &mut Context<'_>,
        add: &[AssetPair],
        remove: &[AssetPair],
    ) -> Result<()> {
        let mut params = self.params(ctx)?;
        for pair in add {
            if !params.whitelist.contains(pair) {
                params.whitelist.push(pair.clone());
            }
        }
        params.whitelist.retain(|p| !remove.contains(p));
        params.whitelist.sort();
        for pair in remove {
            EXCHANGE_RATES.remove(ctx, pair)?;
        }
        info!(added = add.len(), removed = remove.len(), "edited oracle whitelist");
        self.set_params(ctx, &params)
    }

    // === Rates ===

    /// Publish a rate: dated price, TWAP snapshot and update event
    pub fn set_price(&self, ctx: &mut Context<'_>, pair: &AssetPair, rate: &Dec) -> Result<()> {
        let created_block = ctx.block_height();
        let timestamp_ms = ctx.block_time_ms();
        EXCHANGE_RATES.save(
            ctx,
            pair,
            &DatedPrice {
                rate: rate.clone(),
                created_block,
            },
        )?;
        PRICE_SNAPSHOTS.save(
            ctx,
            &(pair.clone(), timestamp_ms),
            &PriceSnapshot {
                pair: pair.clone(),
                price: rate.clone(),
                timestamp_ms,
            },
        )?;
        event::emit(
            ctx,
            &ExchangeRateUpdate {
                pair: pair.clone(),
                rate: rate.clone(),
            },
        )?;
        Ok(())
    }

    pub fn get_exchange_rate(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Dec> {
        EXCHANGE_RATES
            .may_load(ctx, pair)?
            .map(|p| p.rate)
            .ok_or_else(|| OracleError::PriceUnavailable(pair.clone()))
    }

    pub fn dated_price(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Option<DatedPrice>> {
        Ok(EXCHANGE_RATES.may_load(ctx, pair)?)
    }

    pub fn exchange_rates(&self, ctx: &mut Context<'_>) -> Result<Vec<(AssetPair, DatedPrice)>> {
        Ok(EXCHANGE_RATES.all(ctx)?)
    }

    /// Time-weighted rate over the lookback window ending at the block time
    pub fn get_exchange_rate_twap(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Dec> {
        let lookback = self.params(ctx)?.twap_lookback_window_ms;
        let now = ctx.block_time_ms();
        let since = now.saturating_sub(lookback);
        let snapshots = PRICE_SNAPSHOTS.prefix_range(
            ctx,
            pair,
            Bound::Included(&since),
            Bound::Included(&now),
            Order::Descending,
        )?;
        let points: Vec<(i64, Dec)> = snapshots
            .into_iter()
            .map(|(ts, snap)| (ts, snap.price))
            .collect();
        twap::time_weighted_average(&points, now, lookback)
            .ok_or_else(|| OracleError::PriceUnavailable(pair.clone()))
    }

    /// Drop rates written `expiration_blocks` or more blocks ago
    pub(crate) fn clear_expired_rates(&self, ctx: &mut Context<'_>, params: &Params) -> Result<()> {
        let height = ctx.block_height();
        for (pair, price) in EXCHANGE_RATES.all(ctx)? {
            if price.created_block + params.expiration_blocks <= height {
                debug!(%pair, created = price.created_block, "expired exchange rate");
                EXCHANGE_RATES.remove(ctx, &pair)?;
            }
        }
        Ok(())
    }

    pub(crate) fn clear_rate(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<()> {
        Ok(EXCHANGE_RATES.remove(ctx, pair)?)
    }

    // === Feeders ===

    /// Account allowed to vote for `val`: its delegate, else its operator
    pub fn feeder_delegation(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<AccAddress> {
        Ok(FEEDER_DELEGATIONS
            .may_load(ctx, val)?
            .unwrap_or_else(|| AccAddress::from(*val)))
    }

    pub fn set_feeder_delegation(
        &self,
        ctx: &mut Context<'_>,
        val: &ValAddress,
        feeder: &AccAddress,
    ) -> Result<()> {
        Ok(FEEDER_DELEGATIONS.save(ctx, val, feeder)?)
    }

    /// Validator must be active and `feeder` its operator or delegate
    pub fn validate_feeder(
        &self,
        ctx: &mut Context<'_>,
        feeder: &AccAddress,
        val: &ValAddress,
    ) -> Result<()> {
        if !self.staking.active_validators(ctx)?.contains(val) {
            return Err(OracleError::ValidatorNotActive(*val));
        }
        let operator = AccAddress::from(*val);
        if *feeder != operator && *feeder != self.feeder_delegation(ctx, val)? {
            return Err(OracleError::NoVotingPermission {
                feeder: feeder.to_string(),
                validator: val.to_string(),
            });
        }
        Ok(())
    }

    // === Ballots ===

    pub fn prevote(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<Option<AggregatePrevote>> {
        Ok(PREVOTES.may_load(ctx, val)?)
    }

    pub fn vote(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<Option<AggregateVote>> {
        Ok(VOTES.may_load(ctx, val)?)
    }

    pub fn votes(&self, ctx: &mut Context<'_>) -> Result<Vec<(ValAddress, AggregateVote)>> {
        Ok(VOTES.all(ctx)?)
    }

    pub fn miss_counter(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<u64> {
        Ok(MISS_COUNTERS.may_load(ctx, val)?.unwrap_or(0))
    }

    pub fn set_miss_counter(&self, ctx: &mut Context<'_>, val: &ValAddress, misses: u64) -> Result<()> {
        Ok(MISS_COUNTERS.save(ctx, val, &misses)?)
    }

    // === Pair rewards ===

    /// Move `coins` from `funder_module` into the oracle account as a reward
    /// paid over `vote_periods` passing periods of `pair`
    pub fn allocate_pair_reward(
        &self,
        ctx: &mut Context<'_>,
        funder_module: &str,
        pair: &AssetPair,
        vote_periods: u64,
        coins: &Coins,
    ) -> Result<u64> {
        if vote_periods == 0 {
            return Err(OracleError::InvalidReward("vote_periods must be positive".into()));
        }
        if coins.is_empty() {
            return Err(OracleError::InvalidReward("no coins".into()));
        }
        if !self.is_whitelisted(ctx, pair)? {
            return Err(OracleError::UnknownPair(pair.clone()));
        }
        self.bank
            .send_coins_from_module_to_module(ctx, funder_module, accounts::ORACLE, coins)?;
        let id = PAIR_REWARD_SEQ.may_load(ctx)?.unwrap_or(0);
        PAIR_REWARD_SEQ.save(ctx, &(id + 1))?;
        PAIR_REWARDS.save(
            ctx,
            &id,
            &PairReward {
                id,
                pair: pair.clone(),
                vote_periods,
                coins: coins.clone(),
            },
        )?;
        info!(id, %pair, vote_periods, %coins, "allocated pair reward");
        Ok(id)
    }

    pub fn pair_rewards(&self, ctx: &mut Context<'_>) -> Result<Vec<PairReward>> {
        Ok(PAIR_REWARDS.all(ctx)?.into_iter().map(|(_, r)| r).collect())
    }
}

impl PriceOracle for Keeper {
    fn exchange_rate(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
    ) -> std::result::Result<Dec, CoreError> {
        Ok(self.get_exchange_rate(ctx, pair)?)
    }

    fn exchange_rate_twap(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
    ) -> std::result::Result<Dec, CoreError> {
        Ok(self.get_exchange_rate_twap(ctx, pair)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tessera_core::host::{StoreBank, StoreDistribution, StoreStaking, StoreSudo, Validator};
    use tessera_store::{BlockHeader, CommitStore, GasMeter};

    pub(crate) fn keeper() -> Keeper {
        Keeper::new(
            Arc::new(StoreStaking::default()),
            Arc::new(StoreBank::new()),
            Arc::new(StoreDistribution::new()),
            Arc::new(StoreSudo::new()),
        )
    }

    pub(crate) fn ctx_at(store: &CommitStore, height: u64, time_ms: i64) -> Context<'_> {
        let time = Utc
            .timestamp_millis_opt(time_ms)
            .single()
            .expect("valid timestamp");
        Context::new(store, BlockHeader::new("oracle-test", height, time), GasMeter::infinite())
    }

    pub(crate) fn bond(ctx: &mut Context<'_>, seed: &str, power: u128) -> ValAddress {
        let val = ValAddress::from_seed(seed);
        StoreStaking::default()
            .set_validator(ctx, &Validator::bonded(val, power * 1_000_000))
            .unwrap();
        val
    }

    fn pair(s: &str) -> AssetPair {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_params_syncs_whitelist() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 0);
        let k = keeper();
        let params = Params {
            whitelist: vec![pair("ueth:uusd"), pair("ubtc:uusd")],
            ..Params::default()
        };
        k.set_params(&mut ctx, &params).unwrap();
        assert_eq!(
            k.whitelisted_pairs(&mut ctx).unwrap(),
            vec![pair("ubtc:uusd"), pair("ueth:uusd")]
        );

        k.edit_whitelist(&mut ctx, &[pair("uatom:uusd")], &[pair("ueth:uusd")])
            .unwrap();
        assert_eq!(
            k.params(&mut ctx).unwrap().whitelist,
            vec![pair("uatom:uusd"), pair("ubtc:uusd")]
        );
        assert!(!k.is_whitelisted(&mut ctx, &pair("ueth:uusd")).unwrap());
    }

    #[test]
    fn test_price_and_twap() {
        let store = CommitStore::new();
        let k = keeper();
        let p = pair("ubtc:uusd");

        let mut ctx = ctx_at(&store, 10, 1_000_000);
        assert!(matches!(
            k.get_exchange_rate(&mut ctx, &p),
            Err(OracleError::PriceUnavailable(_))
        ));
        k.set_price(&mut ctx, &p, &Dec::from(100i64)).unwrap();
        let (writes, events, _) = ctx.into_parts();
        assert_eq!(events.len(), 1);
        store.commit(writes, 10);

        let mut ctx = ctx_at(&store, 20, 1_060_000);
        k.set_price(&mut ctx, &p, &Dec::from(200i64)).unwrap();
        let (writes, _, _) = ctx.into_parts();
        store.commit(writes, 20);

        // 60s at 100, then 60s at 200
        let mut ctx = ctx_at(&store, 30, 1_120_000);
        assert_eq!(k.get_exchange_rate(&mut ctx, &p).unwrap(), Dec::from(200i64));
        assert_eq!(
            k.get_exchange_rate_twap(&mut ctx, &p).unwrap(),
            Dec::from(150i64)
        );
        assert_eq!(k.exchange_rate_twap(&mut ctx, &p).unwrap(), Dec::from(150i64));
    }

    #[test]
    fn test_feeder_permissions() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 0);
        let k = keeper();
        let val = bond(&mut ctx, "val", 10);
        let operator = AccAddress::from(val);
        let feeder = AccAddress::from_seed("feeder");

        k.validate_feeder(&mut ctx, &operator, &val).unwrap();
        assert!(matches!(
            k.validate_feeder(&mut ctx, &feeder, &val),
            Err(OracleError::NoVotingPermission { .. })
        ));
        k.set_feeder_delegation(&mut ctx, &val, &feeder).unwrap();
        k.validate_feeder(&mut ctx, &feeder, &val).unwrap();
        k.validate_feeder(&mut ctx, &operator, &val).unwrap();

        let stranger = ValAddress::from_seed("stranger");
        assert!(matches!(
            k.validate_feeder(&mut ctx, &operator, &stranger),
            Err(OracleError::ValidatorNotActive(_))
        ));
    }
}
