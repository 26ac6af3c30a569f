//! Pair reward payout to accurate voters

use crate::error::{OracleError, Result};
use crate::keeper::Keeper;
use crate::state::PAIR_REWARDS;
use crate::types::ValidatorPerformances;
use std::collections::BTreeSet;
use tessera_core::host::accounts;
use tessera_core::{AssetPair, Coin, Coins, Dec};
use tessera_store::Context;
use tracing::{debug, info};

impl Keeper {
    /// Pay this period's share of every reward whose pair passed, split by
    /// reward weight
    ///
    /// With no reward weight at all nothing is gathered, so the shares stay
    /// allocated for later periods.
    pub(crate) fn distribute_rewards(
        &self,
        ctx: &mut Context<'_>,
        passed: &BTreeSet<AssetPair>,
        performances: &ValidatorPerformances,
    ) -> Result<()> {
        let total_weight = performances.total_reward_weight();
        if total_weight <= 0 {
            debug!("no reward weight this period; rewards carried over");
            return Ok(());
        }

        let mut pool = Coins::empty();
        for (id, mut reward) in PAIR_REWARDS.all(ctx)? {
            if !passed.contains(&reward.pair) {
                continue;
            }
            let share = reward.period_share();
            pool = pool.checked_add(&share)?;
            reward.coins = reward.coins.checked_sub(&share).ok_or_else(|| {
                OracleError::InvalidReward(format!("reward {id} share exceeds its coins"))
            })?;
            reward.vote_periods -= 1;
            if reward.vote_periods == 0 {
                PAIR_REWARDS.remove(ctx, &id)?;
            } else {
                PAIR_REWARDS.save(ctx, &id, &reward)?;
            }
        }
        if pool.is_empty() {
            return Ok(());
        }

        let total = Dec::from(total_weight);
        let mut payouts = Vec::new();
        let mut distributed = Coins::empty();
        for perf in performances.iter().filter(|p| p.reward_weight > 0) {
            let weight = Dec::from(perf.reward_weight);
            let mut coins = Vec::new();
            for coin in pool.iter() {
                let amount = Dec::from(coin.amount)
                    .checked_mul(&weight)?
                    .checked_quo_truncate(&total)?
                    .to_u128_truncated()?;
                coins.push(Coin::new(amount, coin.denom.clone()));
            }
            let coins = Coins::new(coins)?;
            if coins.is_empty() {
                continue;
            }
            distributed = distributed.checked_add(&coins)?;
            payouts.push((perf.validator, coins));
        }
        if distributed.is_empty() {
            return Ok(());
        }

        self.bank.send_coins_from_module_to_module(
            ctx,
            accounts::ORACLE,
            accounts::DISTRIBUTION,
            &distributed,
        )?;
        for (validator, coins) in &payouts {
            self.distribution
                .allocate_tokens_to_validator(ctx, validator, coins)?;
        }
        info!(
            pool = %pool,
            distributed = %distributed,
            validators = payouts.len(),
            "distributed oracle rewards"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::tests::{ctx_at, keeper};
    use crate::params::Params;
    use crate::types::ValidatorPerformance;
    use tessera_core::host::{BankKeeper, StoreBank, StoreDistribution};
    use tessera_core::{AccAddress, ValAddress};
    use tessera_store::CommitStore;

    fn pair() -> AssetPair {
        "ubtc:uusd".parse().unwrap()
    }

    fn perfs(weights: &[(&str, i64)]) -> ValidatorPerformances {
        let mut perfs = ValidatorPerformances::default();
        for (seed, weight) in weights {
            let mut perf = ValidatorPerformance::new(ValAddress::from_seed(seed), *weight);
            perf.reward_weight = *weight;
            perf.win_count = 1;
            perfs.insert(perf);
        }
        perfs
    }

    fn funded(ctx: &mut Context<'_>) -> Keeper {
        let k = keeper();
        k.set_params(
            ctx,
            &Params {
                whitelist: vec![pair()],
                ..Params::default()
            },
        )
        .unwrap();
        StoreBank::new()
            .mint_to_module(ctx, accounts::TREASURY, &Coins::single(1_000, "unibi"))
            .unwrap();
        k.allocate_pair_reward(ctx, accounts::TREASURY, &pair(), 4, &Coins::single(1_000, "unibi"))
            .unwrap();
        k
    }

    #[test]
    fn test_share_split_by_weight() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 10, 0);
        let k = funded(&mut ctx);
        let passed = BTreeSet::from([pair()]);
        k.distribute_rewards(&mut ctx, &passed, &perfs(&[("a", 1), ("b", 2)]))
            .unwrap();

        // 250 this period: 83 and 166, 1 unit of dust stays with the oracle
        let dist = StoreDistribution::new();
        assert_eq!(
            dist.outstanding_rewards(&mut ctx, &ValAddress::from_seed("a")).unwrap(),
            Coins::single(83, "unibi")
        );
        assert_eq!(
            dist.outstanding_rewards(&mut ctx, &ValAddress::from_seed("b")).unwrap(),
            Coins::single(166, "unibi")
        );
        let oracle = AccAddress::module(accounts::ORACLE);
        assert_eq!(StoreBank::new().get_balance(&mut ctx, &oracle, "unibi").unwrap(), 751);

        let rewards = k.pair_rewards(&mut ctx).unwrap();
        assert_eq!(rewards[0].vote_periods, 3);
        assert_eq!(rewards[0].coins, Coins::single(750, "unibi"));
    }

    #[test]
    fn test_last_period_deletes_reward() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 10, 0);
        let k = funded(&mut ctx);
        let passed = BTreeSet::from([pair()]);
        for _ in 0..4 {
            k.distribute_rewards(&mut ctx, &passed, &perfs(&[("a", 1)])).unwrap();
        }
        assert!(k.pair_rewards(&mut ctx).unwrap().is_empty());
        assert_eq!(
            StoreDistribution::new()
                .outstanding_rewards(&mut ctx, &ValAddress::from_seed("a"))
                .unwrap(),
            Coins::single(1_000, "unibi")
        );
    }

    #[test]
    fn test_zero_weight_pays_nothing() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 10, 0);
        let k = funded(&mut ctx);
        let passed = BTreeSet::from([pair()]);
        k.distribute_rewards(&mut ctx, &passed, &perfs(&[("abstainer", 0)]))
            .unwrap();
        let rewards = k.pair_rewards(&mut ctx).unwrap();
        assert_eq!(rewards[0].vote_periods, 4);
        assert_eq!(rewards[0].coins, Coins::single(1_000, "unibi"));
    }

    #[test]
    fn test_failed_pair_keeps_reward() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 10, 0);
        let k = funded(&mut ctx);
        k.distribute_rewards(&mut ctx, &BTreeSet::new(), &perfs(&[("a", 5)]))
            .unwrap();
        assert_eq!(k.pair_rewards(&mut ctx).unwrap()[0].vote_periods, 4);
    }
}
