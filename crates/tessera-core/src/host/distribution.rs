use super::DistributionKeeper;
use crate::address::ValAddress;
use crate::coin::{Coin, Coins};
use crate::error::Result;
use tessera_store::{Context, Map};

const OUTSTANDING: Map<(ValAddress, String), u128> = Map::new(b"distribution/outstanding/");

/// Tracks rewards credited to validators
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreDistribution;

impl StoreDistribution {
    pub fn new() -> Self {
        Self
    }

    pub fn outstanding_rewards(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<Coins> {
        let entries = OUTSTANDING.prefix(ctx, val)?;
        Coins::new(entries.into_iter().map(|(denom, amount)| Coin::new(amount, denom)))
    }
}

impl DistributionKeeper for StoreDistribution {
    fn allocate_tokens_to_validator(
        &self,
        ctx: &mut Context<'_>,
        val: &ValAddress,
        coins: &Coins,
    ) -> Result<()> {
        for coin in coins.iter() {
            let key = (*val, coin.denom.clone());
            let have = OUTSTANDING.may_load(ctx, &key)?.unwrap_or(0);
            OUTSTANDING.save(ctx, &key, &have.saturating_add(coin.amount))?;
        }
        tracing::debug!(validator = %val, %coins, "allocated validator rewards");
        Ok(())
    }
}
