//! Block and epoch hooks: reserve snapshots and funding

use crate::error::Result;
use crate::events::FundingRateChanged;
use crate::keeper::Keeper;
use tessera_core::host::EpochHooks;
use tessera_core::{event, CoreError, Dec};
use tessera_store::Context;
use tracing::{debug, info, warn};

impl Keeper {
    /// Snapshot every enabled market and prune snapshots outside its TWAP window
    pub fn begin_block(&self, ctx: &mut Context<'_>) -> Result<()> {
        for (market, amm) in self.markets(ctx)? {
            if !market.enabled {
                continue;
            }
            self.snapshot_reserves(ctx, &amm)?;
            let pruned = self.prune_snapshots(ctx, &market.pair, market.twap_lookback_window_ms)?;
            if pruned > 0 {
                debug!(pair = %market.pair, pruned, "pruned reserve snapshots");
            }
        }
        Ok(())
    }

    /// Accrue one funding period on every enabled market tied to `identifier`
    ///
    /// `premium = (mark_twap - index_twap) / funding_periods_per_day` is added
    /// to the market's cumulative premium fraction. Markets without an index
    /// price are skipped.
    pub fn settle_funding(&self, ctx: &mut Context<'_>, identifier: &str) -> Result<()> {
        for (mut market, amm) in self.markets(ctx)? {
            if !market.enabled || market.funding_rate_epoch_id != identifier {
                continue;
            }
            let index_twap = match self.oracle.exchange_rate_twap(ctx, &market.pair) {
                Ok(price) if price.is_positive() => price,
                Ok(_) => {
                    warn!(pair = %market.pair, "index twap is zero, skipping funding");
                    continue;
                }
                Err(err) => {
                    warn!(pair = %market.pair, error = %err, "no index twap, skipping funding");
                    continue;
                }
            };
            let mark_twap = self.mark_price_twap(ctx, &market, &amm)?;
            let premium = mark_twap
                .checked_sub(&index_twap)?
                .checked_quo(&Dec::from(self.funding_periods_per_day()))?;
            market.latest_cumulative_premium_fraction =
                market.latest_cumulative_premium_fraction.checked_add(&premium)?;
            self.save_market(ctx, &market)?;

            event::emit(
                ctx,
                &FundingRateChanged {
                    pair: market.pair.clone(),
                    mark_price_twap: mark_twap.clone(),
                    index_price_twap: index_twap.clone(),
                    premium_fraction: premium.clone(),
                    cumulative_premium_fraction: market.latest_cumulative_premium_fraction.clone(),
                },
            )?;
            info!(
                pair = %market.pair,
                %mark_twap,
                %index_twap,
                %premium,
                "funding rate updated"
            );
        }
        Ok(())
    }
}

impl EpochHooks for Keeper {
    fn after_epoch_end(
        &self,
        ctx: &mut Context<'_>,
        identifier: &str,
        _number: u64,
    ) -> std::result::Result<(), CoreError> {
        Ok(self.settle_funding(ctx, identifier)?)
    }
}
