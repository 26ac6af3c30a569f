//! Slash window enforcement

use crate::error::Result;
use crate::events::ValidatorSlashed;
use crate::keeper::Keeper;
use crate::params::Params;
use crate::state::MISS_COUNTERS;
use tessera_core::{event, Dec};
use tessera_store::Context;
use tracing::{info, warn};

impl Keeper {
    /// Slash and jail validators whose valid-vote ratio over the window fell
    /// below `min_valid_per_window`, then reset every miss counter
    pub(crate) fn slash_and_reset_miss_counters(
        &self,
        ctx: &mut Context<'_>,
        params: &Params,
    ) -> Result<()> {
        let periods = params.vote_periods_per_window();
        let per_window = Dec::from(periods);

        for (validator, misses) in MISS_COUNTERS.all(ctx)? {
            let valid = Dec::from(periods.saturating_sub(misses));
            let valid_ratio = valid.checked_quo(&per_window)?;
            if valid_ratio >= params.min_valid_per_window {
                continue;
            }
            if !self.staking.is_bonded(ctx, &validator)? || self.staking.is_jailed(ctx, &validator)? {
                info!(%validator, misses, "skipping slash of unbonded or jailed validator");
                continue;
            }
            warn!(
                %validator,
                misses,
                %valid_ratio,
                fraction = %params.slash_fraction,
                "slashing validator for missed oracle votes"
            );
            self.staking.slash(ctx, &validator, &params.slash_fraction)?;
            self.staking.jail(ctx, &validator)?;
            event::emit(
                ctx,
                &ValidatorSlashed {
                    validator,
                    miss_count: misses,
                    slash_fraction: params.slash_fraction.clone(),
                },
            )?;
        }

        let reset = MISS_COUNTERS.clear(ctx)?;
        info!(height = ctx.block_height(), reset, "closed slash window");
        Ok(())
    }
}
