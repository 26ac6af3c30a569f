//! Market administration; callers check sudo permissions first

use crate::amm::Amm;
use crate::error::{PerpError, Result};
use crate::events::{MarketClosed, MarketCreated, ShiftPegMultiplier, ShiftSwapInvariant};
use crate::keeper::{to_amount, Keeper};
use crate::market::Market;
use crate::state::{AMMS, COLLATERAL, MARKET_LAST_VERSION, WHITELISTED_LIQUIDATORS};
use tessera_core::host::accounts;
use tessera_core::{event, AccAddress, AssetPair, Dec};
use tessera_store::Context;
use tracing::info;

impl Keeper {
    /// Open a new market version for `pair`
    ///
    /// Allowed when the pair has no market yet or its current version is
    /// closed. Parameters default to [`Market::new`]; accounting fields always
    /// start at zero.
    pub fn create_market(
        &self,
        ctx: &mut Context<'_>,
        pair: AssetPair,
        sqrt_depth: Dec,
        price_multiplier: Dec,
        params: Option<Market>,
    ) -> Result<Market> {
        let last = MARKET_LAST_VERSION.may_load(ctx, &pair)?;
        if let Some(version) = last {
            if self.market_by_version(ctx, &pair, version)?.enabled {
                return Err(PerpError::MarketAlreadyEnabled(pair));
            }
        }
        let version = last.map_or(1, |v| v + 1);
        let market = Market {
            pair: pair.clone(),
            enabled: true,
            version,
            latest_cumulative_premium_fraction: Dec::zero(),
            prepaid_bad_debt: Dec::zero(),
            ..params.unwrap_or_else(|| Market::new(pair.clone()))
        };
        market.validate()?;
        let amm = Amm::new(pair.clone(), version, sqrt_depth, price_multiplier)?;

        self.save_market(ctx, &market)?;
        AMMS.save(ctx, &(pair.clone(), version), &amm)?;
        MARKET_LAST_VERSION.save(ctx, &pair, &version)?;
        self.snapshot_reserves(ctx, &amm)?;

        event::emit(
            ctx,
            &MarketCreated {
                pair: pair.clone(),
                version,
                sqrt_depth: amm.sqrt_depth.clone(),
                price_multiplier: amm.price_multiplier.clone(),
            },
        )?;
        info!(%pair, version, sqrt_depth = %amm.sqrt_depth, "market created");
        Ok(market)
    }

    /// Disable the current market and fix its settlement price
    pub fn close_market(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Dec> {
        let mut market = self.market(ctx, pair)?;
        if !market.enabled {
            return Err(PerpError::MarketNotEnabled(pair.clone()));
        }
        let mut amm = self.amm_by_version(ctx, pair, market.version)?;
        let settlement_price = amm.settlement_price()?;
        amm.settlement_price = settlement_price.clone();
        AMMS.save(ctx, &(pair.clone(), market.version), &amm)?;

        market.enabled = false;
        self.save_market(ctx, &market)?;
        event::emit(
            ctx,
            &MarketClosed {
                pair: pair.clone(),
                version: market.version,
                settlement_price: settlement_price.clone(),
            },
        )?;
        info!(%pair, version = market.version, %settlement_price, "market closed");
        Ok(settlement_price)
    }

    /// Move the peg; the ecosystem fund pays (or receives) the change in
    /// value of the open bias
    pub fn shift_peg_multiplier(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        new_multiplier: &Dec,
    ) -> Result<Dec> {
        let market = self.market(ctx, pair)?;
        if !market.enabled {
            return Err(PerpError::MarketNotEnabled(pair.clone()));
        }
        let mut amm = self.amm_by_version(ctx, pair, market.version)?;
        if *new_multiplier == amm.price_multiplier {
            return Err(PerpError::SamePegMultiplier(new_multiplier.to_string()));
        }
        if !new_multiplier.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "price multiplier must be positive, got {new_multiplier}"
            )));
        }

        let cost = amm.repeg_cost(new_multiplier)?;
        let old = std::mem::replace(&mut amm.price_multiplier, new_multiplier.clone());
        amm.validate()?;
        self.pay_amm_cost(ctx, &cost)?;
        self.save_amm(ctx, &amm)?;
        self.snapshot_reserves(ctx, &amm)?;

        event::emit(
            ctx,
            &ShiftPegMultiplier {
                pair: pair.clone(),
                old_peg_multiplier: old.clone(),
                new_peg_multiplier: new_multiplier.clone(),
                cost_paid: cost.clone(),
            },
        )?;
        info!(%pair, %old, new = %new_multiplier, %cost, "peg multiplier shifted");
        Ok(cost)
    }

    /// Rescale liquidity depth to `new_invariant` at the same price
    pub fn shift_swap_invariant(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        new_invariant: &Dec,
    ) -> Result<Dec> {
        let market = self.market(ctx, pair)?;
        if !market.enabled {
            return Err(PerpError::MarketNotEnabled(pair.clone()));
        }
        let mut amm = self.amm_by_version(ctx, pair, market.version)?;
        let old = amm.sqrt_depth.checked_mul(&amm.sqrt_depth)?;

        let cost = amm.swap_invariant_cost(new_invariant)?;
        amm.update_swap_invariant(new_invariant)?;
        amm.validate()?;
        self.pay_amm_cost(ctx, &cost)?;
        self.save_amm(ctx, &amm)?;
        self.snapshot_reserves(ctx, &amm)?;

        event::emit(
            ctx,
            &ShiftSwapInvariant {
                pair: pair.clone(),
                old_swap_invariant: old.clone(),
                new_swap_invariant: new_invariant.clone(),
                cost_paid: cost.clone(),
            },
        )?;
        info!(%pair, %old, new = %new_invariant, %cost, "swap invariant shifted");
        Ok(cost)
    }

    /// Positive costs flow from the ecosystem fund to the vault, negative back
    fn pay_amm_cost(&self, ctx: &mut Context<'_>, cost: &Dec) -> Result<()> {
        let amount = to_amount(&cost.abs())?;
        if amount == 0 {
            return Ok(());
        }
        let coins = self.collateral_coins(ctx, amount)?;
        if cost.is_positive() {
            self.bank
                .send_coins_from_module_to_module(ctx, accounts::PERP_EF, accounts::PERP_VAULT, &coins)
                .map_err(|e| PerpError::NotEnoughFundToPay(e.to_string()))?;
        } else {
            self.bank
                .send_coins_from_module_to_module(ctx, accounts::PERP_VAULT, accounts::PERP_EF, &coins)?;
        }
        Ok(())
    }

    pub fn change_collateral_denom(&self, ctx: &mut Context<'_>, denom: &str) -> Result<()> {
        validate_denom(denom)?;
        COLLATERAL.save(ctx, &denom.to_string())?;
        info!(denom, "collateral denom changed");
        Ok(())
    }

    pub fn whitelist_liquidator(&self, ctx: &mut Context<'_>, liquidator: &AccAddress) -> Result<()> {
        WHITELISTED_LIQUIDATORS.save(ctx, liquidator, &())?;
        info!(%liquidator, "liquidator whitelisted");
        Ok(())
    }
}

/// Denoms are 3 to 128 characters, start with a letter and use `[a-zA-Z0-9/:._-]`
pub(crate) fn validate_denom(denom: &str) -> Result<()> {
    let valid_len = (3..=128).contains(&denom.len());
    let starts_alpha = denom.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_chars = denom
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if valid_len && starts_alpha && valid_chars {
        Ok(())
    } else {
        Err(PerpError::InvalidDenom(denom.to_string()))
    }
}
