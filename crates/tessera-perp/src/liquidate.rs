//! Liquidation of positions below maintenance margin

use crate::amm::Amm;
use crate::error::{PerpError, Result};
use crate::events::{LiquidationFailed, LiquidationSuccess};
use crate::keeper::{to_amount, Keeper};
use crate::market::Market;
use crate::types::{ChangeReason, Direction, LiquidateRequest, LiquidationResponse, Position};
use tessera_core::host::accounts;
use tessera_core::{event, AccAddress, AssetPair, Coin, Dec};
use tessera_store::Context;
use tracing::{info, warn};

/// Fees paid out by one liquidation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiquidationFees {
    pub liquidator_fee: u128,
    pub ecosystem_fund_fee: u128,
}

impl Keeper {
    /// Liquidate each request independently
    ///
    /// A failed request leaves no state behind and is reported through a
    /// `LiquidationFailed` event. Fails only when every request failed.
    pub fn multi_liquidate(
        &self,
        ctx: &mut Context<'_>,
        liquidator: &AccAddress,
        requests: &[LiquidateRequest],
    ) -> Result<Vec<LiquidationResponse>> {
        if !self.is_whitelisted_liquidator(ctx, liquidator)? {
            return Err(PerpError::UnauthorizedLiquidator(liquidator.to_string()));
        }

        let mut responses = Vec::with_capacity(requests.len());
        for req in requests {
            let result = ctx.cache_context(|branch| self.liquidate(branch, liquidator, &req.pair, &req.trader));
            match result {
                Ok(fees) => responses.push(LiquidationResponse {
                    pair: req.pair.clone(),
                    trader: req.trader,
                    success: true,
                    liquidator_fee: fees.liquidator_fee,
                    ecosystem_fund_fee: fees.ecosystem_fund_fee,
                    error: None,
                }),
                Err(err) => {
                    warn!(pair = %req.pair, trader = %req.trader, error = %err, "liquidation failed");
                    event::emit(
                        ctx,
                        &LiquidationFailed {
                            pair: req.pair.clone(),
                            trader: req.trader,
                            liquidator: *liquidator,
                            reason: err.to_string(),
                        },
                    )?;
                    responses.push(LiquidationResponse {
                        pair: req.pair.clone(),
                        trader: req.trader,
                        success: false,
                        liquidator_fee: 0,
                        ecosystem_fund_fee: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        if responses.iter().all(|r| !r.success) {
            let reasons: Vec<String> = responses.iter().filter_map(|r| r.error.clone()).collect();
            return Err(PerpError::AllLiquidationsFailed(reasons.join("; ")));
        }
        Ok(responses)
    }

    /// Liquidate one position, partially when its spot margin ratio still
    /// covers half the liquidation fee
    pub fn liquidate(
        &self,
        ctx: &mut Context<'_>,
        liquidator: &AccAddress,
        pair: &AssetPair,
        trader: &AccAddress,
    ) -> Result<LiquidationFees> {
        if !self.is_whitelisted_liquidator(ctx, liquidator)? {
            return Err(PerpError::UnauthorizedLiquidator(liquidator.to_string()));
        }
        let market = self.market(ctx, pair)?;
        if !market.enabled {
            return Err(PerpError::MarketNotEnabled(pair.clone()));
        }
        let amm = self.amm_by_version(ctx, pair, market.version)?;
        let position = self.position(ctx, pair, market.version, trader)?;

        let ratio = self.liquidation_margin_ratio(ctx, &market, &amm, &position)?;
        if ratio >= market.maintenance_margin_ratio {
            return Err(PerpError::PositionHealthy(ratio.to_string()));
        }

        let spot_notional = self.position_notional_spot(&amm, &position)?;
        let spot_ratio = position.margin_ratio(&spot_notional, &market.latest_cumulative_premium_fraction);
        let half_fee = market.liquidation_fee_ratio.checked_quo(&Dec::from(2u64))?;
        let fees = if spot_ratio >= half_fee {
            self.partial_liquidation(ctx, &market, amm, position, liquidator)?
        } else {
            self.full_liquidation(ctx, &market, amm, position, liquidator)?
        };
        info!(
            %pair,
            %trader,
            %liquidator,
            margin_ratio = %ratio,
            liquidator_fee = fees.liquidator_fee,
            "position liquidated"
        );
        Ok(fees)
    }

    /// Margin ratio at the trader-favourable notional; when the mark strays
    /// from the index beyond the spread limit the index-based ratio counts too
    fn liquidation_margin_ratio(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        amm: &Amm,
        position: &Position,
    ) -> Result<Dec> {
        let cpf = &market.latest_cumulative_premium_fraction;
        let notional = self.preferred_position_notional(ctx, market, amm, position)?;
        let ratio = position.margin_ratio(&notional, cpf);

        let index = match self.oracle.exchange_rate(ctx, &market.pair) {
            Ok(index) if index.is_positive() => index,
            Ok(_) => return Ok(ratio),
            Err(err) => {
                warn!(pair = %market.pair, error = %err, "no index price, using mark only");
                return Ok(ratio);
            }
        };
        let mark = amm.mark_price();
        let spread = mark.checked_sub(&index)?.abs().checked_quo(&index)?;
        if spread <= market.max_oracle_spread_ratio {
            return Ok(ratio);
        }
        let index_notional = index.checked_mul(&position.size.abs())?;
        Ok(ratio.max(position.margin_ratio(&index_notional, cpf)))
    }

    fn partial_liquidation(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        amm: Amm,
        position: Position,
        liquidator: &AccAddress,
    ) -> Result<LiquidationFees> {
        let dir = Direction::closing(&position.size);
        let base = position.size.abs().checked_mul(&market.partial_liquidation_ratio)?;
        let reserve = amm.quote_reserve_delta(&base, dir)?;
        let notional = amm.quote_reserve_to_asset(&reserve)?;

        let (_, mut resp) = self.decrease_position(ctx, market, amm, position, &notional, &Dec::zero(), true)?;

        let fee = resp.exchanged_notional.abs().checked_mul(&market.liquidation_fee_ratio)?;
        let half = fee.checked_quo(&Dec::from(2u64))?;
        let liquidator_fee = to_amount(&half)?;
        let ecosystem_fund_fee = to_amount(&half)?;
        let paid = Dec::from(liquidator_fee + ecosystem_fund_fee);
        resp.position.margin = resp.position.margin.checked_sub(&paid)?.max(Dec::zero());

        let pair = resp.position.pair.clone();
        let version = resp.position.version;
        self.withdraw(ctx, &pair, version, liquidator, liquidator_fee)?;
        if ecosystem_fund_fee > 0 {
            let coins = self.collateral_coins(ctx, ecosystem_fund_fee)?;
            self.bank
                .send_coins_from_module_to_module(ctx, accounts::PERP_VAULT, accounts::PERP_EF, &coins)?;
        }

        if resp.position.size.is_zero() {
            self.delete_position(ctx, &pair, version, &resp.position.trader)?;
        } else {
            self.save_position(ctx, &resp.position)?;
        }
        self.emit_position_changed(ctx, &resp, 0, 0, ChangeReason::PartialLiquidation)?;
        self.emit_liquidation_success(ctx, &resp.position, liquidator, true, liquidator_fee, ecosystem_fund_fee, 0)?;
        Ok(LiquidationFees {
            liquidator_fee,
            ecosystem_fund_fee,
        })
    }

    fn full_liquidation(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        amm: Amm,
        position: Position,
        liquidator: &AccAddress,
    ) -> Result<LiquidationFees> {
        let (_, mut resp) = self.close_position_entirely(ctx, market, amm, position, &Dec::zero(), true)?;
        let pair = resp.position.pair.clone();
        let version = resp.position.version;

        let mut remaining = resp.margin_to_vault.abs();
        let mut bad_debt = resp.bad_debt.clone();
        let fee = resp.exchanged_notional.abs().checked_mul(&market.liquidation_fee_ratio)?;
        if fee > remaining {
            bad_debt = bad_debt.checked_add(&fee.checked_sub(&remaining)?)?;
            remaining = Dec::zero();
        } else {
            remaining = remaining.checked_sub(&fee)?;
        }

        if bad_debt.is_positive() {
            self.realize_bad_debt(ctx, &pair, version, &bad_debt)?;
        }
        let liquidator_fee = to_amount(&fee)?;
        let ecosystem_fund_fee = to_amount(&remaining)?;
        self.withdraw(ctx, &pair, version, liquidator, liquidator_fee)?;
        if ecosystem_fund_fee > 0 {
            let coins = self.collateral_coins(ctx, ecosystem_fund_fee)?;
            self.bank
                .send_coins_from_module_to_module(ctx, accounts::PERP_VAULT, accounts::PERP_EF, &coins)?;
        }
        self.delete_position(ctx, &pair, version, &resp.position.trader)?;

        let extra_bad_debt = to_amount(&bad_debt)?.saturating_sub(to_amount(&resp.bad_debt)?);
        resp.margin_to_vault = Dec::zero();
        self.emit_position_changed(ctx, &resp, 0, extra_bad_debt, ChangeReason::FullLiquidation)?;
        self.emit_liquidation_success(
            ctx,
            &resp.position,
            liquidator,
            false,
            liquidator_fee,
            ecosystem_fund_fee,
            to_amount(&bad_debt)?,
        )?;
        Ok(LiquidationFees {
            liquidator_fee,
            ecosystem_fund_fee,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_liquidation_success(
        &self,
        ctx: &mut Context<'_>,
        position: &Position,
        liquidator: &AccAddress,
        partial: bool,
        liquidator_fee: u128,
        ecosystem_fund_fee: u128,
        bad_debt: u128,
    ) -> Result<()> {
        let denom = self.collateral(ctx)?;
        event::emit(
            ctx,
            &LiquidationSuccess {
                pair: position.pair.clone(),
                trader: position.trader,
                liquidator: *liquidator,
                partial,
                liquidator_fee: Coin::new(liquidator_fee, denom.clone()),
                ecosystem_fund_fee: Coin::new(ecosystem_fund_fee, denom.clone()),
                bad_debt: Coin::new(bad_debt, denom),
            },
        )?;
        Ok(())
    }
}
