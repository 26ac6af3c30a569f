//! Perp keeper: state access, swaps, TWAPs and vault accounting

use crate::amm::Amm;
use crate::error::{PerpError, Result};
use crate::market::Market;
use crate::state::{
    AMMS, COLLATERAL, MARKETS, MARKET_LAST_VERSION, POSITIONS, RESERVE_SNAPSHOTS,
    WHITELISTED_LIQUIDATORS,
};
use crate::types::{Direction, Position, ReserveSnapshot};
use std::ops::Bound;
use std::sync::Arc;
use tessera_core::host::{
    accounts, AccountKeeper, BankKeeper, DiscountKeeper, PriceOracle, SudoKeeper,
};
use tessera_core::{twap, AccAddress, AssetPair, Coins, Dec};
use tessera_store::{Context, Order};
use tracing::{debug, warn};

/// Perp module keeper
#[derive(Clone)]
pub struct Keeper {
    pub(crate) bank: Arc<dyn BankKeeper>,
    pub(crate) accounts: Arc<dyn AccountKeeper>,
    pub(crate) oracle: Arc<dyn PriceOracle>,
    pub(crate) discounts: Arc<dyn DiscountKeeper>,
    pub(crate) sudo: Arc<dyn SudoKeeper>,
    /// Funding epochs per day; scales the premium paid each epoch
    funding_periods_per_day: u64,
}

impl Keeper {
    pub fn new(
        bank: Arc<dyn BankKeeper>,
        accounts: Arc<dyn AccountKeeper>,
        oracle: Arc<dyn PriceOracle>,
        discounts: Arc<dyn DiscountKeeper>,
        sudo: Arc<dyn SudoKeeper>,
        funding_periods_per_day: u64,
    ) -> Self {
        Self {
            bank,
            accounts,
            oracle,
            discounts,
            sudo,
            funding_periods_per_day: funding_periods_per_day.max(1),
        }
    }

    pub fn funding_periods_per_day(&self) -> u64 {
        self.funding_periods_per_day
    }

    // === Collateral and liquidators ===

    pub fn collateral(&self, ctx: &mut Context<'_>) -> Result<String> {
        COLLATERAL
            .may_load(ctx)?
            .ok_or_else(|| PerpError::InvalidDenom("collateral denom is not set".into()))
    }

    pub(crate) fn collateral_coins(&self, ctx: &mut Context<'_>, amount: u128) -> Result<Coins> {
        Ok(Coins::single(amount, self.collateral(ctx)?))
    }

    pub fn is_whitelisted_liquidator(&self, ctx: &mut Context<'_>, addr: &AccAddress) -> Result<bool> {
        Ok(WHITELISTED_LIQUIDATORS.has(ctx, addr)?)
    }

    pub fn whitelisted_liquidators(&self, ctx: &mut Context<'_>) -> Result<Vec<AccAddress>> {
        Ok(WHITELISTED_LIQUIDATORS.keys(ctx, Order::Ascending)?)
    }

    // === Markets and AMMs ===

    /// Current version of a pair's market
    pub fn market_version(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<u64> {
        MARKET_LAST_VERSION
            .may_load(ctx, pair)?
            .ok_or_else(|| PerpError::MarketNotFound(pair.clone()))
    }

    pub fn market(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Market> {
        let version = self.market_version(ctx, pair)?;
        self.market_by_version(ctx, pair, version)
    }

    pub fn market_by_version(&self, ctx: &mut Context<'_>, pair: &AssetPair, version: u64) -> Result<Market> {
        MARKETS
            .may_load(ctx, &(pair.clone(), version))?
            .ok_or_else(|| PerpError::MarketVersionNotFound {
                pair: pair.clone(),
                version,
            })
    }

    pub fn amm(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Amm> {
        let version = self.market_version(ctx, pair)?;
        self.amm_by_version(ctx, pair, version)
    }

    pub fn amm_by_version(&self, ctx: &mut Context<'_>, pair: &AssetPair, version: u64) -> Result<Amm> {
        AMMS.may_load(ctx, &(pair.clone(), version))?
            .ok_or_else(|| PerpError::MarketVersionNotFound {
                pair: pair.clone(),
                version,
            })
    }

    /// Current market and AMM of every pair, in pair order
    pub fn markets(&self, ctx: &mut Context<'_>) -> Result<Vec<(Market, Amm)>> {
        let versions = MARKET_LAST_VERSION.all(ctx)?;
        let mut out = Vec::with_capacity(versions.len());
        for (pair, version) in versions {
            let market = self.market_by_version(ctx, &pair, version)?;
            let amm = self.amm_by_version(ctx, &pair, version)?;
            out.push((market, amm));
        }
        Ok(out)
    }

    pub(crate) fn save_market(&self, ctx: &mut Context<'_>, market: &Market) -> Result<()> {
        MARKETS.save(ctx, &(market.pair.clone(), market.version), market)?;
        Ok(())
    }

    /// Persist a mutated AMM
    ///
    /// # Panics
    ///
    /// When the reserves break the pool invariant. Every caller has checked
    /// its inputs, so a failure here is a bug and the transaction must abort.
    pub(crate) fn save_amm(&self, ctx: &mut Context<'_>, amm: &Amm) -> Result<()> {
        if let Err(err) = amm.validate() {
            panic!("amm invariant violated for {} v{}: {err}", amm.pair, amm.version);
        }
        AMMS.save(ctx, &(amm.pair.clone(), amm.version), amm)?;
        Ok(())
    }

    // === Positions ===

    pub fn position(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
        trader: &AccAddress,
    ) -> Result<Position> {
        self.may_position(ctx, pair, version, trader)?
            .ok_or_else(|| PerpError::PositionNotFound {
                pair: pair.clone(),
                trader: trader.to_string(),
            })
    }

    pub fn may_position(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
        trader: &AccAddress,
    ) -> Result<Option<Position>> {
        Ok(POSITIONS.may_load(ctx, &((pair.clone(), version), *trader))?)
    }

    /// Every open position of a trader across markets and versions
    pub fn positions(&self, ctx: &mut Context<'_>, trader: &AccAddress) -> Result<Vec<Position>> {
        Ok(POSITIONS
            .all(ctx)?
            .into_iter()
            .filter(|((_, owner), _)| owner == trader)
            .map(|(_, position)| position)
            .collect())
    }

    /// Every position in one market version
    pub fn market_positions(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
    ) -> Result<Vec<Position>> {
        Ok(POSITIONS
            .prefix(ctx, &(pair.clone(), version))?
            .into_iter()
            .map(|(_, position)| position)
            .collect())
    }

    pub(crate) fn save_position(&self, ctx: &mut Context<'_>, position: &Position) -> Result<()> {
        let key = ((position.pair.clone(), position.version), position.trader);
        POSITIONS.save(ctx, &key, position)?;
        Ok(())
    }

    pub(crate) fn delete_position(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
        trader: &AccAddress,
    ) -> Result<()> {
        POSITIONS.remove(ctx, &((pair.clone(), version), *trader))?;
        Ok(())
    }

    // === Snapshots and TWAPs ===

    /// Record the pool's reserves at the block time
    pub fn snapshot_reserves(&self, ctx: &mut Context<'_>, amm: &Amm) -> Result<()> {
        let now = ctx.block_time_ms();
        let snapshot = ReserveSnapshot {
            version: amm.version,
            base_reserve: amm.base_reserve.clone(),
            quote_reserve: amm.quote_reserve.clone(),
            price_multiplier: amm.price_multiplier.clone(),
            timestamp_ms: now,
        };
        RESERVE_SNAPSHOTS.save(ctx, &(amm.pair.clone(), now), &snapshot)?;
        Ok(())
    }

    /// Snapshots of one market version at or before now, newest first
    fn snapshots(&self, ctx: &mut Context<'_>, pair: &AssetPair, version: u64) -> Result<Vec<ReserveSnapshot>> {
        let now = ctx.block_time_ms();
        Ok(RESERVE_SNAPSHOTS
            .prefix_range(ctx, pair, Bound::Unbounded, Bound::Included(&now), Order::Descending)?
            .into_iter()
            .map(|(_, snapshot)| snapshot)
            .filter(|snapshot| snapshot.version == version)
            .collect())
    }

    pub fn latest_snapshot(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
    ) -> Result<Option<ReserveSnapshot>> {
        Ok(self.snapshots(ctx, pair, version)?.into_iter().next())
    }

    /// Drop snapshots older than `lookback_ms`, keeping the newest of them
    pub(crate) fn prune_snapshots(&self, ctx: &mut Context<'_>, pair: &AssetPair, lookback_ms: i64) -> Result<usize> {
        let lower = ctx.block_time_ms() - lookback_ms.max(0);
        let stale = RESERVE_SNAPSHOTS.prefix_range(
            ctx,
            pair,
            Bound::Unbounded,
            Bound::Excluded(&lower),
            Order::Descending,
        )?;
        let mut removed = 0;
        for (ts, _) in stale.into_iter().skip(1) {
            RESERVE_SNAPSHOTS.remove(ctx, &(pair.clone(), ts))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Time-weighted mark price; the spot mark when there are no snapshots
    pub fn mark_price_twap(&self, ctx: &mut Context<'_>, market: &Market, amm: &Amm) -> Result<Dec> {
        let points: Vec<(i64, Dec)> = self
            .snapshots(ctx, &market.pair, market.version)?
            .into_iter()
            .map(|s| (s.timestamp_ms, s.mark_price()))
            .collect();
        Ok(twap::time_weighted_average(&points, ctx.block_time_ms(), market.twap_lookback_window_ms)
            .unwrap_or_else(|| amm.mark_price()))
    }

    /// Quote value of closing the position against the current reserves
    pub fn position_notional_spot(&self, amm: &Amm, position: &Position) -> Result<Dec> {
        if position.size.is_zero() {
            return Ok(Dec::zero());
        }
        let reserve = amm.quote_reserve_delta(&position.size.abs(), Direction::closing(&position.size))?;
        amm.quote_reserve_to_asset(&reserve)
    }

    /// Time-weighted close value over the market's lookback; spot without snapshots
    pub fn position_notional_twap(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        amm: &Amm,
        position: &Position,
    ) -> Result<Dec> {
        if position.size.is_zero() {
            return Ok(Dec::zero());
        }
        let mut points = Vec::new();
        for snapshot in self.snapshots(ctx, &market.pair, market.version)? {
            let past = Amm {
                base_reserve: snapshot.base_reserve,
                quote_reserve: snapshot.quote_reserve,
                price_multiplier: snapshot.price_multiplier,
                ..amm.clone()
            };
            points.push((snapshot.timestamp_ms, self.position_notional_spot(&past, position)?));
        }
        match twap::time_weighted_average(&points, ctx.block_time_ms(), market.twap_lookback_window_ms) {
            Some(notional) => Ok(notional),
            None => self.position_notional_spot(amm, position),
        }
    }

    // === Swaps ===

    /// Swap quote into the pool and persist it; returns the base moved
    ///
    /// `base_limit` bounds the result when positive: a LONG must receive at
    /// least it, a SHORT must give at most it.
    pub(crate) fn swap_quote_asset(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        mut amm: Amm,
        dir: Direction,
        quote_asset: &Dec,
        base_limit: &Dec,
        skip_fluctuation_check: bool,
    ) -> Result<(Amm, Dec)> {
        let base = amm.swap_quote_asset(quote_asset, dir)?;
        check_user_limit(&base, base_limit, dir)?;
        if !skip_fluctuation_check {
            self.check_price_fluctuation(ctx, market, &amm)?;
        }
        self.save_amm(ctx, &amm)?;
        debug!(pair = %amm.pair, %dir, quote = %quote_asset, %base, "swapped quote asset");
        Ok((amm, base))
    }

    /// Swap base into or out of the pool and persist it; returns the quote moved
    ///
    /// `quote_limit` bounds the result when positive: a SHORT must receive at
    /// least it, a LONG must pay at most it.
    pub(crate) fn swap_base_asset(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        mut amm: Amm,
        dir: Direction,
        base: &Dec,
        quote_limit: &Dec,
        skip_fluctuation_check: bool,
    ) -> Result<(Amm, Dec)> {
        let quote = amm.swap_base_asset(base, dir)?;
        check_user_limit(&quote, quote_limit, dir.opposite())?;
        if !skip_fluctuation_check {
            self.check_price_fluctuation(ctx, market, &amm)?;
        }
        self.save_amm(ctx, &amm)?;
        debug!(pair = %amm.pair, %dir, %base, %quote, "swapped base asset");
        Ok((amm, quote))
    }

    /// Reject a mark price too far from the latest snapshot at or before now
    pub(crate) fn check_price_fluctuation(&self, ctx: &mut Context<'_>, market: &Market, amm: &Amm) -> Result<()> {
        if market.price_fluctuation_limit_ratio.is_zero() {
            return Ok(());
        }
        let Some(snapshot) = self.latest_snapshot(ctx, &amm.pair, amm.version)? else {
            return Ok(());
        };
        let reference = snapshot.mark_price();
        if reference.is_zero() {
            return Ok(());
        }
        let price = amm.mark_price();
        let moved = price.checked_sub(&reference)?.abs().checked_quo(&reference)?;
        if moved > market.price_fluctuation_limit_ratio {
            return Err(PerpError::OverFluctuationLimit {
                price: price.to_string(),
                reference: reference.to_string(),
                limit: market.price_fluctuation_limit_ratio.to_string(),
            });
        }
        Ok(())
    }

    // === Vault ===

    /// Pay `amount` from the vault, topping it up from the ecosystem fund
    ///
    /// A shortage in the vault is borrowed from the fund and recorded as
    /// prepaid bad debt on the market.
    pub(crate) fn withdraw(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
        receiver: &AccAddress,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let collateral = self.collateral(ctx)?;
        let vault = self.accounts.module_address(accounts::PERP_VAULT);
        let balance = self.bank.get_balance(ctx, &vault, &collateral)?;
        if balance < amount {
            let shortage = amount - balance;
            let mut market = self.market_by_version(ctx, pair, version)?;
            market.prepaid_bad_debt = market.prepaid_bad_debt.checked_add(&Dec::from(shortage))?;
            self.save_market(ctx, &market)?;
            warn!(%pair, shortage, "vault short, drawing on the ecosystem fund");
            self.bank
                .send_coins_from_module_to_module(
                    ctx,
                    accounts::PERP_EF,
                    accounts::PERP_VAULT,
                    &Coins::single(shortage, collateral.clone()),
                )
                .map_err(|e| PerpError::NotEnoughFundToPay(e.to_string()))?;
        }
        self.bank.send_coins_from_module_to_account(
            ctx,
            accounts::PERP_VAULT,
            receiver,
            &Coins::single(amount, collateral),
        )?;
        Ok(())
    }

    /// Cover bad debt from prepaid bad debt first, then the ecosystem fund
    pub(crate) fn realize_bad_debt(
        &self,
        ctx: &mut Context<'_>,
        pair: &AssetPair,
        version: u64,
        bad_debt: &Dec,
    ) -> Result<()> {
        let amount = Dec::from(to_amount(bad_debt)?);
        if amount.is_zero() {
            return Ok(());
        }
        let mut market = self.market_by_version(ctx, pair, version)?;
        if market.prepaid_bad_debt >= amount {
            market.prepaid_bad_debt = market.prepaid_bad_debt.checked_sub(&amount)?;
            self.save_market(ctx, &market)?;
            return Ok(());
        }
        let rest = amount.checked_sub(&market.prepaid_bad_debt)?;
        market.prepaid_bad_debt = Dec::zero();
        self.save_market(ctx, &market)?;
        warn!(%pair, bad_debt = %rest, "realising bad debt from the ecosystem fund");
        let coins = self.collateral_coins(ctx, to_amount(&rest)?)?;
        self.bank
            .send_coins_from_module_to_module(ctx, accounts::PERP_EF, accounts::PERP_VAULT, &coins)
            .map_err(|e| PerpError::NotEnoughFundToPay(e.to_string()))?;
        Ok(())
    }

    /// Charge trading fees on `notional`; returns the total fee paid
    ///
    /// The exchange part goes to the fee pool at the trader's discounted
    /// ratio, the ecosystem part to the ecosystem fund. The notional is also
    /// credited to the trader's volume.
    pub(crate) fn transfer_fee(
        &self,
        ctx: &mut Context<'_>,
        market: &Market,
        trader: &AccAddress,
        notional: &Dec,
    ) -> Result<u128> {
        let notional = notional.abs();
        self.discounts.record_volume(ctx, trader, &notional)?;
        let exchange_ratio = self.discounts.fee_ratio(ctx, trader, &market.exchange_fee_ratio)?;

        let to_pool = to_amount(&exchange_ratio.checked_mul(&notional)?)?;
        if to_pool > 0 {
            let coins = self.collateral_coins(ctx, to_pool)?;
            self.bank
                .send_coins_from_account_to_module(ctx, trader, accounts::FEE_POOL, &coins)?;
        }
        let to_fund = to_amount(&market.ecosystem_fund_fee_ratio.checked_mul(&notional)?)?;
        if to_fund > 0 {
            let coins = self.collateral_coins(ctx, to_fund)?;
            self.bank
                .send_coins_from_account_to_module(ctx, trader, accounts::PERP_EF, &coins)?;
        }
        Ok(to_pool + to_fund)
    }
}

fn check_user_limit(amount: &Dec, limit: &Dec, dir: Direction) -> Result<()> {
    if !limit.is_positive() {
        return Ok(());
    }
    let fails = match dir {
        Direction::Long => amount < limit,
        Direction::Short => amount > limit,
    };
    if fails {
        return Err(PerpError::AssetFailsUserLimit {
            amount: amount.to_string(),
            limit: limit.to_string(),
        });
    }
    Ok(())
}

/// Non-negative decimal rounded to a whole collateral amount
pub(crate) fn to_amount(value: &Dec) -> Result<u128> {
    if value.is_negative() {
        return Ok(0);
    }
    Ok(value.round().to_u128_truncated()?)
}
