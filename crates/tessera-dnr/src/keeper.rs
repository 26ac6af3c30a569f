//! DnR keeper: volume accrual, discount lookup, epoch rollover and rebates

use crate::error::{DnrError, Result};
use crate::events::{DnrEpochStarted, RebatesAllocated, RebatesWithdrawn};
use crate::state::{
    CURRENT_EPOCH, EPOCH_ALLOCATIONS, GLOBAL_DISCOUNTS, GLOBAL_VOLUMES, TRADER_DISCOUNTS,
    TRADER_VOLUMES,
};
use std::ops::Bound;
use std::sync::Arc;
use tessera_core::host::{accounts, AccountKeeper, BankKeeper, DiscountKeeper, SudoKeeper};
use tessera_core::{event, AccAddress, Coins, CoreError, Dec};
use tessera_store::{Context, Order};
use tracing::{debug, info};

#[derive(Clone)]
pub struct Keeper {
    pub(crate) bank: Arc<dyn BankKeeper>,
    pub(crate) accounts: Arc<dyn AccountKeeper>,
    pub(crate) sudo: Arc<dyn SudoKeeper>,
    /// Epoch identifier whose ends roll DnR epochs over
    epoch_identifier: String,
}

impl Keeper {
    pub fn new(
        bank: Arc<dyn BankKeeper>,
        accounts: Arc<dyn AccountKeeper>,
        sudo: Arc<dyn SudoKeeper>,
        epoch_identifier: impl Into<String>,
    ) -> Self {
        Self {
            bank,
            accounts,
            sudo,
            epoch_identifier: epoch_identifier.into(),
        }
    }

    pub fn epoch_identifier(&self) -> &str {
        &self.epoch_identifier
    }

    pub fn current_epoch(&self, ctx: &mut Context<'_>) -> Result<u64> {
        Ok(CURRENT_EPOCH.may_load(ctx)?.unwrap_or(0))
    }

    // === Volume ===

    pub fn trader_volume(&self, ctx: &mut Context<'_>, trader: &AccAddress, epoch: u64) -> Result<Dec> {
        Ok(TRADER_VOLUMES
            .may_load(ctx, &(*trader, epoch))?
            .unwrap_or_default())
    }

    pub fn global_volume(&self, ctx: &mut Context<'_>, epoch: u64) -> Result<Dec> {
        Ok(GLOBAL_VOLUMES.may_load(ctx, &epoch)?.unwrap_or_default())
    }

    /// Credit `|volume|` to the trader and the global total of the current epoch
    pub fn increase_trader_volume(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        volume: &Dec,
    ) -> Result<()> {
        let volume = volume.abs();
        if volume.is_zero() {
            return Ok(());
        }
        let epoch = self.current_epoch(ctx)?;
        let trader_total = self.trader_volume(ctx, trader, epoch)?.checked_add(&volume)?;
        TRADER_VOLUMES.save(ctx, &(*trader, epoch), &trader_total)?;
        let global_total = self.global_volume(ctx, epoch)?.checked_add(&volume)?;
        GLOBAL_VOLUMES.save(ctx, &epoch, &global_total)?;
        debug!(%trader, epoch, %volume, total = %trader_total, "recorded trade volume");
        Ok(())
    }

    // === Discounts ===

    /// Fee ratio for a trader based on last epoch's volume
    ///
    /// A trader override with the largest threshold at or below the volume
    /// wins, then the global schedule, then `base_fee_ratio`.
    pub fn calculate_discount(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        base_fee_ratio: &Dec,
    ) -> Result<Dec> {
        let current = self.current_epoch(ctx)?;
        if current == 0 {
            return Ok(base_fee_ratio.clone());
        }
        let volume = self.trader_volume(ctx, trader, current - 1)?;
        if volume.is_zero() {
            return Ok(base_fee_ratio.clone());
        }

        let overrides = TRADER_DISCOUNTS.prefix_range(
            ctx,
            trader,
            Bound::Unbounded,
            Bound::Included(&volume),
            Order::Descending,
        )?;
        if let Some((_, ratio)) = overrides.into_iter().next() {
            return Ok(ratio);
        }

        let global = GLOBAL_DISCOUNTS.range(
            ctx,
            Bound::Unbounded,
            Bound::Included(&volume),
            Order::Descending,
        )?;
        Ok(global
            .into_iter()
            .next()
            .map(|(_, ratio)| ratio)
            .unwrap_or_else(|| base_fee_ratio.clone()))
    }

    pub fn set_global_discount(&self, ctx: &mut Context<'_>, threshold: &Dec, fee_ratio: &Dec) -> Result<()> {
        validate_discount(threshold, fee_ratio)?;
        GLOBAL_DISCOUNTS.save(ctx, threshold, fee_ratio)?;
        info!(%threshold, %fee_ratio, "set global discount");
        Ok(())
    }

    pub fn remove_global_discount(&self, ctx: &mut Context<'_>, threshold: &Dec) -> Result<()> {
        if !GLOBAL_DISCOUNTS.has(ctx, threshold)? {
            return Err(DnrError::DiscountNotFound(threshold.to_string()));
        }
        GLOBAL_DISCOUNTS.remove(ctx, threshold)?;
        info!(%threshold, "removed global discount");
        Ok(())
    }

    pub fn set_trader_discount(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        threshold: &Dec,
        fee_ratio: &Dec,
    ) -> Result<()> {
        validate_discount(threshold, fee_ratio)?;
        TRADER_DISCOUNTS.save(ctx, &(*trader, threshold.clone()), fee_ratio)?;
        info!(%trader, %threshold, %fee_ratio, "set trader discount");
        Ok(())
    }

    pub fn remove_trader_discount(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        threshold: &Dec,
    ) -> Result<()> {
        let key = (*trader, threshold.clone());
        if !TRADER_DISCOUNTS.has(ctx, &key)? {
            return Err(DnrError::DiscountNotFound(threshold.to_string()));
        }
        TRADER_DISCOUNTS.remove(ctx, &key)?;
        info!(%trader, %threshold, "removed trader discount");
        Ok(())
    }

    pub fn global_discounts(&self, ctx: &mut Context<'_>) -> Result<Vec<(Dec, Dec)>> {
        Ok(GLOBAL_DISCOUNTS.all(ctx)?)
    }

    pub fn trader_discounts(&self, ctx: &mut Context<'_>, trader: &AccAddress) -> Result<Vec<(Dec, Dec)>> {
        Ok(TRADER_DISCOUNTS.prefix(ctx, trader)?)
    }

    // === Rebates ===

    /// Move coins from `sender` into the allocation account for the current epoch
    pub fn allocate_epoch_rebates(
        &self,
        ctx: &mut Context<'_>,
        sender: &AccAddress,
        coins: &Coins,
    ) -> Result<()> {
        if coins.is_empty() {
            return Err(DnrError::InvalidAllocation("no coins".into()));
        }
        self.bank
            .send_coins_from_account_to_module(ctx, sender, accounts::DNR_ALLOCATION, coins)?;
        let epoch = self.current_epoch(ctx)?;
        info!(%sender, epoch, %coins, "allocated epoch rebates");
        event::emit(
            ctx,
            &RebatesAllocated {
                sender: *sender,
                epoch,
                coins: coins.clone(),
            },
        )?;
        Ok(())
    }

    pub fn epoch_allocation(&self, ctx: &mut Context<'_>, epoch: u64) -> Result<Coins> {
        Ok(EPOCH_ALLOCATIONS.may_load(ctx, &epoch)?.unwrap_or_default())
    }

    /// Pay the trader's volume-weighted share of a past epoch's rebates
    ///
    /// Returns the coins paid; empty when the trader has nothing to claim.
    /// The trader's volume for the epoch is deleted so a claim pays once.
    pub fn withdraw_epoch_rebates(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        epoch: u64,
    ) -> Result<Coins> {
        let current = self.current_epoch(ctx)?;
        if epoch >= current {
            return Err(DnrError::EpochNotPast { epoch, current });
        }

        let volume = self.trader_volume(ctx, trader, epoch)?;
        let global = self.global_volume(ctx, epoch)?;
        if volume.is_zero() || global.is_zero() {
            return Ok(Coins::empty());
        }
        // truncated so the weights of all claims sum to at most one
        let weight = volume.checked_quo_truncate(&global)?;
        let payout = self.epoch_allocation(ctx, epoch)?.mul_dec_truncate(&weight)?;

        TRADER_VOLUMES.remove(ctx, &(*trader, epoch))?;
        if !payout.is_empty() {
            self.bank
                .send_coins_from_module_to_account(ctx, accounts::DNR_ESCROW, trader, &payout)?;
        }
        info!(%trader, epoch, %weight, %payout, "withdrew epoch rebates");
        event::emit(
            ctx,
            &RebatesWithdrawn {
                trader: *trader,
                epoch,
                coins: payout.clone(),
            },
        )?;
        Ok(payout)
    }

    /// Begin epoch `number`: escrow the allocation account for the epoch that ended
    pub fn start_new_epoch(&self, ctx: &mut Context<'_>, number: u64) -> Result<()> {
        CURRENT_EPOCH.save(ctx, &number)?;
        let allocation = self.accounts.module_address(accounts::DNR_ALLOCATION);
        let balance = self.bank.get_all_balances(ctx, &allocation)?;
        if !balance.is_empty() && number > 0 {
            self.bank.send_coins_from_module_to_module(
                ctx,
                accounts::DNR_ALLOCATION,
                accounts::DNR_ESCROW,
                &balance,
            )?;
            let ended = number - 1;
            let total = self.epoch_allocation(ctx, ended)?.checked_add(&balance)?;
            EPOCH_ALLOCATIONS.save(ctx, &ended, &total)?;
        }
        info!(epoch = number, escrowed = %balance, "started dnr epoch");
        event::emit(
            ctx,
            &DnrEpochStarted {
                epoch: number,
                escrowed: balance,
            },
        )?;
        Ok(())
    }
}

fn validate_discount(threshold: &Dec, fee_ratio: &Dec) -> Result<()> {
    if threshold.is_negative() {
        return Err(DnrError::InvalidDiscount(format!(
            "volume threshold must not be negative, got {threshold}"
        )));
    }
    if fee_ratio.is_negative() || *fee_ratio > Dec::one() {
        return Err(DnrError::InvalidDiscount(format!(
            "fee ratio must be within [0, 1], got {fee_ratio}"
        )));
    }
    Ok(())
}

impl DiscountKeeper for Keeper {
    fn record_volume(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        notional: &Dec,
    ) -> std::result::Result<(), CoreError> {
        Ok(self.increase_trader_volume(ctx, trader, notional)?)
    }

    fn fee_ratio(
        &self,
        ctx: &mut Context<'_>,
        trader: &AccAddress,
        base: &Dec,
    ) -> std::result::Result<Dec, CoreError> {
        Ok(self.calculate_discount(ctx, trader, base)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tessera_core::host::{ModuleAccounts, StoreBank, StoreSudo};
    use tessera_store::{BlockHeader, CommitStore, GasMeter};

    pub(crate) const EPOCH_ID: &str = "week";

    pub(crate) fn keeper() -> Keeper {
        Keeper::new(
            Arc::new(StoreBank::new()),
            Arc::new(ModuleAccounts),
            Arc::new(StoreSudo::new()),
            EPOCH_ID,
        )
    }

    pub(crate) fn ctx(store: &CommitStore) -> Context<'_> {
        let time = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid timestamp");
        Context::new(store, BlockHeader::new("dnr-test", 1, time), GasMeter::infinite())
    }

    fn d(s: &str) -> Dec {
        s.parse().unwrap()
    }

    fn usdc(amount: u128) -> Coins {
        Coins::single(amount, "uusdc")
    }

    #[test]
    fn test_volume_accrues_absolute_notional() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        let alice = AccAddress::from_seed("alice");
        k.increase_trader_volume(&mut ctx, &alice, &d("100")).unwrap();
        k.increase_trader_volume(&mut ctx, &alice, &d("-50")).unwrap();
        assert_eq!(k.trader_volume(&mut ctx, &alice, 0).unwrap(), d("150"));
        assert_eq!(k.global_volume(&mut ctx, 0).unwrap(), d("150"));
    }

    #[test]
    fn test_discount_resolution() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        let base = d("0.001");
        let alice = AccAddress::from_seed("alice");
        let bob = AccAddress::from_seed("bob");

        k.set_global_discount(&mut ctx, &d("1000"), &d("0.0008")).unwrap();
        k.set_global_discount(&mut ctx, &d("10000"), &d("0.0005")).unwrap();
        k.set_trader_discount(&mut ctx, &bob, &d("500"), &d("0.0001")).unwrap();

        // epoch 0 has no history
        assert_eq!(k.calculate_discount(&mut ctx, &alice, &base).unwrap(), base);

        k.increase_trader_volume(&mut ctx, &alice, &d("5000")).unwrap();
        k.increase_trader_volume(&mut ctx, &bob, &d("600")).unwrap();
        k.start_new_epoch(&mut ctx, 1).unwrap();

        assert_eq!(k.calculate_discount(&mut ctx, &alice, &base).unwrap(), d("0.0008"));
        assert_eq!(k.calculate_discount(&mut ctx, &bob, &base).unwrap(), d("0.0001"));
        let carol = AccAddress::from_seed("carol");
        assert_eq!(k.calculate_discount(&mut ctx, &carol, &base).unwrap(), base);

        // exactly at a threshold qualifies
        k.increase_trader_volume(&mut ctx, &alice, &d("10000")).unwrap();
        k.start_new_epoch(&mut ctx, 2).unwrap();
        assert_eq!(k.calculate_discount(&mut ctx, &alice, &base).unwrap(), d("0.0005"));
        // bob traded nothing in epoch 1
        assert_eq!(k.calculate_discount(&mut ctx, &bob, &base).unwrap(), base);
    }

    #[test]
    fn test_invalid_discounts() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        assert!(k.set_global_discount(&mut ctx, &d("-1"), &d("0.1")).is_err());
        assert!(k.set_global_discount(&mut ctx, &d("1"), &d("1.1")).is_err());
        assert!(matches!(
            k.remove_global_discount(&mut ctx, &d("1")),
            Err(DnrError::DiscountNotFound(_))
        ));
    }

    #[test]
    fn test_rollover_and_withdraw() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        let bank = StoreBank::new();
        let funder = AccAddress::from_seed("funder");
        let a = AccAddress::from_seed("a");
        let b = AccAddress::from_seed("b");

        bank.mint(&mut ctx, &funder, &usdc(100)).unwrap();
        k.allocate_epoch_rebates(&mut ctx, &funder, &usdc(100)).unwrap();
        k.increase_trader_volume(&mut ctx, &a, &d("600")).unwrap();
        k.increase_trader_volume(&mut ctx, &b, &d("400")).unwrap();

        assert!(matches!(
            k.withdraw_epoch_rebates(&mut ctx, &a, 0),
            Err(DnrError::EpochNotPast { epoch: 0, current: 0 })
        ));

        k.start_new_epoch(&mut ctx, 1).unwrap();
        assert_eq!(k.epoch_allocation(&mut ctx, 0).unwrap(), usdc(100));

        assert_eq!(k.withdraw_epoch_rebates(&mut ctx, &a, 0).unwrap(), usdc(60));
        assert!(k.withdraw_epoch_rebates(&mut ctx, &a, 0).unwrap().is_empty());
        assert_eq!(k.withdraw_epoch_rebates(&mut ctx, &b, 0).unwrap(), usdc(40));
        assert_eq!(bank.get_balance(&mut ctx, &a, "uusdc").unwrap(), 60);

        let escrow = AccAddress::module(accounts::DNR_ESCROW);
        assert_eq!(bank.get_balance(&mut ctx, &escrow, "uusdc").unwrap(), 0);
    }

    #[test]
    fn test_empty_allocation_rollover() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        k.start_new_epoch(&mut ctx, 1).unwrap();
        assert_eq!(k.current_epoch(&mut ctx).unwrap(), 1);
        assert!(k.epoch_allocation(&mut ctx, 0).unwrap().is_empty());
    }

    #[test]
    fn test_uneven_split_of_large_allocation() {
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        let bank = StoreBank::new();
        let funder = AccAddress::from_seed("funder");
        let allocation = 10u128.pow(20);
        bank.mint(&mut ctx, &funder, &usdc(allocation)).unwrap();
        k.allocate_epoch_rebates(&mut ctx, &funder, &usdc(allocation)).unwrap();

        let a = AccAddress::from_seed("a");
        let b = AccAddress::from_seed("b");
        let c = AccAddress::from_seed("c");
        k.increase_trader_volume(&mut ctx, &a, &d("1")).unwrap();
        k.increase_trader_volume(&mut ctx, &b, &d("1")).unwrap();
        k.increase_trader_volume(&mut ctx, &c, &d("12")).unwrap();
        k.start_new_epoch(&mut ctx, 1).unwrap();

        // 1/14 and 12/14 truncate at the 18th decimal
        assert_eq!(
            k.withdraw_epoch_rebates(&mut ctx, &a, 0).unwrap(),
            usdc(7_142_857_142_857_142_800)
        );
        assert_eq!(
            k.withdraw_epoch_rebates(&mut ctx, &b, 0).unwrap(),
            usdc(7_142_857_142_857_142_800)
        );
        assert_eq!(
            k.withdraw_epoch_rebates(&mut ctx, &c, 0).unwrap(),
            usdc(85_714_285_714_285_714_200)
        );

        let escrow = AccAddress::module(accounts::DNR_ESCROW);
        assert_eq!(bank.get_balance(&mut ctx, &escrow, "uusdc").unwrap(), 200);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        #[test]
        fn prop_payouts_never_exceed_allocation(
            allocation in 1u128..1_000_000_000_000_000_000_000_000,
            volumes in proptest::collection::vec(1u64..1_000_000, 1..8),
        ) {
            let store = CommitStore::new();
            let mut ctx = ctx(&store);
            let k = keeper();
            let bank = StoreBank::new();
            let funder = AccAddress::from_seed("funder");
            bank.mint(&mut ctx, &funder, &usdc(allocation)).unwrap();
            k.allocate_epoch_rebates(&mut ctx, &funder, &usdc(allocation)).unwrap();

            let traders: Vec<AccAddress> = (0..volumes.len())
                .map(|i| AccAddress::from_seed(&format!("trader-{i}")))
                .collect();
            for (trader, volume) in traders.iter().zip(&volumes) {
                k.increase_trader_volume(&mut ctx, trader, &Dec::from(*volume)).unwrap();
            }
            k.start_new_epoch(&mut ctx, 1).unwrap();

            let mut paid = 0u128;
            for trader in &traders {
                paid += k.withdraw_epoch_rebates(&mut ctx, trader, 0).unwrap().amount_of("uusdc");
            }
            proptest::prop_assert!(paid <= allocation);
            // each claim loses under one unit to the amount truncation and
            // under allocation / 1e18 to the weight truncation
            let slack = traders.len() as u128 * (allocation / 10u128.pow(18) + 2);
            proptest::prop_assert!(paid + slack >= allocation);
        }
    }
}
