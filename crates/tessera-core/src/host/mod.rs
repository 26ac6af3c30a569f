//! # Host keeper interfaces
//!
//! The narrow capabilities modules consume from the surrounding chain. Every
//! call takes the transaction [`Context`] so host state changes roll back with
//! the transaction that caused them.
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`StakingKeeper`] | oracle (voter power, slash window) |
//! | [`BankKeeper`] | perp (vault, funds), dnr (escrow), oracle (rewards) |
//! | [`AccountKeeper`] | every module with a module account |
//! | [`DistributionKeeper`] | oracle reward payout |
//! | [`SudoKeeper`] | admin messages |
//! | [`EpochHooks`] | perp funding, dnr rollover |
//! | [`PriceOracle`] | perp index price |
//! | [`DiscountKeeper`] | perp fees and trade volume |
//!
//! The store-backed implementations in this module keep their state in the
//! same key-value context as the modules and are used by the app.

mod bank;
mod distribution;
mod staking;
mod sudo;

pub use bank::StoreBank;
pub use distribution::StoreDistribution;
pub use staking::{BondStatus, StoreStaking, Validator};
pub use sudo::StoreSudo;

use crate::address::{AccAddress, ValAddress};
use crate::coin::Coins;
use crate::dec::Dec;
use crate::error::Result;
use crate::pair::AssetPair;
use tessera_store::Context;

/// Well-known module account names
pub mod accounts {
    pub const PERP_VAULT: &str = "vault";
    pub const PERP_EF: &str = "perp_ef";
    pub const FEE_POOL: &str = "fee_pool";
    pub const ORACLE: &str = "oracle";
    pub const DISTRIBUTION: &str = "distribution";
    pub const DNR_ALLOCATION: &str = "dnr_allocation";
    pub const DNR_ESCROW: &str = "dnr_escrow";
    pub const TREASURY: &str = "treasury";
}

pub trait StakingKeeper: Send + Sync {
    /// Bonded, non-jailed validators in address order
    fn active_validators(&self, ctx: &mut Context<'_>) -> Result<Vec<ValAddress>>;

    fn total_bonded_power(&self, ctx: &mut Context<'_>) -> Result<i64>;

    fn validator_power(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<i64>;

    fn is_bonded(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<bool>;

    fn is_jailed(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<bool>;

    /// Burn `fraction` of the validator's bonded tokens
    fn slash(&self, ctx: &mut Context<'_>, val: &ValAddress, fraction: &Dec) -> Result<()>;

    fn jail(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<()>;

    /// Tokens per unit of consensus power
    fn power_reduction(&self) -> i64;
}

pub trait BankKeeper: Send + Sync {
    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &str,
        coins: &Coins,
    ) -> Result<()>;

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &AccAddress,
        coins: &Coins,
    ) -> Result<()>;

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &AccAddress,
        to: &str,
        coins: &Coins,
    ) -> Result<()>;

    fn get_all_balances(&self, ctx: &mut Context<'_>, addr: &AccAddress) -> Result<Coins>;

    fn get_balance(&self, ctx: &mut Context<'_>, addr: &AccAddress, denom: &str) -> Result<u128>;
}

pub trait AccountKeeper: Send + Sync {
    fn module_address(&self, name: &str) -> AccAddress;
}

pub trait DistributionKeeper: Send + Sync {
    /// Credit coins already held by the distribution module to a validator
    fn allocate_tokens_to_validator(
        &self,
        ctx: &mut Context<'_>,
        val: &ValAddress,
        coins: &Coins,
    ) -> Result<()>;
}

pub trait SudoKeeper: Send + Sync {
    /// `Unauthorized` unless `sender` holds sudo rights
    fn check_permissions(&self, ctx: &mut Context<'_>, sender: &AccAddress) -> Result<()>;
}

pub trait EpochHooks: Send + Sync {
    fn before_epoch_start(
        &self,
        _ctx: &mut Context<'_>,
        _identifier: &str,
        _number: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn after_epoch_end(&self, ctx: &mut Context<'_>, identifier: &str, number: u64)
        -> Result<()>;
}

/// Index prices published by the oracle
pub trait PriceOracle: Send + Sync {
    /// Latest rate for the pair
    fn exchange_rate(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Dec>;

    /// Time-weighted rate over the oracle's lookback window
    fn exchange_rate_twap(&self, ctx: &mut Context<'_>, pair: &AssetPair) -> Result<Dec>;
}

/// Volume-based fee discounts
pub trait DiscountKeeper: Send + Sync {
    /// Add `|notional|` to the trader's volume for the current epoch
    fn record_volume(&self, ctx: &mut Context<'_>, trader: &AccAddress, notional: &Dec) -> Result<()>;

    /// Exchange fee ratio the trader pays, given the market's base ratio
    fn fee_ratio(&self, ctx: &mut Context<'_>, trader: &AccAddress, base: &Dec) -> Result<Dec>;
}

/// Module accounts derived from their names
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleAccounts;

impl AccountKeeper for ModuleAccounts {
    fn module_address(&self, name: &str) -> AccAddress {
        AccAddress::module(name)
    }
}
