use super::BankKeeper;
use crate::address::AccAddress;
use crate::coin::{Coin, Coins};
use crate::error::{CoreError, Result};
use tessera_store::{Context, Map};

const BALANCES: Map<(AccAddress, String), u128> = Map::new(b"bank/balances/");

/// Balances kept in the key-value context
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreBank;

impl StoreBank {
    pub fn new() -> Self {
        Self
    }

    /// Create coins out of thin air; genesis and tests only
    pub fn mint(&self, ctx: &mut Context<'_>, to: &AccAddress, coins: &Coins) -> Result<()> {
        for coin in coins.iter() {
            let key = (*to, coin.denom.clone());
            let have = BALANCES.may_load(ctx, &key)?.unwrap_or(0);
            let total = have
                .checked_add(coin.amount)
                .ok_or_else(|| CoreError::InvalidCoins("balance overflow".into()))?;
            BALANCES.save(ctx, &key, &total)?;
        }
        Ok(())
    }

    pub fn mint_to_module(&self, ctx: &mut Context<'_>, module: &str, coins: &Coins) -> Result<()> {
        self.mint(ctx, &AccAddress::module(module), coins)
    }

    pub fn send(
        &self,
        ctx: &mut Context<'_>,
        from: &AccAddress,
        to: &AccAddress,
        coins: &Coins,
    ) -> Result<()> {
        for coin in coins.iter() {
            self.debit(ctx, from, coin)?;
        }
        self.mint(ctx, to, coins)?;
        tracing::trace!(%from, %to, %coins, "bank transfer");
        Ok(())
    }

    fn debit(&self, ctx: &mut Context<'_>, from: &AccAddress, coin: &Coin) -> Result<()> {
        let key = (*from, coin.denom.clone());
        let have = BALANCES.may_load(ctx, &key)?.unwrap_or(0);
        let left = have
            .checked_sub(coin.amount)
            .ok_or_else(|| CoreError::InsufficientFunds {
                account: from.to_string(),
                needed: coin.to_string(),
                available: format!("{}{}", have, coin.denom),
            })?;
        if left == 0 {
            BALANCES.remove(ctx, &key)?;
        } else {
            BALANCES.save(ctx, &key, &left)?;
        }
        Ok(())
    }

    /// Every non-zero balance, for genesis export
    pub fn all_balances(&self, ctx: &mut Context<'_>) -> Result<Vec<(AccAddress, Coin)>> {
        Ok(BALANCES
            .all(ctx)?
            .into_iter()
            .map(|((addr, denom), amount)| (addr, Coin::new(amount, denom)))
            .collect())
    }
}

impl BankKeeper for StoreBank {
    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &str,
        coins: &Coins,
    ) -> Result<()> {
        self.send(ctx, &AccAddress::module(from), &AccAddress::module(to), coins)
    }

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        from: &str,
        to: &AccAddress,
        coins: &Coins,
    ) -> Result<()> {
        self.send(ctx, &AccAddress::module(from), to, coins)
    }

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        from: &AccAddress,
        to: &str,
        coins: &Coins,
    ) -> Result<()> {
        self.send(ctx, from, &AccAddress::module(to), coins)
    }

    fn get_all_balances(&self, ctx: &mut Context<'_>, addr: &AccAddress) -> Result<Coins> {
        let entries = BALANCES.prefix(ctx, addr)?;
        Coins::new(entries.into_iter().map(|(denom, amount)| Coin::new(amount, denom)))
    }

    fn get_balance(&self, ctx: &mut Context<'_>, addr: &AccAddress, denom: &str) -> Result<u128> {
        Ok(BALANCES
            .may_load(ctx, &(*addr, denom.to_string()))?
            .unwrap_or(0))
    }
}
