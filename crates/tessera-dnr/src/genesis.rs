//! DnR genesis import and export

use crate::error::Result;
use crate::keeper::Keeper;
use crate::state::{
    CURRENT_EPOCH, EPOCH_ALLOCATIONS, GLOBAL_DISCOUNTS, GLOBAL_VOLUMES, TRADER_DISCOUNTS,
    TRADER_VOLUMES,
};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, Coins, Dec};
use tessera_store::Context;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub current_epoch: u64,
    pub trader_volumes: Vec<((AccAddress, u64), Dec)>,
    pub global_volumes: Vec<(u64, Dec)>,
    pub epoch_allocations: Vec<(u64, Coins)>,
    pub global_discounts: Vec<(Dec, Dec)>,
    pub trader_discounts: Vec<((AccAddress, Dec), Dec)>,
}

impl Keeper {
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &GenesisState) -> Result<()> {
        CURRENT_EPOCH.save(ctx, &genesis.current_epoch)?;
        for (key, volume) in &genesis.trader_volumes {
            TRADER_VOLUMES.save(ctx, key, volume)?;
        }
        for (epoch, volume) in &genesis.global_volumes {
            GLOBAL_VOLUMES.save(ctx, epoch, volume)?;
        }
        for (epoch, coins) in &genesis.epoch_allocations {
            EPOCH_ALLOCATIONS.save(ctx, epoch, coins)?;
        }
        for (threshold, ratio) in &genesis.global_discounts {
            self.set_global_discount(ctx, threshold, ratio)?;
        }
        for ((trader, threshold), ratio) in &genesis.trader_discounts {
            self.set_trader_discount(ctx, trader, threshold, ratio)?;
        }
        Ok(())
    }

    pub fn export_genesis(&self, ctx: &mut Context<'_>) -> Result<GenesisState> {
        Ok(GenesisState {
            current_epoch: self.current_epoch(ctx)?,
            trader_volumes: TRADER_VOLUMES.all(ctx)?,
            global_volumes: GLOBAL_VOLUMES.all(ctx)?,
            epoch_allocations: EPOCH_ALLOCATIONS.all(ctx)?,
            global_discounts: GLOBAL_DISCOUNTS.all(ctx)?,
            trader_discounts: TRADER_DISCOUNTS.all(ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::tests::{ctx, keeper};
    use tessera_store::CommitStore;

    #[test]
    fn test_genesis_export_matches_import() {
        let trader = AccAddress::from_seed("t");
        let genesis = GenesisState {
            current_epoch: 4,
            trader_volumes: vec![((trader, 3), Dec::from(10i64))],
            global_volumes: vec![(3, Dec::from(40i64))],
            epoch_allocations: vec![(3, Coins::single(9, "uusdc"))],
            global_discounts: vec![(Dec::from(5i64), Dec::with_prec(1, 3))],
            trader_discounts: vec![((trader, Dec::from(1i64)), Dec::zero())],
        };
        let store = CommitStore::new();
        let mut ctx = ctx(&store);
        let k = keeper();
        k.init_genesis(&mut ctx, &genesis).unwrap();
        assert_eq!(k.export_genesis(&mut ctx).unwrap(), genesis);
    }
}
