//! Perp genesis import and export

use crate::admin::validate_denom;
use crate::amm::Amm;
use crate::error::{PerpError, Result};
use crate::keeper::Keeper;
use crate::market::Market;
use crate::state::{
    AMMS, COLLATERAL, MARKETS, MARKET_LAST_VERSION, POSITIONS, RESERVE_SNAPSHOTS,
    WHITELISTED_LIQUIDATORS,
};
use crate::types::{Position, ReserveSnapshot};
use serde::{Deserialize, Serialize};
use tessera_core::{AccAddress, AssetPair};
use tessera_store::{Context, Order};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    /// Empty leaves the denom to be set later
    pub collateral: String,
    pub markets: Vec<Market>,
    pub amms: Vec<Amm>,
    pub market_last_versions: Vec<(AssetPair, u64)>,
    pub positions: Vec<Position>,
    pub reserve_snapshots: Vec<((AssetPair, i64), ReserveSnapshot)>,
    pub whitelisted_liquidators: Vec<AccAddress>,
}

impl GenesisState {
    pub fn validate(&self) -> Result<()> {
        if !self.collateral.is_empty() {
            validate_denom(&self.collateral)?;
        }
        for market in &self.markets {
            market.validate()?;
        }
        for amm in &self.amms {
            amm.validate()?;
        }
        for (pair, version) in &self.market_last_versions {
            let known = self
                .markets
                .iter()
                .any(|m| m.pair == *pair && m.version == *version);
            if !known {
                return Err(PerpError::MarketVersionNotFound {
                    pair: pair.clone(),
                    version: *version,
                });
            }
        }
        Ok(())
    }
}

impl Keeper {
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &GenesisState) -> Result<()> {
        genesis.validate()?;
        if !genesis.collateral.is_empty() {
            COLLATERAL.save(ctx, &genesis.collateral)?;
        }
        for market in &genesis.markets {
            MARKETS.save(ctx, &(market.pair.clone(), market.version), market)?;
        }
        for amm in &genesis.amms {
            AMMS.save(ctx, &(amm.pair.clone(), amm.version), amm)?;
        }
        for (pair, version) in &genesis.market_last_versions {
            MARKET_LAST_VERSION.save(ctx, pair, version)?;
        }
        for position in &genesis.positions {
            self.save_position(ctx, position)?;
        }
        for (key, snapshot) in &genesis.reserve_snapshots {
            RESERVE_SNAPSHOTS.save(ctx, key, snapshot)?;
        }
        for liquidator in &genesis.whitelisted_liquidators {
            WHITELISTED_LIQUIDATORS.save(ctx, liquidator, &())?;
        }
        Ok(())
    }

    pub fn export_genesis(&self, ctx: &mut Context<'_>) -> Result<GenesisState> {
        Ok(GenesisState {
            collateral: COLLATERAL.may_load(ctx)?.unwrap_or_default(),
            markets: MARKETS.all(ctx)?.into_iter().map(|(_, m)| m).collect(),
            amms: AMMS.all(ctx)?.into_iter().map(|(_, a)| a).collect(),
            market_last_versions: MARKET_LAST_VERSION.all(ctx)?,
            positions: POSITIONS.all(ctx)?.into_iter().map(|(_, p)| p).collect(),
            reserve_snapshots: RESERVE_SNAPSHOTS.all(ctx)?,
            whitelisted_liquidators: WHITELISTED_LIQUIDATORS.keys(ctx, Order::Ascending)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::tests::{ctx_at, d, fund, keeper, pair, setup_market};
    use crate::types::Direction;
    use tessera_core::Dec;
    use tessera_store::CommitStore;

    #[test]
    fn test_genesis_round_trip() {
        let store = CommitStore::new();
        let mut ctx = ctx_at(&store, 1, 1_000);
        let k = keeper();
        setup_market(&mut ctx, &k, "1000000", "1");
        let trader = AccAddress::from_seed("alice");
        fund(&mut ctx, &trader, 1_000);
        k.market_order(&mut ctx, &pair(), &trader, Direction::Short, 100, &d("2"), &Dec::zero())
            .unwrap();
        k.whitelist_liquidator(&mut ctx, &AccAddress::from_seed("liq")).unwrap();
        let exported = k.export_genesis(&mut ctx).unwrap();
        assert_eq!(exported.positions.len(), 1);
        assert_eq!(exported.collateral, "unusd");

        let other = CommitStore::new();
        let mut fresh = ctx_at(&other, 1, 1_000);
        k.init_genesis(&mut fresh, &exported).unwrap();
        assert_eq!(k.export_genesis(&mut fresh).unwrap(), exported);
    }

    #[test]
    fn test_rejects_dangling_version() {
        let genesis = GenesisState {
            market_last_versions: vec![(pair(), 3)],
            ..Default::default()
        };
        assert!(matches!(
            genesis.validate(),
            Err(PerpError::MarketVersionNotFound { version: 3, .. })
        ));
    }
}
