//! Perp state layout

use crate::amm::Amm;
use crate::market::Market;
use crate::types::{Position, ReserveSnapshot};
use tessera_core::{AccAddress, AssetPair};
use tessera_store::{Item, Map};

pub const MARKETS: Map<(AssetPair, u64), Market> = Map::new(b"perp/markets/");
pub const MARKET_LAST_VERSION: Map<AssetPair, u64> = Map::new(b"perp/last_version/");
pub const AMMS: Map<(AssetPair, u64), Amm> = Map::new(b"perp/amms/");

/// Keyed by `((pair, version), trader)`
pub const POSITIONS: Map<((AssetPair, u64), AccAddress), Position> = Map::new(b"perp/positions/");

pub const RESERVE_SNAPSHOTS: Map<(AssetPair, i64), ReserveSnapshot> =
    Map::new(b"perp/snapshots/");

pub const COLLATERAL: Item<String> = Item::new(b"perp/collateral");
pub const WHITELISTED_LIQUIDATORS: Map<AccAddress, ()> = Map::new(b"perp/liquidators/");
