//! DnR collections

use tessera_core::{AccAddress, Coins, Dec};
use tessera_store::{Item, Map};

pub const CURRENT_EPOCH: Item<u64> = Item::new(b"dnr/current_epoch");

/// `|notional|` traded per `(trader, epoch)`
pub const TRADER_VOLUMES: Map<(AccAddress, u64), Dec> = Map::new(b"dnr/trader_volumes/");

pub const GLOBAL_VOLUMES: Map<u64, Dec> = Map::new(b"dnr/global_volumes/");

/// Rebates escrowed for each ended epoch
pub const EPOCH_ALLOCATIONS: Map<u64, Coins> = Map::new(b"dnr/allocations/");

/// Volume threshold to fee ratio, for every trader
pub const GLOBAL_DISCOUNTS: Map<Dec, Dec> = Map::new(b"dnr/global_discounts/");

/// Per-trader overrides of the global schedule
pub const TRADER_DISCOUNTS: Map<(AccAddress, Dec), Dec> = Map::new(b"dnr/trader_discounts/");
