//! Oracle collections

use crate::params::Params;
use crate::types::{AggregatePrevote, AggregateVote, DatedPrice, PairReward, PriceSnapshot};
use tessera_core::{AccAddress, AssetPair, ValAddress};
use tessera_store::{Item, Map};

pub const PARAMS: Item<Params> = Item::new(b"oracle/params");

/// Latest published rate per pair
pub const EXCHANGE_RATES: Map<AssetPair, DatedPrice> = Map::new(b"oracle/rates/");

/// Rate history for the index TWAP, keyed by `(pair, block time ms)`
pub const PRICE_SNAPSHOTS: Map<(AssetPair, i64), PriceSnapshot> = Map::new(b"oracle/snapshots/");

pub const FEEDER_DELEGATIONS: Map<ValAddress, AccAddress> = Map::new(b"oracle/feeders/");

pub const MISS_COUNTERS: Map<ValAddress, u64> = Map::new(b"oracle/misses/");

pub const PREVOTES: Map<ValAddress, AggregatePrevote> = Map::new(b"oracle/prevotes/");

pub const VOTES: Map<ValAddress, AggregateVote> = Map::new(b"oracle/votes/");

pub const WHITELISTED_PAIRS: Map<AssetPair, ()> = Map::new(b"oracle/whitelist/");

pub const PAIR_REWARDS: Map<u64, PairReward> = Map::new(b"oracle/rewards/");

/// Next pair reward id
pub const PAIR_REWARD_SEQ: Item<u64> = Item::new(b"oracle/reward_seq");
