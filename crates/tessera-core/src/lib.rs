//! # Tessera Core
//!
//! Types shared by every Tessera module:
//! - [`Dec`] - signed fixed-point decimal with 18 fractional digits
//! - [`AssetPair`] - `base:quote` pair, ordered by its string form
//! - [`AccAddress`] / [`ValAddress`] - 20-byte account and validator addresses
//! - [`Coins`] - normalised multi-denomination amounts
//! - [`host`] - keeper interfaces to staking, bank, distribution and sudo
//! - [`TypedEvent`] - serde events with attribute-keyed encoding

pub mod address;
pub mod coin;
pub mod dec;
pub mod error;
pub mod event;
pub mod host;
pub mod pair;
pub mod twap;

pub use address::{AccAddress, ValAddress};
pub use coin::{Coin, Coins};
pub use dec::{Dec, DecError};
pub use error::{CoreError, ErrorKind, Result};
pub use event::TypedEvent;
pub use pair::AssetPair;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::{AccAddress, ValAddress};
    pub use crate::coin::{Coin, Coins};
    pub use crate::dec::Dec;
    pub use crate::error::{CoreError, ErrorKind};
    pub use crate::event::TypedEvent;
    pub use crate::pair::AssetPair;
}
