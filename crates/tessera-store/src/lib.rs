//! # Tessera Store
//!
//! The key-value context every Tessera module reads and writes through.
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ CommitStore   committed state, shared (RwLock)           │
//! │   └─ CacheStore (block)   writes of the current block    │
//! │        └─ Context (tx)    writes of one transaction      │
//! │             └─ Context (branch)  nested, e.g. one        │
//! │                                  liquidation request     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each layer only reaches its parent when it is merged. A failed transaction
//! simply drops its layer. Iteration always returns a materialised, ordered
//! snapshot so writes made while walking a range are never observed by it.
//!
//! Modules own disjoint namespaces and access them through the typed
//! [`Item`] and [`Map`] collections.

pub mod collections;
pub mod context;
pub mod error;
pub mod event;
pub mod gas;
pub mod key;
pub mod kv;

pub use collections::{Item, Map};
pub use context::{BlockHeader, Context};
pub use error::{Result, StoreError};
pub use event::{AbciEvent, EventAttribute};
pub use gas::{GasConfig, GasMeter};
pub use key::KeyCodec;
pub use kv::{CacheStore, CommitStore, KvPair, KvRead, Order, WriteSet};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collections::{Item, Map};
    pub use crate::context::{BlockHeader, Context};
    pub use crate::error::{Result, StoreError};
    pub use crate::key::KeyCodec;
    pub use crate::kv::Order;
}
