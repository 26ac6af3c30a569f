//! # Tessera Application
//!
//! Assembles the oracle, perp and DnR modules into one replicated state
//! machine:
//!
//! | Module | Role |
//! |--------|------|
//! | [`app`] | block lifecycle, transaction routing, queries |
//! | [`epochs`] | epoch timers driving perp funding and DnR rollover |
//! | [`genesis`] | chain genesis import and export |
//! | [`config`] | TOML plus environment configuration |
//! | [`telemetry`] | tracing subscriber setup |

pub mod app;
pub mod config;
pub mod epochs;
pub mod error;
pub mod genesis;
pub mod msgs;
pub mod telemetry;

pub use app::{App, BlockResult, TxResult};
pub use config::AppConfig;
pub use epochs::EpochInfo;
pub use error::{AppError, Result};
pub use genesis::{GenesisBalance, GenesisState};
pub use msgs::Msg;
pub use telemetry::init_tracing;
