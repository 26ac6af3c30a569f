//! Application configuration
//!
//! Loaded from a TOML file layered with `TESSERA__` environment variables,
//! e.g. `TESSERA__CHAIN__CHAIN_ID=tessera-2`. Every section has defaults so
//! an empty file is a valid configuration.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TESSERA";

/// Complete application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chain settings
    #[serde(default)]
    pub chain: ChainConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Perpetuals module settings
    #[serde(default)]
    pub perp: PerpConfig,

    /// Discount and rebate settings
    #[serde(default)]
    pub dnr: DnrConfig,

    /// Epoch timers created at genesis when absent from the genesis state
    #[serde(default = "default_epochs")]
    pub epochs: Vec<EpochConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            logging: LoggingConfig::default(),
            perp: PerpConfig::default(),
            dnr: DnrConfig::default(),
            epochs: default_epochs(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("parsing config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overrides
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.chain.chain_id.is_empty(), "chain.chain_id must not be empty");
        anyhow::ensure!(
            self.perp.funding_periods_per_day > 0,
            "perp.funding_periods_per_day must be positive"
        );
        anyhow::ensure!(
            matches!(self.logging.format.as_str(), "text" | "json"),
            "logging.format must be \"text\" or \"json\", got {:?}",
            self.logging.format
        );
        let mut seen = std::collections::BTreeSet::new();
        for epoch in &self.epochs {
            anyhow::ensure!(!epoch.identifier.is_empty(), "epoch identifier must not be empty");
            anyhow::ensure!(
                epoch.duration_secs > 0,
                "epoch {} must have a positive duration",
                epoch.identifier
            );
            anyhow::ensure!(
                seen.insert(epoch.identifier.as_str()),
                "duplicate epoch identifier {}",
                epoch.identifier
            );
        }
        Ok(())
    }
}

/// Chain settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier stamped on every block header
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Gas limit per transaction; 0 disables metering
    #[serde(default = "default_tx_gas_limit")]
    pub tx_gas_limit: u64,
}

fn default_chain_id() -> String {
    "tessera-local-1".to_string()
}

fn default_tx_gas_limit() -> u64 {
    10_000_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            tx_gas_limit: default_tx_gas_limit(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Color output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpConfig {
    /// Funding payments per day; divides the daily premium
    #[serde(default = "default_funding_periods_per_day")]
    pub funding_periods_per_day: u64,

    /// Collateral denom set at genesis when the perp genesis has none
    #[serde(default = "default_collateral")]
    pub default_collateral: String,
}

fn default_funding_periods_per_day() -> u64 {
    24
}

fn default_collateral() -> String {
    "unusd".to_string()
}

impl Default for PerpConfig {
    fn default() -> Self {
        Self {
            funding_periods_per_day: default_funding_periods_per_day(),
            default_collateral: default_collateral(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnrConfig {
    /// Epoch whose ends roll DnR epochs over
    #[serde(default = "default_dnr_epoch")]
    pub epoch_identifier: String,
}

fn default_dnr_epoch() -> String {
    "week".to_string()
}

impl Default for DnrConfig {
    fn default() -> Self {
        Self {
            epoch_identifier: default_dnr_epoch(),
        }
    }
}

/// One epoch timer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub identifier: String,
    pub duration_secs: u64,
}

impl EpochConfig {
    pub fn new(identifier: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            identifier: identifier.into(),
            duration_secs,
        }
    }
}

fn default_epochs() -> Vec<EpochConfig> {
    vec![
        EpochConfig::new("30min", 30 * 60),
        EpochConfig::new("hour", 60 * 60),
        EpochConfig::new("day", 24 * 60 * 60),
        EpochConfig::new("week", 7 * 24 * 60 * 60),
    ]
}
