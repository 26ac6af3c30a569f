//! Application genesis

use crate::config::AppConfig;
use crate::epochs::EpochInfo;
use crate::error::{AppError, Result};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tessera_core::host::Validator;
use tessera_core::{AccAddress, Coin, Coins};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub address: AccAddress,
    pub coins: Coins,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub genesis_time: DateTime<Utc>,
    pub sudoers: Vec<AccAddress>,
    pub validators: Vec<Validator>,
    /// Account and module account balances
    pub balances: Vec<GenesisBalance>,
    /// Empty means one timer per configured epoch, starting at genesis time
    pub epochs: Vec<EpochInfo>,
    pub oracle: tessera_oracle::GenesisState,
    pub perp: tessera_perp::GenesisState,
    pub dnr: tessera_dnr::GenesisState,
}

impl GenesisState {
    pub fn new(genesis_time: DateTime<Utc>) -> Self {
        Self {
            genesis_time,
            ..Default::default()
        }
    }

    /// Read and validate a JSON genesis file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading genesis from {}", path.display()))?;
        let genesis: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing genesis from {}", path.display()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self).context("serializing genesis")?;
        std::fs::write(path, raw).with_context(|| format!("writing genesis to {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let mut operators = BTreeSet::new();
        for validator in &self.validators {
            if !operators.insert(validator.operator) {
                return Err(AppError::InvalidGenesis(format!(
                    "duplicate validator {}",
                    validator.operator
                )));
            }
        }
        let mut holders = BTreeSet::new();
        for balance in &self.balances {
            if !holders.insert(balance.address) {
                return Err(AppError::InvalidGenesis(format!(
                    "duplicate balance for {}",
                    balance.address
                )));
            }
        }
        let mut identifiers = BTreeSet::new();
        for epoch in &self.epochs {
            epoch.validate()?;
            if !identifiers.insert(epoch.identifier.as_str()) {
                return Err(AppError::InvalidGenesis(format!(
                    "duplicate epoch identifier {}",
                    epoch.identifier
                )));
            }
        }
        self.oracle.validate()?;
        self.perp.validate()?;
        Ok(())
    }

    /// Epoch timers to create: the genesis list, else the configured ones
    pub fn epochs_or_configured(&self, config: &AppConfig) -> Vec<EpochInfo> {
        if !self.epochs.is_empty() {
            return self.epochs.clone();
        }
        let start = self.genesis_time.timestamp_millis();
        config
            .epochs
            .iter()
            .map(|e| {
                let duration_ms = i64::try_from(e.duration_secs)
                    .unwrap_or(i64::MAX / 1_000)
                    .saturating_mul(1_000);
                EpochInfo::new(e.identifier.clone(), start, duration_ms)
            })
            .collect()
    }
}

/// Group `(address, coin)` rows into one balance per address
pub(crate) fn group_balances(rows: Vec<(AccAddress, Coin)>) -> Result<Vec<GenesisBalance>> {
    let mut balances: Vec<GenesisBalance> = Vec::new();
    let mut pending: Vec<Coin> = Vec::new();
    let mut current: Option<AccAddress> = None;
    for (address, coin) in rows {
        if current != Some(address) {
            if let Some(prev) = current.take() {
                balances.push(GenesisBalance {
                    address: prev,
                    coins: Coins::new(std::mem::take(&mut pending))?,
                });
            }
            current = Some(address);
        }
        pending.push(coin);
    }
    if let Some(prev) = current {
        balances.push(GenesisBalance {
            address: prev,
            coins: Coins::new(pending)?,
        });
    }
    Ok(balances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_configured_epochs_start_at_genesis() {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let genesis = GenesisState::new(time);
        let epochs = genesis.epochs_or_configured(&AppConfig::default());
        assert_eq!(epochs.len(), 4);
        let week = epochs.iter().find(|e| e.identifier == "week").unwrap();
        assert_eq!(week.start_time_ms, 1_700_000_000_000);
        assert_eq!(week.duration_ms, 7 * 24 * 3_600_000);
        assert!(!week.epoch_counting_started);
    }

    #[test]
    fn test_rejects_duplicates() {
        let alice = AccAddress::from_seed("alice");
        let mut genesis = GenesisState::default();
        genesis.balances = vec![
            GenesisBalance {
                address: alice,
                coins: Coins::single(1, "unusd"),
            },
            GenesisBalance {
                address: alice,
                coins: Coins::single(2, "unibi"),
            },
        ];
        assert!(matches!(genesis.validate(), Err(AppError::InvalidGenesis(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        let mut genesis = GenesisState::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        genesis.sudoers = vec![AccAddress::from_seed("admin")];
        genesis.balances = vec![GenesisBalance {
            address: AccAddress::from_seed("alice"),
            coins: Coins::single(5, "unusd"),
        }];
        genesis.save(&path).unwrap();
        assert_eq!(GenesisState::load(&path).unwrap(), genesis);
        assert!(GenesisState::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_group_balances() {
        let a = AccAddress::from_seed("a");
        let b = AccAddress::from_seed("b");
        let grouped = group_balances(vec![
            (a, Coin::new(1, "unibi")),
            (a, Coin::new(2, "unusd")),
            (b, Coin::new(3, "unusd")),
        ])
        .unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].coins.amount_of("unusd"), 2);
        assert_eq!(grouped[1].address, b);
    }
}
