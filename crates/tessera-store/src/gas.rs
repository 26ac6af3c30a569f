//! Gas accounting for key-value access

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// Per-operation KV gas costs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    pub has_cost: u64,
    pub delete_cost: u64,
    pub read_cost_flat: u64,
    pub read_cost_per_byte: u64,
    pub write_cost_flat: u64,
    pub write_cost_per_byte: u64,
    pub iter_next_cost_flat: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }
}

impl GasConfig {
    /// Config that charges nothing, used for block hooks and queries
    pub fn free() -> Self {
        Self {
            has_cost: 0,
            delete_cost: 0,
            read_cost_flat: 0,
            read_cost_per_byte: 0,
            write_cost_flat: 0,
            write_cost_per_byte: 0,
            iter_next_cost_flat: 0,
        }
    }
}

/// Tracks gas consumed against an optional limit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl GasMeter {
    /// Meter with a hard limit
    pub fn new(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: 0,
        }
    }

    /// Meter that never runs out
    pub fn infinite() -> Self {
        Self::default()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.consumed))
    }

    /// Charge `amount`; the meter stays saturated at the attempted total on failure
    pub fn consume(&mut self, amount: u64, descriptor: &str) -> Result<()> {
        let wanted = self.consumed.saturating_add(amount);
        self.consumed = wanted;
        match self.limit {
            Some(limit) if wanted > limit => Err(StoreError::OutOfGas {
                limit,
                wanted,
                descriptor: descriptor.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self.limit, Some(limit) if self.consumed > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_within_limit() {
        let mut meter = GasMeter::new(5000);
        meter.consume(3000, "write").unwrap();
        assert_eq!(meter.remaining(), Some(2000));
        assert!(!meter.is_out_of_gas());
    }

    #[test]
    fn test_consume_past_limit() {
        let mut meter = GasMeter::new(1000);
        let err = meter.consume(1001, "read").unwrap_err();
        assert_eq!(
            err,
            StoreError::OutOfGas {
                limit: 1000,
                wanted: 1001,
                descriptor: "read".into()
            }
        );
        assert!(meter.is_out_of_gas());
    }

    #[test]
    fn test_infinite_meter() {
        let mut meter = GasMeter::infinite();
        meter.consume(u64::MAX, "anything").unwrap();
        meter.consume(1, "more").unwrap();
        assert_eq!(meter.remaining(), None);
    }
}
