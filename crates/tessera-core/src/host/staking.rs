use super::StakingKeeper;
use crate::address::ValAddress;
use crate::dec::Dec;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use tessera_store::{Context, Map, Order};

const VALIDATORS: Map<ValAddress, Validator> = Map::new(b"staking/validators/");

/// Default tokens per unit of consensus power
pub const DEFAULT_POWER_REDUCTION: i64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondStatus {
    Bonded,
    Unbonding,
    Unbonded,
}

/// A validator as seen by the host staking module
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: ValAddress,
    /// Bonded tokens
    #[serde(with = "crate::coin::amount_string")]
    pub tokens: u128,
    pub status: BondStatus,
    pub jailed: bool,
}

impl Validator {
    pub fn bonded(operator: ValAddress, tokens: u128) -> Self {
        Self {
            operator,
            tokens,
            status: BondStatus::Bonded,
            jailed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BondStatus::Bonded && !self.jailed
    }
}

/// Validator set kept in the key-value context
#[derive(Clone, Copy, Debug)]
pub struct StoreStaking {
    power_reduction: i64,
}

impl Default for StoreStaking {
    fn default() -> Self {
        Self {
            power_reduction: DEFAULT_POWER_REDUCTION,
        }
    }
}

impl StoreStaking {
    pub fn new(power_reduction: i64) -> Self {
        Self {
            power_reduction: power_reduction.max(1),
        }
    }

    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> Result<()> {
        VALIDATORS.save(ctx, &validator.operator, validator)?;
        Ok(())
    }

    pub fn validator(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<Validator> {
        VALIDATORS
            .may_load(ctx, val)?
            .ok_or_else(|| CoreError::UnknownValidator(val.to_string()))
    }

    pub fn validators(&self, ctx: &mut Context<'_>) -> Result<Vec<Validator>> {
        Ok(VALIDATORS
            .range(ctx, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded, Order::Ascending)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    fn power_of(&self, validator: &Validator) -> i64 {
        let power = validator.tokens / self.power_reduction as u128;
        i64::try_from(power).unwrap_or(i64::MAX)
    }
}

impl StakingKeeper for StoreStaking {
    fn active_validators(&self, ctx: &mut Context<'_>) -> Result<Vec<ValAddress>> {
        Ok(self
            .validators(ctx)?
            .into_iter()
            .filter(Validator::is_active)
            .map(|v| v.operator)
            .collect())
    }

    fn total_bonded_power(&self, ctx: &mut Context<'_>) -> Result<i64> {
        Ok(self
            .validators(ctx)?
            .iter()
            .filter(|v| v.is_active())
            .map(|v| self.power_of(v))
            .fold(0i64, i64::saturating_add))
    }

    fn validator_power(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<i64> {
        let validator = self.validator(ctx, val)?;
        Ok(if validator.is_active() {
            self.power_of(&validator)
        } else {
            0
        })
    }

    fn is_bonded(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<bool> {
        Ok(self.validator(ctx, val)?.status == BondStatus::Bonded)
    }

    fn is_jailed(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<bool> {
        Ok(self.validator(ctx, val)?.jailed)
    }

    fn slash(&self, ctx: &mut Context<'_>, val: &ValAddress, fraction: &Dec) -> Result<()> {
        let mut validator = self.validator(ctx, val)?;
        let burned = Dec::from(validator.tokens)
            .checked_mul_truncate(fraction)?
            .to_u128_truncated()?;
        validator.tokens = validator.tokens.saturating_sub(burned);
        tracing::info!(validator = %val, burned, remaining = validator.tokens, "slashed validator");
        self.set_validator(ctx, &validator)
    }

    fn jail(&self, ctx: &mut Context<'_>, val: &ValAddress) -> Result<()> {
        let mut validator = self.validator(ctx, val)?;
        validator.jailed = true;
        tracing::info!(validator = %val, "jailed validator");
        self.set_validator(ctx, &validator)
    }

    fn power_reduction(&self) -> i64 {
        self.power_reduction
    }
}
