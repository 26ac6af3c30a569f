//! # Virtual AMM
//!
//! Constant-product market between a base and a quote reserve. Quote assets
//! enter the pool divided by the price multiplier `M`, so the mark price is
//! `quote / base * M`.
//!
//! | Swap | LONG | SHORT |
//! |------|------|-------|
//! | `swap_quote_asset(q)` | quote += q / M, base -= Δb | quote -= q / M, base += Δb |
//! | `swap_base_asset(b)` | base -= b, quote += Δq | base += b, quote -= Δq |
//!
//! Every swap adds the base amount moved to `total_long` or `total_short`;
//! their difference is the bias the pool would have to unwind at close.

use crate::error::{PerpError, Result};
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use tessera_core::{AssetPair, Dec, DecError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amm {
    pub pair: AssetPair,
    pub version: u64,
    pub base_reserve: Dec,
    pub quote_reserve: Dec,
    /// `sqrt(base_reserve * quote_reserve)`
    pub sqrt_depth: Dec,
    pub price_multiplier: Dec,
    pub total_long: Dec,
    pub total_short: Dec,
    /// Set when the market closes
    pub settlement_price: Dec,
}

impl Amm {
    /// A balanced pool with both reserves equal to `sqrt_depth`
    pub fn new(pair: AssetPair, version: u64, sqrt_depth: Dec, price_multiplier: Dec) -> Result<Self> {
        let amm = Self {
            pair,
            version,
            base_reserve: sqrt_depth.clone(),
            quote_reserve: sqrt_depth.clone(),
            sqrt_depth,
            price_multiplier,
            total_long: Dec::zero(),
            total_short: Dec::zero(),
            settlement_price: Dec::zero(),
        };
        amm.validate()?;
        Ok(amm)
    }

    pub fn mark_price(&self) -> Dec {
        if self.base_reserve.is_zero() || self.quote_reserve.is_zero() {
            return Dec::zero();
        }
        &self.quote_reserve / &self.base_reserve * &self.price_multiplier
    }

    /// `total_long - total_short`
    pub fn bias(&self) -> Dec {
        &self.total_long - &self.total_short
    }

    pub fn quote_asset_to_reserve(&self, asset: &Dec) -> Result<Dec> {
        Ok(asset.checked_quo(&self.price_multiplier)?)
    }

    pub fn quote_reserve_to_asset(&self, reserve: &Dec) -> Result<Dec> {
        Ok(reserve.checked_mul(&self.price_multiplier)?)
    }

    fn invariant(&self) -> Result<Dec> {
        self.base_reserve
            .checked_mul(&self.quote_reserve)
            .map_err(overflow_to_depth)
    }

    /// Base reserve moved when `quote_reserve_amt` enters (LONG) or leaves (SHORT)
    pub fn base_reserve_delta(&self, quote_reserve_amt: &Dec, dir: Direction) -> Result<Dec> {
        if quote_reserve_amt.is_negative() {
            return Err(PerpError::InputQuoteAmountNotPositive);
        }
        if quote_reserve_amt.is_zero() {
            return Ok(Dec::zero());
        }
        let k = self.invariant()?;
        let quote_after = match dir {
            Direction::Long => self.quote_reserve.checked_add(quote_reserve_amt)?,
            Direction::Short => self.quote_reserve.checked_sub(quote_reserve_amt)?,
        };
        if !quote_after.is_positive() {
            return Err(PerpError::QuoteReserveAtZero);
        }
        let base_after = k.checked_quo(&quote_after)?;
        Ok(base_after.checked_sub(&self.base_reserve)?.abs())
    }

    /// Quote reserve moved when `base_amt` leaves (LONG) or enters (SHORT)
    pub fn quote_reserve_delta(&self, base_amt: &Dec, dir: Direction) -> Result<Dec> {
        if base_amt.is_negative() {
            return Err(PerpError::InputBaseAmountNegative);
        }
        if base_amt.is_zero() {
            return Ok(Dec::zero());
        }
        let k = self.invariant()?;
        let base_after = match dir {
            Direction::Long => self.base_reserve.checked_sub(base_amt)?,
            Direction::Short => self.base_reserve.checked_add(base_amt)?,
        };
        if !base_after.is_positive() {
            return Err(PerpError::BaseReserveAtZero);
        }
        let quote_after = k.checked_quo(&base_after)?;
        Ok(quote_after.checked_sub(&self.quote_reserve)?.abs())
    }

    /// Swap quote assets for base; returns the base amount moved
    pub fn swap_quote_asset(&mut self, quote_asset: &Dec, dir: Direction) -> Result<Dec> {
        if quote_asset.is_zero() {
            return Ok(Dec::zero());
        }
        let quote_reserve_amt = self.quote_asset_to_reserve(quote_asset)?;
        let base_delta = self.base_reserve_delta(&quote_reserve_amt, dir)?;
        match dir {
            Direction::Long => {
                self.quote_reserve = self.quote_reserve.checked_add(&quote_reserve_amt)?;
                self.base_reserve = self.base_reserve.checked_sub(&base_delta)?;
                self.total_long = self.total_long.checked_add(&base_delta)?;
            }
            Direction::Short => {
                self.quote_reserve = self.quote_reserve.checked_sub(&quote_reserve_amt)?;
                self.base_reserve = self.base_reserve.checked_add(&base_delta)?;
                self.total_short = self.total_short.checked_add(&base_delta)?;
            }
        }
        Ok(base_delta)
    }

    /// Swap base for quote assets; returns the quote asset amount moved
    pub fn swap_base_asset(&mut self, base_amt: &Dec, dir: Direction) -> Result<Dec> {
        if base_amt.is_zero() {
            return Ok(Dec::zero());
        }
        let quote_delta = self.quote_reserve_delta(base_amt, dir)?;
        match dir {
            Direction::Long => {
                self.quote_reserve = self.quote_reserve.checked_add(&quote_delta)?;
                self.base_reserve = self.base_reserve.checked_sub(base_amt)?;
                self.total_long = self.total_long.checked_add(base_amt)?;
            }
            Direction::Short => {
                self.quote_reserve = self.quote_reserve.checked_sub(&quote_delta)?;
                self.base_reserve = self.base_reserve.checked_add(base_amt)?;
                self.total_short = self.total_short.checked_add(base_amt)?;
            }
        }
        self.quote_reserve_to_asset(&quote_delta)
    }

    /// Price at which the whole bias unwinds; the mark price when there is none
    pub fn settlement_price(&self) -> Result<Dec> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(self.mark_price());
        }
        let mut pool = self.clone();
        let quote = pool.swap_base_asset(&bias.abs(), Direction::closing(&bias))?;
        Ok(quote.abs().checked_quo(&bias.abs())?)
    }

    /// Quote reserve paid to unwind the bias
    fn bias_in_quote_reserve(&self) -> Result<Dec> {
        let bias = self.bias();
        self.quote_reserve_delta(&bias.abs(), Direction::closing(&bias))
    }

    /// Cost to the ecosystem fund of moving the peg to `new_multiplier`
    ///
    /// Positive means the fund pays the vault. Rounded up to an integer.
    pub fn repeg_cost(&self, new_multiplier: &Dec) -> Result<Dec> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Dec::zero());
        }
        let diff = new_multiplier.checked_sub(&self.price_multiplier)?;
        let mut cost = self.bias_in_quote_reserve()?.checked_mul(&diff)?;
        if bias.is_negative() {
            cost = -cost;
        }
        Ok(cost.ceil())
    }

    /// Signed quote value of the bias at the current reserves
    pub fn market_value(&self) -> Result<Dec> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Dec::zero());
        }
        let mut value = self.bias_in_quote_reserve()?;
        if bias.is_negative() {
            value = -value;
        }
        self.quote_reserve_to_asset(&value)
    }

    /// Cost to the ecosystem fund of rescaling the invariant to `new_invariant`
    pub fn swap_invariant_cost(&self, new_invariant: &Dec) -> Result<Dec> {
        let before = self.market_value()?;
        let mut pool = self.clone();
        pool.update_swap_invariant(new_invariant)?;
        let after = pool.market_value()?;
        Ok(after.checked_sub(&before)?.ceil())
    }

    /// Rescale both reserves by `sqrt(new_invariant) / sqrt_depth`; the price is kept
    pub fn update_swap_invariant(&mut self, new_invariant: &Dec) -> Result<()> {
        if !new_invariant.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "swap invariant must be positive, got {new_invariant}"
            )));
        }
        let new_depth = new_invariant.sqrt()?;
        let scale = new_depth.checked_quo(&self.sqrt_depth)?;
        self.base_reserve = self.base_reserve.checked_mul(&scale)?;
        self.quote_reserve = self.quote_reserve.checked_mul(&scale)?;
        self.sqrt_depth = new_depth;
        Ok(())
    }

    /// `sqrt(base * quote)`
    pub fn compute_sqrt_depth(&self) -> Result<Dec> {
        Ok(self.invariant()?.sqrt()?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_reserve.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "base reserve must be positive, got {}",
                self.base_reserve
            )));
        }
        if !self.quote_reserve.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "quote reserve must be positive, got {}",
                self.quote_reserve
            )));
        }
        if !self.price_multiplier.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "price multiplier must be positive, got {}",
                self.price_multiplier
            )));
        }
        if !self.sqrt_depth.is_positive() {
            return Err(PerpError::InvalidAmm(format!(
                "sqrt depth must be positive, got {}",
                self.sqrt_depth
            )));
        }
        let computed = self.compute_sqrt_depth()?;
        if computed.checked_sub(&self.sqrt_depth)?.abs() > Dec::one() {
            return Err(PerpError::InvalidAmm(format!(
                "sqrt depth {} does not match reserves ({computed})",
                self.sqrt_depth
            )));
        }
        Ok(())
    }
}

fn overflow_to_depth(err: DecError) -> PerpError {
    match err {
        DecError::Overflow(_) => PerpError::LiquidityDepthOverflow,
        other => PerpError::Dec(other),
    }
}
