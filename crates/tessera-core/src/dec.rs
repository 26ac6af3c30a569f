//! # Fixed-point decimal
//!
//! Signed decimal with 18 fractional digits backed by an arbitrary precision
//! integer holding `value * 10^18`. Results wider than [`MAX_BIT_LEN`] bits
//! are rejected.
//!
//! | Operation | Rounding |
//! |-----------|----------|
//! | `+`, `-` | exact |
//! | `*`, `/` | half away from zero at the 18th digit |
//! | `mul_truncate`, `quo_truncate` | toward zero |
//! | `sqrt` | floor |
//!
//! Operators panic on overflow and division by zero; the `checked_*` forms
//! return [`DecError`].

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::sync::OnceLock;
use tessera_store::key::take_bytes;
use tessera_store::{KeyCodec, StoreError};
use thiserror::Error;

/// Number of fractional digits
pub const PRECISION: u32 = 18;

/// Maximum bit length of the raw integer (256 integer bits plus the fraction)
pub const MAX_BIT_LEN: u64 = 316;

const PRECISION_MULTIPLIER: u64 = 1_000_000_000_000_000_000;

fn one_raw() -> &'static BigInt {
    static ONE: OnceLock<BigInt> = OnceLock::new();
    ONE.get_or_init(|| BigInt::from(PRECISION_MULTIPLIER))
}

/// Decimal arithmetic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("decimal out of range: {0} bits")]
    Overflow(u64),

    #[error("square root of negative decimal {0}")]
    NegativeSqrt(String),

    #[error("invalid decimal {input:?}: {reason}")]
    Parse { input: String, reason: String },
}

/// Signed fixed-point decimal with 18 fractional digits
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(BigInt);

/// Integer division rounding half away from zero
fn div_round(num: &BigInt, den: &BigInt) -> BigInt {
    let (q, r) = num.div_rem(den);
    if r.abs() * BigInt::from(2) >= den.abs() {
        if (num.sign() == Sign::Minus) != (den.sign() == Sign::Minus) {
            q - 1
        } else {
            q + 1
        }
    } else {
        q
    }
}

impl Dec {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn one() -> Self {
        Self(one_raw().clone())
    }

    /// Wrap a raw `value * 10^18` integer
    pub fn from_raw(raw: BigInt) -> Result<Self, DecError> {
        Self::bounded(raw)
    }

    pub fn raw(&self) -> &BigInt {
        &self.0
    }

    /// `value * 10^-prec`, e.g. `with_prec(5, 3) == 0.005`
    pub fn with_prec(value: i64, prec: u32) -> Self {
        let prec = prec.min(PRECISION);
        let scale = BigInt::from(10u64.pow(PRECISION - prec));
        Self(BigInt::from(value) * scale)
    }

    /// `value / 100`
    pub fn percent(value: i64) -> Self {
        Self::with_prec(value, 2)
    }

    fn bounded(raw: BigInt) -> Result<Self, DecError> {
        let bits = raw.bits();
        if bits > MAX_BIT_LEN {
            return Err(DecError::Overflow(bits));
        }
        Ok(Self(raw))
    }

    /// Bit length of the raw integer
    pub fn bit_len(&self) -> u64 {
        self.0.bits()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(&self, other: &Dec) -> Result<Dec, DecError> {
        Self::bounded(&self.0 + &other.0)
    }

    pub fn checked_sub(&self, other: &Dec) -> Result<Dec, DecError> {
        Self::bounded(&self.0 - &other.0)
    }

    pub fn checked_mul(&self, other: &Dec) -> Result<Dec, DecError> {
        Self::bounded(div_round(&(&self.0 * &other.0), one_raw()))
    }

    pub fn checked_mul_truncate(&self, other: &Dec) -> Result<Dec, DecError> {
        Self::bounded((&self.0 * &other.0) / one_raw())
    }

    pub fn checked_quo(&self, other: &Dec) -> Result<Dec, DecError> {
        if other.is_zero() {
            return Err(DecError::DivisionByZero);
        }
        Self::bounded(div_round(&(&self.0 * one_raw()), &other.0))
    }

    pub fn checked_quo_truncate(&self, other: &Dec) -> Result<Dec, DecError> {
        if other.is_zero() {
            return Err(DecError::DivisionByZero);
        }
        Self::bounded((&self.0 * one_raw()) / &other.0)
    }

    pub fn mul_truncate(&self, other: &Dec) -> Dec {
        expect_dec(self.checked_mul_truncate(other))
    }

    pub fn quo_truncate(&self, other: &Dec) -> Dec {
        expect_dec(self.checked_quo_truncate(other))
    }

    /// Floor of the exact square root, to 18 digits
    pub fn sqrt(&self) -> Result<Dec, DecError> {
        if self.is_negative() {
            return Err(DecError::NegativeSqrt(self.to_string()));
        }
        Ok(Self((&self.0 * one_raw()).sqrt()))
    }

    /// Largest integer not above the value
    pub fn floor(&self) -> Dec {
        Self(self.0.div_floor(one_raw()) * one_raw())
    }

    /// Smallest integer not below the value
    pub fn ceil(&self) -> Dec {
        Self(-((-&self.0).div_floor(one_raw())) * one_raw())
    }

    /// Integer part, toward zero
    pub fn truncate(&self) -> Dec {
        Self((&self.0 / one_raw()) * one_raw())
    }

    /// Nearest integer, half away from zero
    pub fn round(&self) -> Dec {
        Self(div_round(&self.0, one_raw()) * one_raw())
    }

    /// Integer part as an arbitrary precision integer
    pub fn truncate_int(&self) -> BigInt {
        &self.0 / one_raw()
    }

    pub fn to_u128_truncated(&self) -> Result<u128, DecError> {
        self.truncate_int()
            .to_u128()
            .ok_or_else(|| DecError::Overflow(self.bit_len()))
    }

    pub fn to_i64_rounded(&self) -> Result<i64, DecError> {
        div_round(&self.0, one_raw())
            .to_i64()
            .ok_or_else(|| DecError::Overflow(self.bit_len()))
    }
}

fn expect_dec(result: Result<Dec, DecError>) -> Dec {
    match result {
        Ok(d) => d,
        Err(e) => panic!("decimal arithmetic: {e}"),
    }
}

impl From<i64> for Dec {
    fn from(value: i64) -> Self {
        Self(BigInt::from(value) * one_raw())
    }
}

impl From<u64> for Dec {
    fn from(value: u64) -> Self {
        Self(BigInt::from(value) * one_raw())
    }
}

impl From<u128> for Dec {
    fn from(value: u128) -> Self {
        Self(BigInt::from(value) * one_raw())
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (int, frac) = self.0.abs().div_rem(one_raw());
        if self.is_negative() {
            f.write_str("-")?;
        }
        write!(f, "{int}")?;
        if !frac.is_zero() {
            let digits = format!("{:0>18}", frac.to_string());
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({self})")
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| DecError::Parse {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (body, None),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail("expected digits before the decimal point"));
        }
        let mut raw = BigInt::from_str(int_part).map_err(|e| fail(&e.to_string()))? * one_raw();
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(fail("expected digits after the decimal point"));
            }
            if frac.len() > PRECISION as usize {
                return Err(fail("more than 18 fractional digits"));
            }
            let padded = format!("{frac:0<18}");
            raw += BigInt::from_str(&padded).map_err(|e| fail(&e.to_string()))?;
        }
        if negative {
            raw = -raw;
        }
        Self::bounded(raw)
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dec::from_str(&s).map_err(de::Error::custom)
    }
}

// Sign byte, then a length byte and big-endian magnitude. Negative values
// complement both so larger magnitudes sort first.
impl KeyCodec for Dec {
    fn encode_key(&self, out: &mut Vec<u8>) {
        let (sign, magnitude) = self.0.to_bytes_be();
        match sign {
            Sign::NoSign => out.push(1),
            Sign::Plus => {
                out.push(2);
                out.push(magnitude.len() as u8);
                out.extend_from_slice(&magnitude);
            }
            Sign::Minus => {
                out.push(0);
                out.push(!(magnitude.len() as u8));
                out.extend(magnitude.iter().map(|b| !b));
            }
        }
    }

    fn decode_key(input: &mut &[u8]) -> tessera_store::Result<Self> {
        let sign = take_bytes(input, 1)?[0];
        match sign {
            1 => Ok(Dec::zero()),
            2 => {
                let len = take_bytes(input, 1)?[0] as usize;
                let bytes = take_bytes(input, len)?;
                Ok(Dec(BigInt::from_bytes_be(Sign::Plus, bytes)))
            }
            0 => {
                let len = !take_bytes(input, 1)?[0] as usize;
                let bytes: Vec<u8> = take_bytes(input, len)?.iter().map(|b| !b).collect();
                Ok(Dec(BigInt::from_bytes_be(Sign::Minus, &bytes)))
            }
            other => Err(StoreError::InvalidKey(format!("bad decimal sign byte {other}"))),
        }
    }
}

macro_rules! impl_dec_op {
    ($trait:ident, $method:ident, $checked:ident) => {
        impl $trait<Dec> for Dec {
            type Output = Dec;
            fn $method(self, rhs: Dec) -> Dec {
                expect_dec(self.$checked(&rhs))
            }
        }

        impl<'a> $trait<&'a Dec> for Dec {
            type Output = Dec;
            fn $method(self, rhs: &'a Dec) -> Dec {
                expect_dec(self.$checked(rhs))
            }
        }

        impl<'a> $trait<Dec> for &'a Dec {
            type Output = Dec;
            fn $method(self, rhs: Dec) -> Dec {
                expect_dec(self.$checked(&rhs))
            }
        }

        impl<'a, 'b> $trait<&'b Dec> for &'a Dec {
            type Output = Dec;
            fn $method(self, rhs: &'b Dec) -> Dec {
                expect_dec(self.$checked(rhs))
            }
        }
    };
}

impl_dec_op!(Add, add, checked_add);
impl_dec_op!(Sub, sub, checked_sub);
impl_dec_op!(Mul, mul, checked_mul);
impl_dec_op!(Div, div, checked_quo);

impl AddAssign<&Dec> for Dec {
    fn add_assign(&mut self, rhs: &Dec) {
        *self = &*self + rhs;
    }
}

impl AddAssign<Dec> for Dec {
    fn add_assign(&mut self, rhs: Dec) {
        *self = &*self + &rhs;
    }
}

impl SubAssign<&Dec> for Dec {
    fn sub_assign(&mut self, rhs: &Dec) {
        *self = &*self - rhs;
    }
}

impl SubAssign<Dec> for Dec {
    fn sub_assign(&mut self, rhs: Dec) {
        *self = &*self - &rhs;
    }
}

impl Neg for Dec {
    type Output = Dec;
    fn neg(self) -> Dec {
        Dec(-self.0)
    }
}

impl Neg for &Dec {
    type Output = Dec;
    fn neg(self) -> Dec {
        Dec(-&self.0)
    }
}

impl Sum for Dec {
    fn sum<I: Iterator<Item = Dec>>(iter: I) -> Dec {
        iter.fold(Dec::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Dec> for Dec {
    fn sum<I: Iterator<Item = &'a Dec>>(iter: I) -> Dec {
        iter.fold(Dec::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Dec {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_shortest_form() {
        assert_eq!(d("1020").to_string(), "1020");
        assert_eq!(d("1.500").to_string(), "1.5");
        assert_eq!(d("-0.000000000000000001").to_string(), "-0.000000000000000001");
        assert_eq!(Dec::zero().to_string(), "0");
        assert_eq!(d("-0").to_string(), "0");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<Dec>().is_err());
        assert!("1.".parse::<Dec>().is_err());
        assert!(".5".parse::<Dec>().is_err());
        assert!("1.0000000000000000001".parse::<Dec>().is_err());
        assert!("1e5".parse::<Dec>().is_err());
        assert_eq!(d(" 42.1 "), d("42.1"));
    }

    #[test]
    fn test_mul_quo_rounding() {
        assert_eq!(d("1") / d("3"), d("0.333333333333333333"));
        assert_eq!(d("2") / d("3"), d("0.666666666666666667"));
        assert_eq!(d("2").quo_truncate(&d("3")), d("0.666666666666666666"));
        assert_eq!(d("-2") / d("3"), d("-0.666666666666666667"));
        assert_eq!(
            d("0.000000000000000005") * d("0.1"),
            d("0.000000000000000001")
        );
        assert_eq!(
            d("0.000000000000000005").mul_truncate(&d("0.1")),
            Dec::zero()
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(d("1").checked_quo(&Dec::zero()), Err(DecError::DivisionByZero));
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn test_division_operator_panics_on_zero() {
        let _ = d("1") / Dec::zero();
    }

    #[test]
    fn test_rounding_to_integers() {
        assert_eq!(d("998.00399").ceil(), d("999"));
        assert_eq!(d("-1.5").ceil(), d("-1"));
        assert_eq!(d("-1.5").floor(), d("-2"));
        assert_eq!(d("-1.5").truncate(), d("-1"));
        assert_eq!(d("2.5").round(), d("3"));
        assert_eq!(d("-2.5").round(), d("-3"));
        assert_eq!(d("5").ceil(), d("5"));
        assert_eq!(d("50.4").to_i64_rounded().unwrap(), 50);
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(d("1000000000000").sqrt().unwrap(), d("1000000"));
        assert_eq!(d("2").sqrt().unwrap(), d("1.414213562373095048"));
        assert!(d("-1").sqrt().is_err());
    }

    #[test]
    fn test_overflow_bound() {
        let big = Dec::from(u128::MAX);
        assert!(big.checked_mul(&big).is_ok());
        let huge = big.checked_mul(&big).unwrap();
        assert!(matches!(huge.checked_mul(&big), Err(DecError::Overflow(_))));
    }

    #[test]
    fn test_with_prec() {
        assert_eq!(Dec::with_prec(5, 3), d("0.005"));
        assert_eq!(Dec::percent(2), d("0.02"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&d("1.25")).unwrap();
        assert_eq!(json, "\"1.25\"");
        let bin = bincode::serialize(&d("-7.5")).unwrap();
        assert_eq!(bincode::deserialize::<Dec>(&bin).unwrap(), d("-7.5"));
    }

    #[test]
    fn test_key_order() {
        let values = ["-100", "-1.5", "-1", "0", "0.5", "1", "255", "256", "1000000"];
        let keys: Vec<Vec<u8>> = values.iter().map(|v| d(v).to_key_bytes()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        for v in values {
            assert_eq!(Dec::from_key_bytes(&d(v).to_key_bytes()).unwrap(), d(v));
        }
    }

    proptest! {
        #[test]
        fn prop_display_parse_round_trip(raw in any::<i128>()) {
            let dec = Dec::from_raw(BigInt::from(raw)).unwrap();
            prop_assert_eq!(dec.to_string().parse::<Dec>().unwrap(), dec);
        }

        #[test]
        fn prop_add_sub_inverse(a in any::<i64>(), b in any::<i64>()) {
            let (a, b) = (Dec::with_prec(a, 6), Dec::with_prec(b, 6));
            prop_assert_eq!(&(&a + &b) - &b, a);
        }

        #[test]
        fn prop_key_order_matches_value(a in any::<i64>(), b in any::<i64>()) {
            let (a, b) = (Dec::with_prec(a, 9), Dec::with_prec(b, 9));
            prop_assert_eq!(a.cmp(&b), a.to_key_bytes().cmp(&b.to_key_bytes()));
        }

        #[test]
        fn prop_sqrt_is_floor(n in 0u64..1_000_000_000) {
            let root = Dec::from(n).sqrt().unwrap();
            prop_assert!((&root * &root - Dec::from(n)).abs() <= Dec::with_prec(1, 6));
        }
    }
}
