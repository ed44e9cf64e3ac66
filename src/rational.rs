//! # Exact rational arithmetic
//!
//! Backs every time and duration value in the compiler (`spec.md` §3.1, §4.A).
//! `Rat` always carries a positive, reduced denominator; construction and every
//! arithmetic operation reduce via `num_rational::Ratio`'s gcd-based
//! normalization.
//!
//! ## Magnitude
//! Numerator and denominator are `i64`. This is not wide-integer arithmetic:
//! scores built from ordinary bar/beat/tuplet combinations stay many orders of
//! magnitude below `i64::MAX`, and overflow across a chain of additions will
//! panic in debug builds (arithmetic overflow checks) rather than silently
//! wrap, per §4.A's "explicitly document supported magnitude" requirement.

use num_rational::Ratio;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// An exact, always-reduced rational number with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rat(Ratio<i64>);

/// Wire representation used by `serde` — `{n: int, d: int}` per `spec.md` §6.3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatDto {
    pub n: i64,
    pub d: i64,
}

impl Rat {
    pub const ZERO: Rat = Rat(Ratio::new_raw(0, 1));
    pub const ONE: Rat = Rat(Ratio::new_raw(1, 1));

    /// Construct a reduced rational. Fails iff `d == 0`.
    pub fn make(n: i64, d: i64) -> Result<Rat, RatError> {
        if d == 0 {
            return Err(RatError::ZeroDenominator);
        }
        Ok(Rat(Ratio::new(n, d)))
    }

    pub fn from_int(n: i64) -> Rat {
        Rat(Ratio::from_integer(n))
    }

    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        self.numer() == 0
    }

    pub fn is_negative(&self) -> bool {
        self.numer() < 0
    }

    pub fn add(self, other: Rat) -> Rat {
        Rat(self.0 + other.0)
    }

    pub fn sub(self, other: Rat) -> Rat {
        Rat(self.0 - other.0)
    }

    pub fn mul(self, other: Rat) -> Rat {
        Rat(self.0 * other.0)
    }

    /// Exact division. Fails iff `other` is zero.
    pub fn div(self, other: Rat) -> Result<Rat, RatError> {
        if other.is_zero() {
            return Err(RatError::DivisionByZero);
        }
        Ok(Rat(self.0 / other.0))
    }

    pub fn compare(&self, other: &Rat) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// Lossy conversion, for diagnostics and rendering only (§4.A).
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    pub fn to_dto(&self) -> RatDto {
        RatDto {
            n: self.numer(),
            d: self.denom(),
        }
    }
}

impl Add for Rat {
    type Output = Rat;
    fn add(self, rhs: Rat) -> Rat {
        Rat::add(self, rhs)
    }
}

impl Sub for Rat {
    type Output = Rat;
    fn sub(self, rhs: Rat) -> Rat {
        Rat::sub(self, rhs)
    }
}

impl Mul for Rat {
    type Output = Rat;
    fn mul(self, rhs: Rat) -> Rat {
        Rat::mul(self, rhs)
    }
}

impl Div for Rat {
    type Output = Rat;
    /// Panics on division by zero; prefer [`Rat::div`] when the divisor is
    /// not known to be non-zero ahead of time.
    fn div(self, rhs: Rat) -> Rat {
        Rat::div(self, rhs).expect("division by zero")
    }
}

impl Neg for Rat {
    type Output = Rat;
    fn neg(self) -> Rat {
        Rat(-self.0)
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer(), self.denom())
    }
}

impl Serialize for Rat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_dto().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dto = RatDto::deserialize(deserializer)?;
        Rat::make(dto.n, dto.d).map_err(serde::de::Error::custom)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatError {
    #[error("rational with zero denominator")]
    ZeroDenominator,
    #[error("division by zero rational")]
    DivisionByZero,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_on_construction() {
        let r = Rat::make(2, 4).unwrap();
        assert_eq!(r.numer(), 1);
        assert_eq!(r.denom(), 2);
    }

    #[test]
    fn zero_denominator_rejected() {
        assert_eq!(Rat::make(1, 0), Err(RatError::ZeroDenominator));
    }

    #[test]
    fn negative_denominator_normalizes_sign() {
        let r = Rat::make(1, -2).unwrap();
        assert_eq!(r.numer(), -1);
        assert_eq!(r.denom(), 2);
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Rat::make(1, 3).unwrap();
        let b = Rat::make(1, 6).unwrap();
        assert_eq!(a.add(b), Rat::make(1, 2).unwrap());
        assert_eq!(a.mul(b), Rat::make(1, 18).unwrap());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let a = Rat::from_int(1);
        assert_eq!(a.div(Rat::ZERO), Err(RatError::DivisionByZero));
    }

    #[test]
    fn compare_orders_by_value_not_representation() {
        let a = Rat::make(1, 2).unwrap();
        let b = Rat::make(2, 4).unwrap();
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn to_dto_round_trips_through_json() {
        let r = Rat::make(3, 4).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"n":3,"d":4}"#);
        let back: Rat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
