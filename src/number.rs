//! Exact integer numbers.
//!
//! The numeric tower is deliberately small: exact integers only, stored
//! as `i64` and transparently promoted to [`BigInt`] when an operation
//! overflows. Every number also remembers the radix it was written in
//! (`#b`, `#o`, `#d`, `#x` or none) so printing round-trips literals.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::RuntimeError;

/// Numeric payload: machine integer or bignum. `Big` never holds a value
/// that fits `i64`; [`Number::from_bigint`] normalizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Num {
    Int(i64),
    Big(Box<BigInt>),
}

/// An exact integer with a printing base. Base 0 means "no prefix";
/// equality and ordering ignore the base.
#[derive(Debug, Clone)]
pub struct Number {
    pub base: u32,
    value: Num,
}

impl Number {
    pub fn from_i64(v: i64) -> Self {
        Number {
            base: 0,
            value: Num::Int(v),
        }
    }

    /// Wrap a bignum, demoting to `i64` when it fits.
    pub fn from_bigint(v: BigInt) -> Self {
        match v.to_i64() {
            Some(n) => Number::from_i64(n),
            None => Number {
                base: 0,
                value: Num::Big(Box::new(v)),
            },
        }
    }

    pub fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn value(&self) -> &Num {
        &self.value
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Num::Int(n) => Some(*n),
            Num::Big(_) => None,
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        match &self.value {
            Num::Int(n) => BigInt::from(*n),
            Num::Big(b) => (**b).clone(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match &self.value {
            Num::Int(n) => *n == 0,
            Num::Big(b) => b.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match &self.value {
            Num::Int(n) => *n < 0,
            Num::Big(b) => b.is_negative(),
        }
    }

    pub fn is_even(&self) -> bool {
        match &self.value {
            Num::Int(n) => n % 2 == 0,
            Num::Big(b) => (&**b % 2i32).is_zero(),
        }
    }

    pub fn add(&self, o: &Number) -> Number {
        match (&self.value, &o.value) {
            (Num::Int(a), Num::Int(b)) => match a.checked_add(*b) {
                Some(n) => Number::from_i64(n),
                None => Number::from_bigint(BigInt::from(*a) + BigInt::from(*b)),
            },
            _ => Number::from_bigint(self.to_bigint() + o.to_bigint()),
        }
    }

    pub fn sub(&self, o: &Number) -> Number {
        match (&self.value, &o.value) {
            (Num::Int(a), Num::Int(b)) => match a.checked_sub(*b) {
                Some(n) => Number::from_i64(n),
                None => Number::from_bigint(BigInt::from(*a) - BigInt::from(*b)),
            },
            _ => Number::from_bigint(self.to_bigint() - o.to_bigint()),
        }
    }

    pub fn mul(&self, o: &Number) -> Number {
        match (&self.value, &o.value) {
            (Num::Int(a), Num::Int(b)) => match a.checked_mul(*b) {
                Some(n) => Number::from_i64(n),
                None => Number::from_bigint(BigInt::from(*a) * BigInt::from(*b)),
            },
            _ => Number::from_bigint(self.to_bigint() * o.to_bigint()),
        }
    }

    pub fn neg(&self) -> Number {
        match &self.value {
            Num::Int(n) => match n.checked_neg() {
                Some(v) => Number::from_i64(v),
                None => Number::from_bigint(-BigInt::from(*n)),
            },
            Num::Big(b) => Number::from_bigint(-(**b).clone()),
        }
    }

    pub fn abs(&self) -> Number {
        if self.is_negative() { self.neg() } else { self.clone() }
    }

    /// Truncating division. Fails on a zero divisor.
    pub fn quotient(&self, o: &Number) -> Result<Number, RuntimeError> {
        if o.is_zero() {
            return Err(RuntimeError::domain_error("quotient: division by zero"));
        }
        Ok(match (&self.value, &o.value) {
            (Num::Int(a), Num::Int(b)) => match a.checked_div(*b) {
                Some(n) => Number::from_i64(n),
                // i64::MIN / -1
                None => Number::from_bigint(BigInt::from(*a) / BigInt::from(*b)),
            },
            _ => Number::from_bigint(self.to_bigint() / o.to_bigint()),
        })
    }

    /// Remainder of truncating division; the sign follows the dividend.
    pub fn remainder(&self, o: &Number) -> Result<Number, RuntimeError> {
        if o.is_zero() {
            return Err(RuntimeError::domain_error("remainder: division by zero"));
        }
        Ok(match (&self.value, &o.value) {
            (Num::Int(a), Num::Int(b)) => match a.checked_rem(*b) {
                Some(n) => Number::from_i64(n),
                None => Number::from_i64(0),
            },
            _ => Number::from_bigint(self.to_bigint() % o.to_bigint()),
        })
    }

    /// Modulo; the sign follows the divisor.
    pub fn modulo(&self, o: &Number) -> Result<Number, RuntimeError> {
        if o.is_zero() {
            return Err(RuntimeError::domain_error("modulo: division by zero"));
        }
        let r = self.remainder(o)?;
        if r.is_zero() || r.is_negative() == o.is_negative() {
            Ok(r)
        } else {
            Ok(r.add(o))
        }
    }

    pub fn pow(&self, exp: u32) -> Number {
        match &self.value {
            Num::Int(n) => match n.checked_pow(exp) {
                Some(v) => Number::from_i64(v),
                None => Number::from_bigint(BigInt::from(*n).pow(exp)),
            },
            Num::Big(b) => Number::from_bigint((**b).clone().pow(exp)),
        }
    }

    /// Render in the given radix without a prefix.
    pub fn to_radix_string(&self, radix: u32) -> String {
        match &self.value {
            Num::Int(n) => format_i64_radix(*n, radix),
            Num::Big(b) => b.to_str_radix(radix),
        }
    }
}

fn format_i64_radix(n: i64, radix: u32) -> String {
    match radix {
        2 => format_signed(n, |m| format!("{m:b}")),
        8 => format_signed(n, |m| format!("{m:o}")),
        16 => format_signed(n, |m| format!("{m:x}")),
        _ => format!("{n}"),
    }
}

fn format_signed(n: i64, digits: impl Fn(u64) -> String) -> String {
    let mag = digits(n.unsigned_abs());
    if n < 0 { format!("-{mag}") } else { mag }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        // Num is normalized, so variant plus payload comparison suffices.
        self.value == other.value
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.value, &other.value) {
            (Num::Int(a), Num::Int(b)) => a.cmp(b),
            _ => self.to_bigint().cmp(&other.to_bigint()),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::from_i64(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            2 => write!(f, "#b{}", self.to_radix_string(2)),
            8 => write!(f, "#o{}", self.to_radix_string(8)),
            10 => write!(f, "#d{}", self.to_radix_string(10)),
            16 => write!(f, "#x{}", self.to_radix_string(16)),
            _ => write!(f, "{}", self.to_radix_string(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Number {
        Number::from_i64(v)
    }

    #[test]
    fn test_promotion_on_overflow() {
        let cases = vec![
            (int(i64::MAX).add(&int(1)), "9223372036854775808"),
            (int(i64::MIN).sub(&int(1)), "-9223372036854775809"),
            (int(i64::MIN).neg(), "9223372036854775808"),
            (int(i64::MAX).mul(&int(2)), "18446744073709551614"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_radix_string(10), expected);
            assert!(value.as_i64().is_none(), "expected bignum for {expected}");
        }
    }

    #[test]
    fn test_bigint_demotes_when_small() {
        let n = Number::from_bigint(BigInt::from(42));
        assert_eq!(n.as_i64(), Some(42));
        // Round trip through a promoting and de-promoting operation.
        let big = int(i64::MAX).add(&int(1));
        let back = big.sub(&int(1));
        assert_eq!(back.as_i64(), Some(i64::MAX));
    }

    #[test]
    fn test_equality_normalizes_representations() {
        let a = int(7);
        let b = Number::from_bigint(BigInt::from(7));
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(int(1).quotient(&int(0)).is_err());
        assert!(int(1).remainder(&int(0)).is_err());
        assert!(int(1).modulo(&int(0)).is_err());
    }

    #[test]
    fn test_quotient_remainder_modulo_signs() {
        let cases = vec![
            (7, 3, 2, 1, 1),
            (-7, 3, -2, -1, 2),
            (7, -3, -2, 1, -2),
            (-7, -3, 2, -1, -1),
        ];
        for (a, b, q, r, m) in cases {
            assert_eq!(int(a).quotient(&int(b)).unwrap(), int(q), "{a} quo {b}");
            assert_eq!(int(a).remainder(&int(b)).unwrap(), int(r), "{a} rem {b}");
            assert_eq!(int(a).modulo(&int(b)).unwrap(), int(m), "{a} mod {b}");
        }
    }

    #[test]
    fn test_radix_printing() {
        assert_eq!(int(255).with_base(16).to_string(), "#xff");
        assert_eq!(int(-5).with_base(2).to_string(), "#b-101");
        assert_eq!(int(8).with_base(8).to_string(), "#o10");
        assert_eq!(int(42).with_base(10).to_string(), "#d42");
        assert_eq!(int(42).to_string(), "42");
    }
}
