//! Currency amount type with fixed-point precision.
//!
//! Prices, budgets, escrow holds and ledger entries all use [`Amount`], which
//! stores 9 decimal places as an integer count of nano-units. Budget arithmetic
//! is therefore exact: `5.0 - 0.15` is exactly `4.85`.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// Number of decimal places carried by an [`Amount`].
pub const DECIMALS: u32 = 9;

/// One whole currency unit in nano-units.
pub const NANO_PER_UNIT: u64 = 1_000_000_000;

/// A non-negative currency amount with 9 decimals of precision.
///
/// Serialized as a decimal string (`"4.85"`) so that JSON round-trips never
/// pass through a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    /// Zero amount constant.
    pub const ZERO: Self = Self(0);

    /// Maximum representable amount.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an amount from nano-units.
    #[must_use]
    pub const fn from_nano(nano: u64) -> Self {
        Self(nano)
    }

    /// Creates an amount from whole units. Saturates on overflow.
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(NANO_PER_UNIT))
    }

    /// Creates an amount from a float, rounding to the nearest nano-unit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAmount`] for negative, non-finite, or
    /// out-of-range values.
    pub fn from_f64(value: f64) -> Result<Self, CoreError> {
        if !value.is_finite() {
            return Err(CoreError::InvalidAmount(format!("not a finite number: {value}")));
        }
        if value < 0.0 {
            return Err(CoreError::InvalidAmount("negative values not allowed".into()));
        }
        let nano = (value * NANO_PER_UNIT as f64).round();
        if nano >= u64::MAX as f64 {
            return Err(CoreError::InvalidAmount("overflow".into()));
        }
        Ok(Self(nano as u64))
    }

    /// Returns the amount in nano-units.
    #[must_use]
    pub const fn as_nano(self) -> u64 {
        self.0
    }

    /// Returns the amount in whole units (truncates the fractional part).
    #[must_use]
    pub const fn as_units(self) -> u64 {
        self.0 / NANO_PER_UNIT
    }

    /// Returns the amount as a float, for scoring and reporting only.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / NANO_PER_UNIT as f64
    }

    /// Checked addition. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Returns true if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / NANO_PER_UNIT;
        let frac = self.0 % NANO_PER_UNIT;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let frac_str = format!("{frac:09}");
            write!(f, "{whole}.{}", frac_str.trim_end_matches('0'))
        }
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(CoreError::InvalidAmount("negative values not allowed".into()));
        }

        let (whole_str, frac_str) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(CoreError::InvalidAmount(format!("invalid number: {s:?}")));
        }

        let whole: u64 = if whole_str.is_empty() {
            0
        } else {
            whole_str
                .parse()
                .map_err(|_| CoreError::InvalidAmount(format!("invalid whole part: {s}")))?
        };

        if frac_str.len() > DECIMALS as usize {
            return Err(CoreError::InvalidAmount("too many decimal places".into()));
        }
        let frac: u64 = if frac_str.is_empty() {
            0
        } else {
            if !frac_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::InvalidAmount(format!("invalid fractional part: {s}")));
            }
            format!("{frac_str:0<9}")
                .parse()
                .map_err(|_| CoreError::InvalidAmount(format!("invalid fractional part: {s}")))?
        };

        whole
            .checked_mul(NANO_PER_UNIT)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(|| CoreError::InvalidAmount("overflow".into()))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
