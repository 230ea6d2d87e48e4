//! Coin amounts.
//!
//! Amounts are fixed-point integers in the chain's smallest unit (satoshi-style,
//! 8 decimals) to avoid floating-point drift when fees are subtracted from
//! payouts. Nodes speak JSON numbers in whole coins, so the serde
//! representation is a float in coins and conversion happens only at that
//! boundary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// Number of base units in one coin.
pub const UNITS_PER_COIN: i64 = 100_000_000;

/// Decimal places carried by an [`Amount`].
pub const DECIMALS: usize = 8;

/// A signed amount in base units (1 coin = 10^8 units).
///
/// Signed because wallet transaction records report outgoing amounts and
/// fees as negative values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    pub fn units(&self) -> i64 {
        self.0
    }

    /// Convert a coin-denominated float, rounding to 8 decimals.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` range.
    pub fn from_coins(coins: f64) -> Option<Self> {
        if !coins.is_finite() {
            return None;
        }
        let units = (coins * UNITS_PER_COIN as f64).round();
        if units < i64::MIN as f64 || units > i64::MAX as f64 {
            return None;
        }
        Some(Self(units as i64))
    }

    pub fn to_coins(&self) -> f64 {
        self.0 as f64 / UNITS_PER_COIN as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

/// Plain decimal in coins with trailing zeros trimmed, e.g. `0.4999865`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / UNITS_PER_COIN as u64;
        let frac = abs % UNITS_PER_COIN as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let frac = format!("{frac:0width$}", width = DECIMALS);
        write!(f, "{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(TypesError::InvalidAmount(s.to_string()));
        }
        if frac.len() > DECIMALS
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(TypesError::InvalidAmount(s.to_string()));
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| TypesError::InvalidAmount(s.to_string()))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<width$}", width = DECIMALS)
                .parse()
                .map_err(|_| TypesError::InvalidAmount(s.to_string()))?
        };
        let units = whole
            .checked_mul(UNITS_PER_COIN)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| TypesError::InvalidAmount(s.to_string()))?;
        Ok(Self(if negative { -units } else { units }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_coins())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let coins = f64::deserialize(deserializer)?;
        Amount::from_coins(coins)
            .ok_or_else(|| serde::de::Error::custom(format!("amount out of range: {coins}")))
    }
}
