//! Exact fixed-point decimal numbers.
//!
//! Micrometer frames carry a fixed number of decimal places and tolerance bounds are written
//! the same way, so values are kept as an integer mantissa plus a decimal scale and never go
//! through binary floating point on the way to a comparison.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest number of fractional digits a `Decimal` can hold.
pub const MAX_SCALE: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalParseError {
    Empty,
    InvalidDigit(char),
    Overflow,
}

impl fmt::Display for DecimalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalParseError::Empty => write!(f, "no digits"),
            DecimalParseError::InvalidDigit(c) => write!(f, "invalid character {:?}", c),
            DecimalParseError::Overflow => write!(f, "value out of range"),
        }
    }
}

impl std::error::Error for DecimalParseError {}

/// `mantissa * 10^-scale`.
///
/// The mantissa rescaled to [`MAX_SCALE`] always fits in an `i128`, so comparisons and
/// sums never overflow on the way.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// `mantissa * 10^-scale`. Scales above [`MAX_SCALE`] are clamped.
    pub const fn new(mantissa: i64, scale: u32) -> Self {
        Self {
            mantissa: mantissa as i128,
            scale: if scale > MAX_SCALE { MAX_SCALE } else { scale },
        }
    }

    fn bounded(mantissa: i128, scale: u32) -> Option<Self> {
        mantissa.checked_mul(10i128.pow(MAX_SCALE - scale))?;
        Some(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Parses `[+-]digits[.digits]`. Leading zeros are kept out of the scale, trailing
    /// fractional zeros are kept in it (`"000.500"` has scale 3). Fractional digits past
    /// [`MAX_SCALE`] are rounded half away from zero.
    pub fn parse(text: &str) -> Result<Self, DecimalParseError> {
        let text = text.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalParseError::Empty);
        }

        let digit = |c: char| c.to_digit(10).ok_or(DecimalParseError::InvalidDigit(c));
        let kept = frac_part.len().min(MAX_SCALE as usize);
        let (frac_kept, frac_extra) = frac_part.split_at(kept);

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_kept.chars()) {
            let d = digit(c)? as i128;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(d))
                .ok_or(DecimalParseError::Overflow)?;
        }

        let mut extra = frac_extra.chars();
        if let Some(first) = extra.next() {
            let round_up = digit(first)? >= 5;
            for c in extra {
                digit(c)?;
            }
            if round_up {
                mantissa = mantissa.checked_add(1).ok_or(DecimalParseError::Overflow)?;
            }
        }

        let mantissa = if negative { -mantissa } else { mantissa };
        Self::bounded(mantissa, kept as u32).ok_or(DecimalParseError::Overflow)
    }

    /// Converts a float through its decimal rendering at `scale` places.
    pub fn from_f64(value: f64, scale: u32) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scale = scale.min(MAX_SCALE);
        Self::parse(&format!("{:.*}", scale as usize, value))
            .ok()
            .map(Self::normalize)
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Drops trailing fractional zeros.
    pub fn normalize(self) -> Self {
        let mut out = self;
        while out.scale > 0 && out.mantissa % 10 == 0 {
            out.mantissa /= 10;
            out.scale -= 1;
        }
        out
    }

    /// Rounds to `places` decimal places, halves away from zero. Values already at or below
    /// that precision are returned unchanged.
    pub fn round_half_up(self, places: u32) -> Self {
        if places >= self.scale {
            return self;
        }
        let factor = 10i128.pow(self.scale - places);
        let mut quotient = self.mantissa / factor;
        let remainder = self.mantissa % factor;
        if remainder.abs() * 2 >= factor {
            quotient += self.mantissa.signum();
        }
        Self {
            mantissa: quotient,
            scale: places,
        }
    }

    pub fn abs(self) -> Self {
        Self {
            mantissa: self.mantissa.abs(),
            scale: self.scale,
        }
    }

    pub fn checked_sub(self, other: Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        Self::bounded(self.rescaled(scale).checked_sub(other.rescaled(scale))?, scale)
    }

    pub fn checked_add(self, other: Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        Self::bounded(self.rescaled(scale).checked_add(other.rescaled(scale))?, scale)
    }

    fn rescaled(&self, scale: u32) -> i128 {
        self.mantissa * 10i128.pow(scale - self.scale)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal {
            mantissa: -self.mantissa,
            scale: self.scale,
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.rescaled(scale).cmp(&other.rescaled(scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let pow = 10u128.pow(self.scale);
        let abs = self.mantissa.unsigned_abs();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / pow,
            abs % pow,
            width = self.scale as usize
        )
    }
}

impl FromStr for Decimal {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DecimalVisitor;

        impl<'de> de::Visitor<'de> for DecimalVisitor {
            type Value = Decimal;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal number or a decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
                Decimal::parse(v).map_err(|e| E::custom(format!("{}: {:?}", e, v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
                Decimal::from_f64(v, MAX_SCALE)
                    .ok_or_else(|| E::custom(format!("unrepresentable number {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
                Ok(Decimal::new(v, 0))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
                Ok(Decimal {
                    mantissa: v as i128,
                    scale: 0,
                })
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}
