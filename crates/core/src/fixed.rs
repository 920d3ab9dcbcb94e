//! Scaled decimal values for monetary fields.
//!
//! A [`FixedPoint`] is a `(magnitude, scale)` pair meaning
//! `magnitude / 10^scale`. The scale is part of the value's identity:
//! `1.0` at scale 1 and `1.00` at scale 2 are different values. The only
//! operations that change scale are [`FixedPoint::rescale`],
//! [`FixedPoint::multiply`] and [`FixedPoint::divide`], and each of them
//! takes an explicit rounding mode.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, CoreError};

pub const MAX_SCALE: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundingMode {
    /// Away from zero.
    Up,
    /// Towards zero.
    Down,
    Ceiling,
    Floor,
    HalfUp,
    HalfDown,
    HalfEven,
    /// Fails with [`CoreError::RoundingRequired`] if the result is inexact.
    Unnecessary,
}

/// Target scale and rounding for `multiply` and `divide`.
///
/// Both parts must be set; there is no default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MathContext {
    scale: Option<u32>,
    rounding: Option<RoundingMode>,
}

impl MathContext {
    pub fn new(scale: u32, rounding: RoundingMode) -> Self {
        Self {
            scale: Some(scale),
            rounding: Some(rounding),
        }
    }

    pub fn unspecified() -> Self {
        Self::default()
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = Some(rounding);
        self
    }

    fn require(&self) -> Result<(u32, RoundingMode), ConfigurationError> {
        let rounding = self.rounding.ok_or(ConfigurationError::MissingRoundingMode)?;
        let scale = self.scale.ok_or(ConfigurationError::MissingScale)?;
        check_scale(scale)?;
        Ok((scale, rounding))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StoredFixed")]
pub struct FixedPoint {
    magnitude: i64,
    scale: u32,
}

/// Wire shape of [`FixedPoint`]. Decoding goes through `FixedPoint::new` so
/// the scale bound holds for values read back from storage.
#[derive(Deserialize)]
struct StoredFixed {
    magnitude: i64,
    scale: u32,
}

impl TryFrom<StoredFixed> for FixedPoint {
    type Error = CoreError;

    fn try_from(stored: StoredFixed) -> Result<Self, Self::Error> {
        FixedPoint::new(stored.magnitude, stored.scale)
    }
}

fn check_scale(scale: u32) -> Result<(), ConfigurationError> {
    if scale > MAX_SCALE {
        return Err(ConfigurationError::ScaleOutOfRange {
            scale,
            max: MAX_SCALE,
        });
    }
    Ok(())
}

fn pow10(exp: u32) -> Result<i128, CoreError> {
    10i128.checked_pow(exp).ok_or(CoreError::Overflow)
}

fn narrow(value: i128) -> Result<i64, CoreError> {
    i64::try_from(value).map_err(|_| CoreError::Overflow)
}

/// Divide `num` by `den`, rounding the quotient with `mode`.
fn div_round(num: i128, den: i128, mode: RoundingMode) -> Result<i128, CoreError> {
    if den == 0 {
        return Err(CoreError::DivisionByZero);
    }
    let (num, den) = if den < 0 {
        (
            num.checked_neg().ok_or(CoreError::Overflow)?,
            den.checked_neg().ok_or(CoreError::Overflow)?,
        )
    } else {
        (num, den)
    };

    let quotient = num / den;
    let remainder = num % den;
    if remainder == 0 {
        return Ok(quotient);
    }

    let positive = num > 0;
    let away = if positive { quotient + 1 } else { quotient - 1 };
    let half = (remainder.unsigned_abs() * 2).cmp(&den.unsigned_abs());

    let rounded = match mode {
        RoundingMode::Up => away,
        RoundingMode::Down => quotient,
        RoundingMode::Ceiling if positive => away,
        RoundingMode::Ceiling => quotient,
        RoundingMode::Floor if positive => quotient,
        RoundingMode::Floor => away,
        RoundingMode::HalfUp => match half {
            Ordering::Less => quotient,
            _ => away,
        },
        RoundingMode::HalfDown => match half {
            Ordering::Greater => away,
            _ => quotient,
        },
        RoundingMode::HalfEven => match half {
            Ordering::Greater => away,
            Ordering::Less => quotient,
            Ordering::Equal if quotient % 2 != 0 => away,
            Ordering::Equal => quotient,
        },
        RoundingMode::Unnecessary => return Err(CoreError::RoundingRequired),
    };
    Ok(rounded)
}

fn rescale_raw(
    value: i128,
    from: u32,
    to: u32,
    mode: RoundingMode,
) -> Result<FixedPoint, CoreError> {
    let rescaled = if to >= from {
        value
            .checked_mul(pow10(to - from)?)
            .ok_or(CoreError::Overflow)?
    } else {
        div_round(value, pow10(from - to)?, mode)?
    };
    FixedPoint::new(narrow(rescaled)?, to)
}

impl FixedPoint {
    pub fn new(magnitude: i64, scale: u32) -> Result<Self, CoreError> {
        check_scale(scale)?;
        Ok(Self { magnitude, scale })
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            magnitude: value,
            scale: 0,
        }
    }

    pub fn zero(scale: u32) -> Result<Self, CoreError> {
        Self::new(0, scale)
    }

    /// Marshalling constructor for values read from or written to a field
    /// whose schema declares `declared_scale`.
    pub fn from_stored(
        field: &str,
        magnitude: i64,
        scale: u32,
        declared_scale: u32,
    ) -> Result<Self, CoreError> {
        let value = Self::new(magnitude, scale)?;
        value.check_declared(field, declared_scale)?;
        Ok(value)
    }

    pub fn check_declared(&self, field: &str, declared_scale: u32) -> Result<(), ConfigurationError> {
        if self.scale > declared_scale {
            return Err(ConfigurationError::ScaleExceeded {
                field: field.to_string(),
                scale: self.scale,
                declared: declared_scale,
            });
        }
        Ok(())
    }

    pub fn magnitude(&self) -> i64 {
        self.magnitude
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0
    }

    pub fn is_negative(&self) -> bool {
        self.magnitude < 0
    }

    pub fn negate(&self) -> Result<Self, CoreError> {
        let magnitude = self.magnitude.checked_neg().ok_or(CoreError::Overflow)?;
        Ok(Self {
            magnitude,
            scale: self.scale,
        })
    }

    // Both magnitudes at the larger of the two scales.
    fn aligned(&self, other: &Self) -> Result<(i128, i128, u32), CoreError> {
        let scale = self.scale.max(other.scale);
        let lift = |value: &Self| {
            (value.magnitude as i128)
                .checked_mul(pow10(scale - value.scale)?)
                .ok_or(CoreError::Overflow)
        };
        Ok((lift(self)?, lift(other)?, scale))
    }

    pub fn add(&self, other: &Self) -> Result<Self, CoreError> {
        let (lhs, rhs, scale) = self.aligned(other)?;
        Self::new(narrow(lhs.checked_add(rhs).ok_or(CoreError::Overflow)?)?, scale)
    }

    pub fn subtract(&self, other: &Self) -> Result<Self, CoreError> {
        let (lhs, rhs, scale) = self.aligned(other)?;
        Self::new(narrow(lhs.checked_sub(rhs).ok_or(CoreError::Overflow)?)?, scale)
    }

    pub fn multiply(&self, other: &Self, ctx: MathContext) -> Result<Self, CoreError> {
        let (scale, rounding) = ctx.require()?;
        let product = self.magnitude as i128 * other.magnitude as i128;
        rescale_raw(product, self.scale + other.scale, scale, rounding)
    }

    pub fn divide(&self, divisor: &Self, ctx: MathContext) -> Result<Self, CoreError> {
        let (scale, rounding) = ctx.require()?;
        if divisor.is_zero() {
            return Err(CoreError::DivisionByZero);
        }
        // quotient = a * 10^(scale + b.scale - a.scale) / b
        let exp = scale as i64 + divisor.scale as i64 - self.scale as i64;
        let (num, den) = if exp >= 0 {
            let num = (self.magnitude as i128)
                .checked_mul(pow10(exp as u32)?)
                .ok_or(CoreError::Overflow)?;
            (num, divisor.magnitude as i128)
        } else {
            let den = (divisor.magnitude as i128)
                .checked_mul(pow10((-exp) as u32)?)
                .ok_or(CoreError::Overflow)?;
            (self.magnitude as i128, den)
        };
        Self::new(narrow(div_round(num, den, rounding)?)?, scale)
    }

    pub fn rescale(&self, scale: u32, rounding: RoundingMode) -> Result<Self, CoreError> {
        check_scale(scale)?;
        rescale_raw(self.magnitude as i128, self.scale, scale, rounding)
    }

    /// Numeric comparison, ignoring scale. `1.0` and `1.00` compare equal
    /// here even though they are not `==`.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match self.aligned(other) {
            Ok((lhs, rhs, _)) => lhs.cmp(&rhs),
            // Only reachable past MAX_SCALE, which construction rejects.
            Err(_) => self.scale.cmp(&other.scale),
        }
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.magnitude < 0 { "-" } else { "" };
        let digits = self.magnitude.unsigned_abs().to_string();
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let width = self.scale as usize + 1;
        let padded = format!("{digits:0>width$}");
        let (int_part, frac_part) = padded.split_at(padded.len() - self.scale as usize);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for FixedPoint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidData(format!("invalid fixed-point literal: {s:?}"));
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) if !frac_part.is_empty() => (int_part, frac_part),
            Some(_) => return Err(invalid()),
            None => (body, ""),
        };
        if int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let scale = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
        check_scale(scale)?;
        let magnitude: i64 = format!("{int_part}{frac_part}")
            .parse()
            .map_err(|_| CoreError::Overflow)?;
        let magnitude = if negative { -magnitude } else { magnitude };
        Self::new(magnitude, scale)
    }
}
