//! Utilities for managing units.
//!
//! Source magnitudes are stored as an integer value and an SI prefix
//! so that netlists render exactly, without float formatting noise.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// An SI prefix.
///
/// Limited to the prefixes understood by the simulator's
/// scale-suffix syntax.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SiPrefix {
    /// Multiplier of `1e-15`.
    Femto,
    /// Multiplier of `1e-12`.
    Pico,
    /// Multiplier of `1e-9`.
    Nano,
    /// Multiplier of `1e-6`.
    Micro,
    /// Multiplier of `1e-3`.
    Milli,
    /// Multiplier of `1`.
    #[default]
    None,
    /// Multiplier of `1e3`.
    Kilo,
    /// Multiplier of `1e6`.
    Mega,
    /// Multiplier of `1e9`.
    Giga,
    /// Multiplier of `1e12`.
    Tera,
}

impl SiPrefix {
    /// The multiplier associated with this SI prefix.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Femto => 1e-15,
            Self::Pico => 1e-12,
            Self::Nano => 1e-9,
            Self::Micro => 1e-6,
            Self::Milli => 1e-3,
            Self::None => 1f64,
            Self::Kilo => 1e3,
            Self::Mega => 1e6,
            Self::Giga => 1e9,
            Self::Tera => 1e12,
        }
    }

    /// The netlist scale suffix for this prefix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Femto => "f",
            Self::Pico => "p",
            Self::Nano => "n",
            Self::Micro => "u",
            Self::Milli => "m",
            Self::None => "",
            Self::Kilo => "K",
            Self::Mega => "MEG",
            Self::Giga => "G",
            Self::Tera => "T",
        }
    }
}

/// A quantity with an SI prefix.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SiValue {
    value: i64,
    prefix: SiPrefix,
}

impl SiValue {
    /// Creates an [`SiValue`] representing `value * prefix.multiplier()`.
    pub fn new(value: i64, prefix: SiPrefix) -> Self {
        Self { value, prefix }
    }

    /// Creates an [`SiValue`] equal to zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Creates an [`SiValue`] from a float, rounded to the given precision.
    ///
    /// ```
    /// use eldo::units::{SiPrefix, SiValue};
    /// let value = SiValue::with_precision(0.8, SiPrefix::Milli);
    /// assert_eq!(value, SiValue::new(800, SiPrefix::Milli));
    /// ```
    pub fn with_precision(value: f64, precision: SiPrefix) -> Self {
        let value = (value / precision.multiplier()).round() as i64;
        Self::new(value, precision)
    }

    /// The value multiplying the SI prefix.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The SI prefix.
    pub fn prefix(&self) -> SiPrefix {
        self.prefix
    }
}

impl From<SiValue> for f64 {
    fn from(value: SiValue) -> Self {
        value.value as f64 * value.prefix.multiplier()
    }
}

impl Display for SiValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.prefix.suffix())
    }
}
