//! Validated rate configuration.

use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Errors produced when validating a configured rate.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RateError {
    /// Rate must be > 0.
    #[error("rate must be > 0 requests per second (got {0})")]
    NotPositive(f64),
    /// Rate must be a finite number.
    #[error("rate must be finite (got {0})")]
    NotFinite(f64),
    /// Rate lies outside what a nanosecond clock can enforce.
    #[error(
        "rate must be between {min} and {max} requests per second (got {got})",
        min = Rate::MIN_PER_SECOND,
        max = Rate::MAX_PER_SECOND
    )]
    OutOfRange { got: f64 },
}

/// Sustained number of admitted requests per second, applied per caller.
///
/// A fresh bucket holds `burst()` permits and refills one permit every
/// `emission_interval()`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct Rate {
    per_second: f64,
}

impl Rate {
    /// Slowest enforceable rate: one request per 10^9 seconds.
    pub const MIN_PER_SECOND: f64 = 1e-9;
    /// Fastest enforceable rate: one request per nanosecond.
    pub const MAX_PER_SECOND: f64 = NANOS_PER_SEC;

    /// Create a rate, rejecting zero, negative, NaN and infinite values as well as values
    /// outside [`Rate::MIN_PER_SECOND`]..=[`Rate::MAX_PER_SECOND`].
    ///
    /// # Examples
    /// ```
    /// use turnstile::Rate;
    /// let rate = Rate::per_second(5.0).unwrap();
    /// assert_eq!(rate.burst(), 5);
    /// assert!(Rate::per_second(0.0).is_err());
    /// ```
    pub fn per_second(per_second: f64) -> Result<Self, RateError> {
        if !per_second.is_finite() {
            return Err(RateError::NotFinite(per_second));
        }
        if per_second <= 0.0 {
            return Err(RateError::NotPositive(per_second));
        }
        if !(Self::MIN_PER_SECOND..=Self::MAX_PER_SECOND).contains(&per_second) {
            return Err(RateError::OutOfRange { got: per_second });
        }
        Ok(Self { per_second })
    }

    /// Configured requests per second.
    pub fn as_per_second(&self) -> f64 {
        self.per_second
    }

    /// Time to replenish a single permit, truncated to whole nanoseconds.
    pub fn emission_interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos())
    }

    /// Permits available to a fresh bucket; never less than one.
    pub fn burst(&self) -> u64 {
        // float -> int casts saturate
        (self.per_second.floor() as u64).max(1)
    }

    // Floored so that `burst` permits always fit in the tolerance window.
    pub(crate) fn interval_nanos(&self) -> u64 {
        ((NANOS_PER_SEC / self.per_second).floor() as u64).max(1)
    }

    pub(crate) fn tolerance_nanos(&self) -> u64 {
        self.interval_nanos().saturating_mul(self.burst())
    }
}

impl TryFrom<f64> for Rate {
    type Error = RateError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::per_second(value)
    }
}

impl From<Rate> for f64 {
    fn from(rate: Rate) -> Self {
        rate.per_second
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/s", self.per_second)
    }
}
