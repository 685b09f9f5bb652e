//! The time-of-day constant injected by the weaver.

use std::fmt;

use chrono::{Local, NaiveTime, Timelike};

use crate::{Error, Result};

/// Seconds in one day
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Seconds elapsed since local midnight, in `0..86400`.
///
/// # Examples
///
/// ```rust
/// use dotweave::weaver::TimeOfDay;
///
/// let time = TimeOfDay::from_hms(13, 7, 45)?;
/// assert_eq!(time.seconds(), 47265);
/// assert_eq!(time.to_string(), "13:07:45");
/// assert!(TimeOfDay::new(86_400).is_err());
/// # Ok::<(), dotweave::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    /// Midnight
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    /// Create from seconds since midnight.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimeOfDay`] if `seconds` is a day or more.
    pub fn new(seconds: u32) -> Result<Self> {
        if seconds >= SECONDS_PER_DAY {
            return Err(Error::InvalidTimeOfDay(seconds));
        }
        Ok(TimeOfDay(seconds))
    }

    /// Create from a wall clock reading.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimeOfDay`] if a component is out of range.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Result<Self> {
        if hours >= 24 || minutes >= 60 || seconds >= 60 {
            return Err(Error::InvalidTimeOfDay(
                hours
                    .saturating_mul(3600)
                    .saturating_add(minutes.saturating_mul(60))
                    .saturating_add(seconds),
            ));
        }
        Ok(TimeOfDay(hours * 3600 + minutes * 60 + seconds))
    }

    /// Read the local clock
    #[must_use]
    pub fn now() -> Self {
        TimeOfDay::from(Local::now().time())
    }

    /// Seconds since midnight
    #[must_use]
    pub fn seconds(&self) -> u32 {
        self.0
    }

    /// The operand of the injected `ldc.i4`
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn constant(&self) -> i32 {
        self.0 as i32
    }
}

impl From<NaiveTime> for TimeOfDay {
    // Leap seconds live in the nanosecond field, so this is always below a day.
    fn from(time: NaiveTime) -> Self {
        TimeOfDay(time.num_seconds_from_midnight())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        assert_eq!(TimeOfDay::new(0).unwrap(), TimeOfDay::MIDNIGHT);
        assert_eq!(TimeOfDay::new(86_399).unwrap().to_string(), "23:59:59");
        assert!(matches!(
            TimeOfDay::new(86_400),
            Err(Error::InvalidTimeOfDay(86_400))
        ));
        assert!(TimeOfDay::from_hms(24, 0, 0).is_err());
        assert!(TimeOfDay::from_hms(0, 60, 0).is_err());
    }

    #[test]
    fn from_clock() {
        let time = NaiveTime::from_hms_opt(13, 7, 45).unwrap();
        assert_eq!(TimeOfDay::from(time).constant(), 47265);
        assert!(TimeOfDay::now().seconds() < SECONDS_PER_DAY);
    }
}
