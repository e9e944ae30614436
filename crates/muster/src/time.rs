use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: Duration = Duration::from_millis(1_288_834_974_657);

/// Discord epoch: Thursday, January 1, 2015 00:00:00 UTC
pub const DISCORD_EPOCH: Duration = Duration::from_millis(1_420_070_400_000);

/// A trait for time sources that return a millisecond timestamp relative to
/// some epoch.
///
/// This abstraction allows you to plug in the system clock or a mocked time
/// source in tests.
///
/// # Example
///
/// ```
/// use muster::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> u64;

    /// Like [`Self::current_millis`], but fails when the source cannot
    /// express the current time relative to its epoch.
    ///
    /// The generator reads time through this method. The default never
    /// fails.
    ///
    /// # Errors
    ///
    /// Implementation defined; [`SystemClock`] returns
    /// [`Error::ClockBeforeEpoch`].
    fn checked_millis(&self) -> Result<u64> {
        Ok(self.current_millis())
    }
}

/// A wall-clock time source offset from a fixed epoch.
///
/// Every call reads `SystemTime::now()`, so NTP steps and manual clock
/// changes are visible to the generator. A backwards step surfaces as
/// [`Error::ClockRegression`] rather than being hidden.
///
/// A wall clock earlier than the epoch reads as `0` from
/// [`TimeSource::current_millis`] and as [`Error::ClockBeforeEpoch`] from
/// [`TimeSource::checked_millis`].
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Duration,
}

impl Default for SystemClock {
    /// Constructs a clock aligned to [`CUSTOM_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(CUSTOM_EPOCH)
    }
}

impl SystemClock {
    /// Constructs a clock using `epoch` (a [`Duration`] since 1970-01-01 UTC)
    /// as t = 0.
    pub const fn with_epoch(epoch: Duration) -> Self {
        Self { epoch }
    }

    /// The origin of this clock.
    pub const fn epoch(&self) -> Duration {
        self.epoch
    }
}

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        self.checked_millis().unwrap_or(0)
    }

    fn checked_millis(&self) -> Result<u64> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        match now.checked_sub(self.epoch) {
            Some(elapsed) => Ok(saturating_millis(elapsed)),
            None => Err(Error::ClockBeforeEpoch {
                now: saturating_millis(now),
                epoch: saturating_millis(self.epoch),
            }),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_relative_to_epoch() {
        let unix = SystemClock::with_epoch(Duration::ZERO).current_millis();
        let custom = SystemClock::default().current_millis();
        let delta = unix - custom;
        // Allow for the clock ticking between the two reads.
        assert!(delta.abs_diff(CUSTOM_EPOCH.as_millis() as u64) < 1_000);
    }

    #[test]
    fn system_clock_before_epoch_is_an_error() {
        let far_future = SystemClock::with_epoch(Duration::from_millis(u64::MAX / 2));
        assert_eq!(far_future.current_millis(), 0);

        let err = far_future.checked_millis().unwrap_err();
        let Error::ClockBeforeEpoch { now, epoch } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(epoch, u64::MAX / 2);
        assert!(now < epoch);
    }

    #[test]
    fn checked_millis_defaults_to_current_millis() {
        struct Fixed;
        impl TimeSource for Fixed {
            fn current_millis(&self) -> u64 {
                42
            }
        }
        assert_eq!(Fixed.checked_millis(), Ok(42));

        let clock = SystemClock::default();
        assert!(clock.checked_millis().is_ok());
    }
}
