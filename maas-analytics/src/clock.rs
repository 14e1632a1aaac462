//! Time sources used to stamp events and measure timed events.
//!
//! # Available clocks
//!
//! Name (for [`Clock::by_name()`]) | Clock            | Moves
//! ------------------------------- | -----            | -----
//! `wall-time`                     | [`WallTime`]     | on its own, monotonically
//! `manual`                        | [`ManualClock`]  | only when [`ManualClock::advance`] is called
//!
//! Every clock reports two things: a monotonic offset in nanoseconds since the
//! clock was created, used for all duration arithmetic, and the wall-clock
//! instant the clock was created at. Event timestamps are derived by adding
//! the offset to that anchor, so timestamps and durations can never disagree
//! even if the system clock is adjusted while the client is running.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

#[derive(Clone, Debug)]
pub enum Clock {
    WallTime(WallTime),
    Manual(ManualClock),
}

impl Clock {
    pub fn by_name(name: &str) -> Result<Self> {
        Ok(match name {
            WallTime::NAME => Clock::WallTime(WallTime::new()),
            ManualClock::NAME => Clock::Manual(ManualClock::new()),
            _ => return Err(Error::UnknownClock(name.to_owned())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Clock::WallTime(_) => WallTime::NAME,
            Clock::Manual(_) => ManualClock::NAME,
        }
    }

    /// Nanoseconds elapsed since the clock was created.
    #[inline]
    pub fn since_start(&self) -> u64 {
        match self {
            Clock::WallTime(clock) => clock.since_start(),
            Clock::Manual(clock) => clock.since_start(),
        }
    }

    /// Converts an offset obtained from [`Clock::since_start`] into a
    /// wall-clock instant.
    pub fn system_time_at(&self, offset_ns: u64) -> SystemTime {
        let anchor = match self {
            Clock::WallTime(clock) => clock.anchor,
            Clock::Manual(clock) => clock.anchor,
        };
        anchor + Duration::from_nanos(offset_ns)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::WallTime(WallTime::new())
    }
}

impl From<ManualClock> for Clock {
    fn from(clock: ManualClock) -> Self {
        Clock::Manual(clock)
    }
}

/// "Monotonic clock" with nanosecond precision (using [`std::time::Instant`]).
///
/// Can be obtained with `Clock::by_name("wall-time")`.
#[derive(Clone, Debug)]
pub struct WallTime {
    start: Instant,
    anchor: SystemTime,
}

impl WallTime {
    const NAME: &'static str = "wall-time";

    pub fn new() -> Self {
        WallTime {
            start: Instant::now(),
            anchor: SystemTime::now(),
        }
    }

    #[inline]
    fn since_start(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

impl Default for WallTime {
    fn default() -> Self {
        Self::new()
    }
}

/// A clock that stands still until it is explicitly advanced.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// hand another to the client. Can be obtained with `Clock::by_name("manual")`.
#[derive(Clone, Debug)]
pub struct ManualClock {
    elapsed_ns: Arc<AtomicU64>,
    anchor: SystemTime,
}

impl ManualClock {
    const NAME: &'static str = "manual";

    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Creates a manual clock whose zero offset corresponds to `anchor`.
    pub fn starting_at(anchor: SystemTime) -> Self {
        ManualClock {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            anchor,
        }
    }

    /// Moves the clock forward by `by`. The offset saturates at `u64::MAX`
    /// nanoseconds; the clock never goes backwards.
    pub fn advance(&self, by: Duration) {
        let by_ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .elapsed_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |elapsed| {
                Some(elapsed.saturating_add(by_ns))
            });
    }

    #[inline]
    fn since_start(&self) -> u64 {
        self.elapsed_ns.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn clocks_by_name() {
        assert_eq!(Clock::by_name("wall-time").unwrap().name(), "wall-time");
        assert_eq!(Clock::by_name("manual").unwrap().name(), "manual");
        assert!(matches!(
            Clock::by_name("instructions:u"),
            Err(Error::UnknownClock(name)) if name == "instructions:u"
        ));
    }

    #[test]
    fn manual_clock_shares_time_between_clones() {
        let manual = ManualClock::starting_at(UNIX_EPOCH);
        let clock = Clock::from(manual.clone());

        assert_eq!(clock.since_start(), 0);
        manual.advance(Duration::from_millis(1500));
        assert_eq!(clock.since_start(), 1_500_000_000);
        assert_eq!(
            clock.system_time_at(clock.since_start()),
            UNIX_EPOCH + Duration::from_millis(1500)
        );
    }

    #[test]
    fn manual_clock_saturates_instead_of_wrapping() {
        let manual = ManualClock::starting_at(UNIX_EPOCH);
        let clock = Clock::from(manual.clone());

        manual.advance(Duration::from_secs(5));
        manual.advance(Duration::from_secs(u64::MAX / 1_000_000_000 + 10));
        assert_eq!(clock.since_start(), u64::MAX);

        manual.advance(Duration::MAX);
        assert_eq!(clock.since_start(), u64::MAX);
    }

    #[test]
    fn wall_time_is_monotonic() {
        let clock = Clock::default();
        let first = clock.since_start();
        let second = clock.since_start();
        assert!(second >= first);
    }
}
