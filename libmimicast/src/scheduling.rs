//! Wake-time policy for the posting loop
//!
//! A [`Schedule`] turns the current wall-clock time into the delay before the
//! next cycle. It is pure; the loop that sleeps on it lives in
//! [`crate::agent::Scheduler`].

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// How the next wake-up is derived from the configured period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePolicy {
    /// Sleep a fixed period after each cycle
    #[default]
    Interval,
    /// Wake on wall-clock multiples of the period counted from local midnight
    Aligned,
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulePolicy::Interval => f.write_str("interval"),
            SchedulePolicy::Aligned => f.write_str("aligned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub policy: SchedulePolicy,
    pub every_minutes: u32,
}

impl Schedule {
    pub fn new(policy: SchedulePolicy, every_minutes: u32) -> Self {
        Self {
            policy,
            every_minutes,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.every_minutes) * 60)
    }

    /// Delay from `now` until the next cycle should start
    ///
    /// With [`SchedulePolicy::Aligned`], a time exactly on a boundary waits a
    /// full period, and the last slot of the day is cut short at midnight when
    /// the period does not divide 24 hours.
    pub fn delay_until_next<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        match self.policy {
            SchedulePolicy::Interval => self.period(),
            SchedulePolicy::Aligned => {
                let period = self.period().as_secs().max(1);
                let seconds = u64::from(now.num_seconds_from_midnight());
                // Leap-second nanos can exceed one second; clamp them
                let nanos = now.nanosecond().min(999_999_999);
                let elapsed = Duration::new(seconds, nanos);

                let next = ((seconds / period) + 1) * period;
                let next = next.min(SECONDS_PER_DAY);

                Duration::from_secs(next).saturating_sub(elapsed)
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} every {}",
            self.policy,
            humantime::format_duration(self.period())
        )
    }
}
