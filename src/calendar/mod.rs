//! Calendar unit arithmetic and wake-up scheduling.
//!
//! Relative-date predicates are functions of time: "updated within the last
//! week" changes truth value at every week boundary. This module provides:
//! - `CalendarUnit` - day/week/month boundary arithmetic over `chrono`
//! - `Scheduler` - injected one-shot wake-up capability with cancel-on-drop
//!   handles, used to re-evaluate live queries at the next unit boundary
//!
//! All arithmetic is done in UTC. "Now" is always the evaluating reader's
//! transaction timestamp, never the wall clock.

use crate::error::{QueryError, Result};
use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc, Weekday};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Granularity of relative-date arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarUnit {
    Day,
    Week,
    Month,
}

impl CalendarUnit {
    /// Formula suffix for relative values (`-7d`, `+2w`, `-1mo`).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "mo",
        }
    }

    /// Floor `t` to the start of the unit containing it.
    ///
    /// - Day: midnight
    /// - Week: midnight of `week_start`
    /// - Month: midnight of the first of the month
    #[must_use]
    pub fn floor(self, t: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
        let date = match self {
            Self::Day => t.date_naive(),
            Self::Week => {
                let days_in = i64::from(
                    t.date_naive()
                        .weekday()
                        .days_since(week_start),
                );
                t.date_naive() - Duration::days(days_in)
            }
            Self::Month => t.date_naive().with_day(1).unwrap_or_else(|| t.date_naive()),
        };
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        Utc.from_utc_datetime(&date.and_time(midnight))
    }

    /// Shift `t` by `n` units (negative = into the past).
    ///
    /// Day and week shifts are exact durations; month shifts use calendar
    /// month arithmetic with end-of-month clamping.
    #[must_use]
    pub fn shift(self, t: DateTime<Utc>, n: i32) -> DateTime<Utc> {
        match self {
            Self::Day => t + Duration::days(i64::from(n)),
            Self::Week => t + Duration::weeks(i64::from(n)),
            Self::Month => {
                let months = Months::new(n.unsigned_abs());
                let shifted = if n >= 0 {
                    t.checked_add_months(months)
                } else {
                    t.checked_sub_months(months)
                };
                shifted.unwrap_or(t)
            }
        }
    }

    /// The first unit boundary strictly after `t`.
    #[must_use]
    pub fn next_boundary(self, t: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
        self.floor(self.shift(t, 1), week_start)
    }
}

impl fmt::Display for CalendarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

impl FromStr for CalendarUnit {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "d" => Ok(Self::Day),
            "w" => Ok(Self::Week),
            "mo" => Ok(Self::Month),
            other => Err(QueryError::validation(
                "unit",
                format!("invalid calendar unit '{other}' (use d, w, mo)"),
            )),
        }
    }
}

/// Which side of a boundary a date value constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundSide {
    /// Lower bound: attribute >= boundary.
    After,
    /// Upper bound: attribute < boundary.
    Before,
}

/// Resolve a relative offset against a transaction timestamp.
///
/// `offset` counts units forward from `now` (negative = past). The result
/// is the unit-floored boundary: `resolve_relative(-7, Day, t)` is the
/// midnight starting the day seven days before `t`.
#[must_use]
pub fn resolve_relative(
    offset: i32,
    unit: CalendarUnit,
    now: DateTime<Utc>,
    week_start: Weekday,
) -> DateTime<Utc> {
    unit.floor(unit.shift(now, offset), week_start)
}

/// One-shot wake-up scheduling capability.
///
/// Relative-date resolution uses this to ask for a wake-up at the next unit
/// boundary. Implementations are injected by the host application (a timer
/// wheel, an event loop); the crate never spawns threads of its own.
pub trait Scheduler: Send + Sync {
    /// Schedule `wake` to run once at `when`. The returned handle cancels
    /// the wake-up when dropped.
    fn schedule_at(&self, when: DateTime<Utc>, wake: Box<dyn FnOnce() + Send>) -> WakeHandle;
}

/// Cancellation handle for a scheduled wake-up.
///
/// Dropping the handle cancels the wake-up; handles attached to a
/// subscription lifetime are therefore cancelled when the lifetime ends.
pub struct WakeHandle {
    cancelled: Arc<AtomicBool>,
}

impl WakeHandle {
    /// Create a handle sharing the given cancellation flag.
    ///
    /// Scheduler implementations check the flag before firing.
    #[must_use]
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// A handle with nothing to cancel.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel without waiting for drop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the wake-up has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for WakeHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for WakeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
