//! Millisecond-resolution timestamps as written in sensor logs

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, SyncLogError};

const MILLIS_PER_SECOND: i64 = 1000;

/// A `seconds.milliseconds` point in time
///
/// Seconds count from an arbitrary origin (usually the Unix epoch).
/// `milliseconds` is always kept in `0..1000`; every arithmetic operation
/// carries into or borrows from `seconds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeValue {
    /// Whole seconds
    pub seconds: i64,
    /// Milliseconds within the second (0..1000)
    pub milliseconds: u16,
}

impl TimeValue {
    /// Build a time value, normalizing milliseconds above 999
    ///
    /// Saturates at the range of an `i64` millisecond count.
    #[must_use]
    pub fn new(seconds: i64, milliseconds: u32) -> Self {
        Self::from_millis(
            seconds
                .saturating_mul(MILLIS_PER_SECOND)
                .saturating_add(i64::from(milliseconds)),
        )
    }

    /// Build a time value from a total count of milliseconds
    #[must_use]
    pub fn from_millis(total: i64) -> Self {
        Self {
            seconds: total.div_euclid(MILLIS_PER_SECOND),
            milliseconds: total.rem_euclid(MILLIS_PER_SECOND) as u16,
        }
    }

    /// Total milliseconds since origin
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.seconds
            .saturating_mul(MILLIS_PER_SECOND)
            .saturating_add(i64::from(self.milliseconds))
    }

    /// Move forward by `ms` milliseconds (negative values move backward)
    pub fn add_millis(&mut self, ms: i64) {
        *self = Self::from_millis(self.as_millis().saturating_add(ms));
    }

    /// Move backward by `ms` milliseconds (negative values move forward)
    pub fn sub_millis(&mut self, ms: i64) {
        *self = Self::from_millis(self.as_millis().saturating_sub(ms));
    }

    /// Signed distance `a - b` in milliseconds
    ///
    /// Positive when `a` is later than `b`. The magnitude is used as a
    /// distance by the timestamp search.
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> i64 {
        a.as_millis().saturating_sub(b.as_millis())
    }
}

impl Ord for TimeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(self, other).cmp(&0)
    }
}

impl PartialOrd for TimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<i64> for TimeValue {
    type Output = Self;

    fn add(mut self, ms: i64) -> Self {
        self.add_millis(ms);
        self
    }
}

impl Sub<i64> for TimeValue {
    type Output = Self;

    fn sub(mut self, ms: i64) -> Self {
        self.sub_millis(ms);
        self
    }
}

impl AddAssign<i64> for TimeValue {
    fn add_assign(&mut self, ms: i64) {
        self.add_millis(ms);
    }
}

impl SubAssign<i64> for TimeValue {
    fn sub_assign(&mut self, ms: i64) {
        self.sub_millis(ms);
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.seconds, self.milliseconds)
    }
}

impl FromStr for TimeValue {
    type Err = SyncLogError;

    /// Parse `seconds.millis`
    ///
    /// The fraction is read as an integer count of milliseconds, the same
    /// way log lines are parsed: `"12.5"` is 12 s 5 ms, `"12.500"` is 12 s
    /// 500 ms.
    fn from_str(s: &str) -> Result<Self> {
        crate::reader::parse_timestamp_prefix(s.trim().as_bytes())
            .filter(|(_, end)| *end == s.trim().len())
            .map(|(time, _)| time)
            .ok_or_else(|| SyncLogError::Other(format!("Invalid timestamp: {s:?}")))
    }
}
