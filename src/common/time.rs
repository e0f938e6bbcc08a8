// SPDX-License-Identifier: GPL-2.0-or-later

use std::ops::Deref;
use std::time::Duration as StdDuration;

pub const NANOSECOND: u64 = 1;
pub const SECOND: u64 = NANOSECOND * 1_000_000_000;

/// A log-mono-time timestamp, nanoseconds since the start of the logging
/// process that recorded the route. Not a wall-clock timestamp.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonoTime(u64);

impl MonoTime {
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns `self - other` as a `Duration`, or `None` if `other` is after `self`.
    #[must_use]
    pub fn checked_sub(&self, other: Self) -> Option<LogDuration> {
        self.0.checked_sub(other.0).map(LogDuration)
    }

    #[must_use]
    pub fn checked_add(&self, dur: LogDuration) -> Option<Self> {
        self.0.checked_add(dur.0).map(Self)
    }

    pub const ZERO: MonoTime = MonoTime(0);
}

impl From<u64> for MonoTime {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl Deref for MonoTime {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A span of log-mono-time, in nanoseconds.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogDuration(u64);

impl LogDuration {
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        Self((secs.max(0.0) * SECOND as f64) as u64)
    }

    #[must_use]
    pub fn as_std(&self) -> StdDuration {
        StdDuration::from_nanos(self.0)
    }

    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / SECOND as f64
        }
    }
}

impl Deref for LogDuration {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mono_time_sub() {
        let a = MonoTime::from_nanos(10);
        let b = MonoTime::from_nanos(3);
        assert_eq!(a.checked_sub(b), Some(LogDuration(7)));
        assert_eq!(b.checked_sub(a), None);
    }

    #[test]
    fn log_duration_from_secs() {
        assert_eq!(LogDuration::from_secs_f64(1.5), LogDuration(1_500_000_000));
    }
}
