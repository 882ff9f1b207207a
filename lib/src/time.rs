//! Simulation epochs.

use std::{fmt, ops};

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::error::Result;

/// Seconds in a Julian day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;
/// Days in a Julian century.
pub const DAYS_PER_CENTURY: f64 = 36_525.0;
/// Unix timestamp of J2000.0 (2000-01-01T12:00:00Z).
const J2000_UNIX: i64 = 946_728_000;

/// A simulation epoch, stored as the signed offset from J2000.0.
///
/// Time scales are not distinguished: the offset is treated as TDB
/// everywhere, which is well below the accuracy of the mean-element
/// ephemerides this crate propagates.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Epoch(Duration);

impl Epoch {
    pub const J2000: Epoch = Epoch(Duration::ZERO);

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn into_duration(self) -> Duration {
        self.0
    }

    pub fn from_seconds(sec: f64) -> Self {
        Self(Duration::seconds_f64(sec))
    }

    pub fn from_days(days: f64) -> Self {
        Self::from_seconds(days * SECONDS_PER_DAY)
    }

    /// Seconds since J2000.
    pub fn seconds(self) -> f64 {
        self.0.as_seconds_f64()
    }

    /// Julian days since J2000.
    pub fn julian_days(self) -> f64 {
        self.seconds() / SECONDS_PER_DAY
    }

    /// Julian centuries since J2000.
    pub fn julian_centuries(self) -> f64 {
        self.julian_days() / DAYS_PER_CENTURY
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        Self(dt - j2000_datetime())
    }

    /// Calendar date of this epoch, `None` outside the years -9999..=9999.
    pub fn to_datetime(self) -> Option<OffsetDateTime> {
        j2000_datetime().checked_add(self.0)
    }

    /// `self + rhs`, `None` on overflow.
    pub fn checked_add(self, rhs: Duration) -> Option<Self> {
        self.0.checked_add(rhs).map(Self)
    }

    /// Parse an RFC 3339 timestamp, e.g. `2024-03-20T03:06:00Z`.
    pub fn parse_rfc3339(s: &str) -> Result<Self> {
        let dt = OffsetDateTime::parse(s, &Rfc3339)?;
        Ok(Self::from_datetime(dt))
    }
}

fn j2000_datetime() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + Duration::seconds(J2000_UNIX)
}

impl ops::Sub<Epoch> for Epoch {
    type Output = Duration;

    fn sub(self, rhs: Epoch) -> Self::Output {
        self.0 - rhs.0
    }
}

impl ops::Sub<Duration> for Epoch {
    type Output = Epoch;

    fn sub(self, rhs: Duration) -> Self::Output {
        Epoch(self.0 - rhs)
    }
}

impl ops::Add<Duration> for Epoch {
    type Output = Epoch;

    fn add(self, rhs: Duration) -> Self::Output {
        Epoch(self.0 + rhs)
    }
}

impl ops::AddAssign<Duration> for Epoch {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl ops::SubAssign<Duration> for Epoch {
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs;
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime().map(|dt| dt.format(&Rfc3339)) {
            Some(Ok(s)) => write!(f, "{s}"),
            _ => write!(f, "J2000{:+}s", self.seconds()),
        }
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({}s)", self.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn j2000_round_trips_through_rfc3339() {
        let epoch = Epoch::parse_rfc3339("2000-01-01T12:00:00Z").unwrap();
        assert_eq!(epoch, Epoch::J2000);
        assert_eq!(epoch.to_string(), "2000-01-01T12:00:00Z");
    }

    #[test]
    fn julian_conversions() {
        let epoch = Epoch::from_days(DAYS_PER_CENTURY);
        assert!((epoch.julian_days() - DAYS_PER_CENTURY).abs() < 1e-9);
        assert!((epoch.julian_centuries() - 1.0).abs() < 1e-12);
        let back = epoch - Duration::days(36_525);
        assert_eq!(back, Epoch::J2000);
    }

    #[test]
    fn far_epochs_display_as_offsets() {
        let epoch = Epoch::from_days(4_000_000.0);
        assert!(epoch.to_datetime().is_none());
        assert_eq!(epoch.to_string(), "J2000+345600000000s");
        assert_eq!(Epoch::from_days(-4_000_000.0).to_string(), "J2000-345600000000s");
    }

    #[test]
    fn checked_add_overflows_to_none() {
        assert_eq!(Epoch::J2000.checked_add(Duration::DAY), Some(Epoch::from_days(1.0)));
        assert!(Epoch::from_duration(Duration::MAX).checked_add(Duration::SECOND).is_none());
    }
}
