//! Time primitives: a possibly-undefined instant, a signed duration, a
//! wall-clock time-of-day and a day-of-week, with the comparison helpers
//! the extractor needs to treat an undefined endpoint as +/- infinity.

use std::cmp::Ordering;
use std::ops::{Add, Sub};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A point in time that may be undefined. Ordering between two defined
/// instants is total; comparing against an undefined instant is a logic
/// error the caller must avoid (the extractor's preconditions exist
/// precisely to rule this out before it happens).
///
/// Serializes as the underlying `Option<NaiveDateTime>` directly (an
/// ISO-8601-ish string, or `null` when undefined) rather than deriving,
/// since the undefined sentinel is a private invariant, not a struct
/// field serde should see as a nested object.
#[derive(Debug, Clone, Copy)]
pub struct Instant(Option<NaiveDateTime>);

impl Serialize for Instant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Instant(Option::<NaiveDateTime>::deserialize(deserializer)?))
    }
}

impl Instant {
    pub fn undefined() -> Self {
        Instant(None)
    }

    pub fn new(dt: NaiveDateTime) -> Self {
        Instant(Some(dt))
    }

    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).expect("invalid date");
        let time = NaiveTime::from_hms_opt(hour, min, sec).expect("invalid time");
        Instant(Some(NaiveDateTime::new(date, time)))
    }

    pub fn is_undefined(&self) -> bool {
        self.0.is_none()
    }

    /// Panics if undefined; only ever called after a precondition check.
    pub fn naive(&self) -> NaiveDateTime {
        self.0.expect("Instant is undefined")
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        let t = self.naive().time();
        TimeOfDay::new(t.hour() as u8, t.minute() as u8, t.second() as u8)
    }

    pub fn day_of_week(&self) -> DayOfWeek {
        DayOfWeek::from_chrono(self.naive().weekday())
    }

    pub fn date(&self) -> NaiveDate {
        self.naive().date()
    }
}

impl Default for Instant {
    fn default() -> Self {
        Instant::undefined()
    }
}

impl PartialEq for Instant {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Instant {}

impl PartialOrd for Instant {
    /// `None` whenever either side is undefined: comparisons of undefined
    /// instants are not meaningful and must be guarded by the caller.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.0, other.0) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        match self.0 {
            Some(dt) => Instant(Some(dt + rhs.0)),
            None => Instant(None),
        }
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration(self.naive() - rhs.naive())
    }
}

/// Returns whether `t < end`, treating an undefined `end` as +infinity.
pub fn lt_open_end(t: Instant, end: Instant) -> bool {
    end.is_undefined() || t < end
}

/// Returns whether `t > end`, treating an undefined `end` as +infinity
/// (so the comparison is always false).
pub fn gt_open_end(t: Instant, end: Instant) -> bool {
    !end.is_undefined() && t > end
}

/// `min(a, b)` treating an undefined side as +infinity, per the windowing
/// rule in the intake extractor ("treating undefined as +infinity on
/// either side").
pub fn min_end(a: Instant, b: Instant) -> Instant {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Instant::undefined(),
        (true, false) => b,
        (false, true) => a,
        (false, false) => {
            if a <= b {
                a
            } else {
                b
            }
        }
    }
}

/// A signed duration, convertible to hours as a real number. Serializes
/// as a plain `f64` number of hours -- `chrono::Duration` itself has no
/// serde support, and hours is the unit every caller already works in.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Duration(chrono::Duration);

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hours().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Duration::from_hours(f64::deserialize(deserializer)?))
    }
}

impl Duration {
    pub fn zero() -> Self {
        Duration(chrono::Duration::zero())
    }

    pub fn from_hours(hours: f64) -> Self {
        Duration(chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64))
    }

    pub fn from_days(days: f64) -> Self {
        Self::from_hours(days * 24.0)
    }

    pub fn to_hours(&self) -> f64 {
        self.0.num_milliseconds() as f64 / 3_600_000.0
    }

    /// True for a zero-length duration, matching `Duration::isEmpty()` in
    /// the original: used to detect a zero-time infusion.
    pub fn is_empty(&self) -> bool {
        self.0 == chrono::Duration::zero()
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Duration {
    fn sum<I: Iterator<Item = Duration>>(iter: I) -> Self {
        iter.fold(Duration::zero(), |a, b| a + b)
    }
}

/// The smaller of two durations.
pub fn min_duration(a: Duration, b: Duration) -> Duration {
    if a.0 <= b.0 {
        a
    } else {
        b
    }
}

/// A wall-clock time of day, used by `DailyDose`/`WeeklyDose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
    second: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        TimeOfDay { hour, minute, second }
    }

    pub fn to_duration_since_midnight(&self) -> Duration {
        Duration::from_hours(self.hour as f64 + self.minute as f64 / 60.0 + self.second as f64 / 3600.0)
    }
}

/// A day of the week, used by `WeeklyDose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn from_chrono(w: Weekday) -> Self {
        match w {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    /// Monday = 0 .. Sunday = 6, for arithmetic on day offsets.
    pub fn index(&self) -> i64 {
        match self {
            DayOfWeek::Monday => 0,
            DayOfWeek::Tuesday => 1,
            DayOfWeek::Wednesday => 2,
            DayOfWeek::Thursday => 3,
            DayOfWeek::Friday => 4,
            DayOfWeek::Saturday => 5,
            DayOfWeek::Sunday => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_instant_is_undefined() {
        assert!(Instant::undefined().is_undefined());
        assert!(!Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0).is_undefined());
    }

    #[test]
    fn defined_instants_totally_ordered() {
        let a = Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0);
        let b = Instant::from_ymd_hms(2020, 1, 2, 0, 0, 0);
        assert!(a < b);
        assert!(b > a);
        assert_eq!(b - a, Duration::from_hours(24.0));
    }

    #[test]
    fn undefined_end_treated_as_infinity() {
        let t = Instant::from_ymd_hms(2099, 1, 1, 0, 0, 0);
        assert!(lt_open_end(t, Instant::undefined()));
        assert!(!gt_open_end(t, Instant::undefined()));
    }

    #[test]
    fn duration_round_trips_hours() {
        let d = Duration::from_hours(36.5);
        assert!((d.to_hours() - 36.5).abs() < 1e-9);
    }

    #[test]
    fn weekly_day_of_week_from_instant() {
        // 2017-06-06 is a Tuesday.
        let t = Instant::from_ymd_hms(2017, 6, 6, 8, 30, 0);
        assert_eq!(t.day_of_week(), DayOfWeek::Tuesday);
    }
}
