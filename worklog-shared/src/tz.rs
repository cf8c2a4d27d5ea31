//! Fixed-offset timezone conversion.
//!
//! Every calendar-date attribution in the system goes through
//! [`UtcOffset::local_date_of`]. Taking the date component of a UTC instant
//! directly is exactly the off-by-one-day bug this module exists to prevent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TzError {
    #[error("invalid offset: {0}")]
    InvalidOffset(String),
}

/// A fixed UTC offset as configured per owner, e.g. `UTC`, `UTC-3`,
/// `UTC+5:30`. Minutes are restricted to quarter-hour granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcOffset(FixedOffset);

impl UtcOffset {
    /// Interprets `local` as wall-clock time at this offset and returns the
    /// equivalent UTC instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc_naive = local - Duration::seconds(self.0.local_minus_utc() as i64);
        Utc.from_utc_datetime(&utc_naive)
    }

    /// Converts a UTC instant to wall-clock time at this offset.
    pub fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.0).naive_local()
    }

    /// The calendar date `utc` falls on at this offset.
    pub fn local_date_of(&self, utc: DateTime<Utc>) -> NaiveDate {
        self.to_local(utc).date()
    }

    pub fn utc() -> Self {
        UtcOffset(Utc.fix())
    }
}

impl FromStr for UtcOffset {
    type Err = TzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TzError::InvalidOffset(s.to_string());
        let rest = s.strip_prefix("UTC").ok_or_else(invalid)?;
        if rest.is_empty() {
            return Ok(UtcOffset::utc());
        }
        let (sign, rest) = match rest.as_bytes()[0] {
            b'+' => (1i32, &rest[1..]),
            b'-' => (-1i32, &rest[1..]),
            _ => return Err(invalid()),
        };
        let (hours_str, minutes_str) = match rest.split_once(':') {
            Some((h, m)) => (h, Some(m)),
            None => (rest, None),
        };
        // Bare digits only; `u32::from_str` would still accept a sign here
        fn digits(s: &str) -> Option<u32> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse().ok()
        }
        let hours = digits(hours_str).ok_or_else(invalid)?;
        if hours > 14 {
            return Err(invalid());
        }
        let minutes = match minutes_str {
            Some(m) if m.len() == 2 => digits(m).ok_or_else(invalid)?,
            Some(_) => return Err(invalid()),
            None => 0,
        };
        // Real-world offsets are whole, half or quarter hours, at most 14:00
        if minutes >= 60 || minutes % 15 != 0 || (hours == 14 && minutes != 0) {
            return Err(invalid());
        }
        let secs = sign * ((hours * 3600 + minutes * 60) as i32);
        FixedOffset::east_opt(secs).map(UtcOffset).ok_or_else(invalid)
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.local_minus_utc();
        if total == 0 {
            return write!(f, "UTC");
        }
        let sign = if total < 0 { '-' } else { '+' };
        let abs = total.abs();
        let (hours, minutes) = (abs / 3600, (abs % 3600) / 60);
        if minutes == 0 {
            write!(f, "UTC{}{}", sign, hours)
        } else {
            write!(f, "UTC{}{}:{:02}", sign, hours, minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn offset(s: &str) -> UtcOffset {
        s.parse().expect(s)
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn parses_whole_half_and_quarter_hours() {
        assert_eq!(offset("UTC").to_string(), "UTC");
        assert_eq!(offset("UTC-3").to_string(), "UTC-3");
        assert_eq!(offset("UTC+5:30").to_string(), "UTC+5:30");
        assert_eq!(offset("UTC+5:45").to_string(), "UTC+5:45");
        assert_eq!(offset("UTC-9:30").to_string(), "UTC-9:30");
        assert_eq!(offset("UTC+14").to_string(), "UTC+14");
    }

    #[test]
    fn rejects_malformed_offsets() {
        for bad in [
            "", "GMT-3", "UTC-", "UTC3", "UTC-3:20", "UTC+15", "UTC+14:30", "UTC+1:5",
        ] {
            assert!(
                bad.parse::<UtcOffset>().is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_signs_inside_the_digits() {
        // A sign after the first one must not be swallowed by the number
        // parser; "UTC--3" is not UTC+3.
        for bad in ["UTC--3", "UTC+-3", "UTC++3", "UTC-+3", "UTC+1:-0", "UTC+1:+5"] {
            assert!(
                bad.parse::<UtcOffset>().is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn round_trips_local_wall_clock() {
        for name in ["UTC", "UTC-3", "UTC+5:30", "UTC-9:45", "UTC+12"] {
            let o = offset(name);
            let dt = local(2025, 3, 31, 23, 30);
            assert_eq!(o.to_local(o.to_utc(dt)), dt, "offset {name}");
        }
    }

    #[test]
    fn late_evening_keeps_its_local_date() {
        // 2025-03-31 23:30 at UTC-3 is 2025-04-01T02:30Z, but the entry
        // still belongs to March 31 locally.
        let o = offset("UTC-3");
        let utc = o.to_utc(local(2025, 3, 31, 23, 30));
        assert_eq!(utc.to_rfc3339(), "2025-04-01T02:30:00+00:00");
        assert_eq!(
            o.local_date_of(utc),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
    }

    #[test]
    fn half_hour_offset_shifts_date_forward() {
        let o = offset("UTC+5:30");
        let utc = o.to_utc(local(2025, 1, 1, 0, 15));
        // 00:15 IST is 18:45 the previous day in UTC
        assert_eq!(utc.to_rfc3339(), "2024-12-31T18:45:00+00:00");
        assert_eq!(
            o.local_date_of(utc),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }
}
