use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tz::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotPaid,
    InvoicedNotApproved,
    InvoicedApproved,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "not_paid",
            PaymentStatus::InvoicedNotApproved => "invoiced_not_approved",
            PaymentStatus::InvoicedApproved => "invoiced_approved",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_paid" => Ok(PaymentStatus::NotPaid),
            "invoiced_not_approved" => Ok(PaymentStatus::InvoicedNotApproved),
            "invoiced_approved" => Ok(PaymentStatus::InvoicedApproved),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A single worked interval. `end_time == None` means the entry is the
/// owner's active session; totals are absent until the session is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i32,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Calendar date the entry is attributed to, derived from `start_time`
    /// in the owner's offset when the entry was created. Entries coming
    /// from external imports may lack it; see [`TimeEntry::attributed_date`].
    pub local_date: Option<NaiveDate>,
    pub hourly_rate: f64,
    pub total_hours: Option<f64>,
    pub total_earned: Option<f64>,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// The stored local date, falling back to deriving it from `start_time`
    /// for raw entries that never had one assigned.
    pub fn attributed_date(&self, offset: UtcOffset) -> NaiveDate {
        self.local_date
            .unwrap_or_else(|| offset.local_date_of(self.start_time))
    }
}

/// Recomputes the derived totals of a closed interval. Hours keep full
/// fractional precision; rounding happens only at the DTO boundary.
pub fn derive_totals(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hourly_rate: f64,
) -> (f64, f64) {
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    (hours, hours * hourly_rate)
}

/// Rounds a currency amount to 2 decimal places. Only for display/DTO
/// conversion, never during aggregation.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn payment_status_wire_strings() {
        for (status, s) in [
            (PaymentStatus::NotPaid, "not_paid"),
            (PaymentStatus::InvoicedNotApproved, "invoiced_not_approved"),
            (PaymentStatus::InvoicedApproved, "invoiced_approved"),
            (PaymentStatus::Paid, "paid"),
        ] {
            assert_eq!(status.as_str(), s);
            assert_eq!(s.parse::<PaymentStatus>().unwrap(), status);
            assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{s}\""));
        }
        assert!("open".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn ninety_minutes_at_fifty_an_hour() {
        let start = Utc.with_ymd_and_hms(2025, 4, 2, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 4, 2, 11, 30, 0).unwrap();
        let (hours, earned) = derive_totals(start, end, 50.0);
        assert_eq!(hours, 1.5);
        assert_eq!(earned, 75.0);
    }

    #[test]
    fn totals_survive_repeated_recomputation() {
        let start = Utc.with_ymd_and_hms(2025, 4, 2, 9, 12, 40).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 4, 2, 17, 3, 5).unwrap();
        let first = derive_totals(start, end, 83.25);
        for _ in 0..10 {
            assert_eq!(derive_totals(start, end, 83.25), first);
        }
        assert!((first.1 - first.0 * 83.25).abs() < 1e-9);
    }

    #[test]
    fn rounding_only_touches_cents() {
        assert_eq!(round_currency(75.0), 75.0);
        assert_eq!(round_currency(0.125 * 33.0), 4.13);
        assert_eq!(round_currency(10.004999), 10.0);
    }
}
