//! Grouping of closed time entries into day/period invoice summaries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::TimeEntry;
use crate::tz::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct InvoiceDay {
    pub date: NaiveDate,
    pub hours: f64,
    pub earned: f64,
    /// Entries for the day, sorted by `start_time` ascending.
    pub entries: Vec<TimeEntry>,
}

#[derive(Debug, Clone)]
pub struct InvoicePeriod {
    pub days: Vec<InvoiceDay>,
    pub total_days: usize,
    pub total_hours: f64,
    pub total_earned: f64,
}

/// Groups closed entries by their attributed local date and sums hours and
/// earnings per day and for the whole period.
///
/// Open sessions are skipped. Stored `local_date` values are trusted as-is;
/// the offset is only consulted for raw entries that lack one. No rounding
/// happens here so repeated aggregation of the same set is bit-identical.
pub fn aggregate(
    entries: impl IntoIterator<Item = TimeEntry>,
    offset: UtcOffset,
    order: DateOrder,
) -> InvoicePeriod {
    let mut by_date: BTreeMap<NaiveDate, Vec<TimeEntry>> = BTreeMap::new();
    for entry in entries {
        if entry.is_open() {
            continue;
        }
        let date = entry.attributed_date(offset);
        by_date.entry(date).or_default().push(entry);
    }

    let mut days = Vec::with_capacity(by_date.len());
    let mut total_hours = 0.0;
    let mut total_earned = 0.0;
    for (date, mut entries) in by_date {
        entries.sort_by_key(|e| e.start_time);
        let mut hours = 0.0;
        let mut earned = 0.0;
        for e in &entries {
            let (h, money) = match (e.total_hours, e.total_earned) {
                (Some(h), Some(money)) => (h, money),
                // Closed entry missing derived fields: recompute on the fly
                _ => {
                    let end = match e.end_time {
                        Some(end) => end,
                        None => continue,
                    };
                    crate::domain::derive_totals(e.start_time, end, e.hourly_rate)
                }
            };
            hours += h;
            earned += money;
        }
        total_hours += hours;
        total_earned += earned;
        days.push(InvoiceDay {
            date,
            hours,
            earned,
            entries,
        });
    }

    if order == DateOrder::Desc {
        days.reverse();
    }

    InvoicePeriod {
        total_days: days.len(),
        total_hours,
        total_earned,
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentStatus, derive_totals};
    use chrono::{TimeZone, Utc};

    fn entry(id: i32, start: (u32, u32, u32, u32), dur_min: i64, rate: f64) -> TimeEntry {
        let (d, h, m, s) = start;
        let start = Utc.with_ymd_and_hms(2025, 4, d, h, m, s).unwrap();
        let end = start + chrono::Duration::minutes(dur_min);
        let (total_hours, total_earned) = derive_totals(start, end, rate);
        let offset: UtcOffset = "UTC-3".parse().unwrap();
        TimeEntry {
            id,
            owner_id: "alice".into(),
            start_time: start,
            end_time: Some(end),
            local_date: Some(offset.local_date_of(start)),
            hourly_rate: rate,
            total_hours: Some(total_hours),
            total_earned: Some(total_earned),
            payment_status: PaymentStatus::NotPaid,
            notes: None,
        }
    }

    fn open_entry(id: i32) -> TimeEntry {
        let mut e = entry(id, (5, 12, 0, 0), 60, 40.0);
        e.end_time = None;
        e.total_hours = None;
        e.total_earned = None;
        e
    }

    fn offset() -> UtcOffset {
        "UTC-3".parse().unwrap()
    }

    #[test]
    fn groups_by_local_date_and_sums_totals() {
        // 01:30Z on Apr 3 is still Apr 2 at UTC-3, so it joins the Apr 2 group
        let entries = vec![
            entry(1, (2, 13, 0, 0), 90, 50.0),
            entry(2, (3, 1, 30, 0), 30, 50.0),
            entry(3, (4, 14, 0, 0), 60, 60.0),
        ];
        let period = aggregate(entries, offset(), DateOrder::Asc);
        assert_eq!(period.total_days, 2);
        assert_eq!(period.days[0].date.to_string(), "2025-04-02");
        assert_eq!(period.days[0].entries.len(), 2);
        assert_eq!(period.days[0].hours, 2.0);
        assert_eq!(period.days[0].earned, 100.0);
        assert_eq!(period.days[1].date.to_string(), "2025-04-04");
        assert_eq!(period.total_hours, 3.0);
        assert_eq!(period.total_earned, 160.0);
    }

    #[test]
    fn open_sessions_are_excluded() {
        let period = aggregate(
            vec![entry(1, (2, 13, 0, 0), 90, 50.0), open_entry(2)],
            offset(),
            DateOrder::Asc,
        );
        assert_eq!(period.total_days, 1);
        assert_eq!(period.total_hours, 1.5);
        assert_eq!(period.total_earned, 75.0);
    }

    #[test]
    fn entries_within_a_day_sorted_by_start_ascending() {
        let entries = vec![
            entry(2, (2, 18, 0, 0), 30, 50.0),
            entry(1, (2, 13, 0, 0), 30, 50.0),
        ];
        let period = aggregate(entries, offset(), DateOrder::Asc);
        let ids: Vec<i32> = period.days[0].entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn descending_order_puts_latest_day_first() {
        let entries = vec![
            entry(1, (2, 13, 0, 0), 30, 50.0),
            entry(2, (4, 13, 0, 0), 30, 50.0),
        ];
        let period = aggregate(entries, offset(), DateOrder::Desc);
        assert_eq!(period.days[0].date.to_string(), "2025-04-04");
        assert_eq!(period.days[1].date.to_string(), "2025-04-02");
    }

    #[test]
    fn stored_local_date_wins_over_derivation() {
        // The stored date was assigned at creation; later start_time edits
        // that kept the same local day must not move the entry.
        let mut e = entry(1, (2, 13, 0, 0), 30, 50.0);
        e.local_date = Some(chrono::NaiveDate::from_ymd_opt(2025, 3, 30).unwrap());
        let period = aggregate(vec![e], offset(), DateOrder::Asc);
        assert_eq!(period.days[0].date.to_string(), "2025-03-30");
    }

    #[test]
    fn raw_entries_without_local_date_are_derived() {
        let mut e = entry(1, (3, 1, 30, 0), 30, 50.0);
        e.local_date = None;
        let period = aggregate(vec![e], offset(), DateOrder::Asc);
        // 2025-04-03T01:30Z at UTC-3 is the evening of Apr 2
        assert_eq!(period.days[0].date.to_string(), "2025-04-02");
    }

    #[test]
    fn aggregation_is_idempotent_and_monotone() {
        let base = vec![
            entry(1, (2, 13, 0, 0), 90, 50.0),
            entry(2, (4, 14, 0, 0), 60, 60.0),
        ];
        let a = aggregate(base.clone(), offset(), DateOrder::Asc);
        let b = aggregate(base.clone(), offset(), DateOrder::Asc);
        assert_eq!(a.total_hours, b.total_hours);
        assert_eq!(a.total_earned, b.total_earned);

        let mut superset = base;
        superset.push(entry(3, (6, 9, 0, 0), 15, 100.0));
        let c = aggregate(superset, offset(), DateOrder::Asc);
        assert!(c.total_hours >= a.total_hours);
        assert!(c.total_earned >= a.total_earned);
        for day in &a.days {
            let same = c.days.iter().find(|d| d.date == day.date).unwrap();
            assert!(same.hours >= day.hours);
            assert!(same.earned >= day.earned);
        }
    }
}
