use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use worklog_shared::domain::{PaymentStatus, TimeEntry};

use crate::storage::StorageError;
use crate::storage::schema::{time_entries, user_settings};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = time_entries)]
pub struct TimeEntryRow {
    pub id: i32,
    pub owner_id: String,
    /// Naive UTC; converted to `DateTime<Utc>` at the domain boundary.
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub local_date: NaiveDate,
    pub hourly_rate: f64,
    pub total_hours: Option<f64>,
    pub total_earned: Option<f64>,
    pub payment_status: String,
    pub notes: Option<String>,
}

impl TimeEntryRow {
    pub fn into_domain(self) -> Result<TimeEntry, StorageError> {
        let payment_status: PaymentStatus = self
            .payment_status
            .parse()
            .map_err(StorageError::InvalidInput)?;
        Ok(TimeEntry {
            id: self.id,
            owner_id: self.owner_id,
            start_time: DateTime::from_naive_utc_and_offset(self.start_time, Utc),
            end_time: self
                .end_time
                .map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
            local_date: Some(self.local_date),
            hourly_rate: self.hourly_rate,
            total_hours: self.total_hours,
            total_earned: self.total_earned,
            payment_status,
            notes: self.notes,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = time_entries)]
pub struct NewTimeEntry<'a> {
    pub owner_id: &'a str,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub local_date: NaiveDate,
    pub hourly_rate: f64,
    pub total_hours: Option<f64>,
    pub total_earned: Option<f64>,
    pub payment_status: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = user_settings)]
#[diesel(primary_key(owner_id))]
pub struct UserSetting {
    pub owner_id: String,
    pub timezone_offset: String,
    pub default_hourly_rate: f64,
}

#[derive(Insertable)]
#[diesel(table_name = user_settings)]
pub struct NewUserSetting<'a> {
    pub owner_id: &'a str,
    pub timezone_offset: &'a str,
    pub default_hourly_rate: f64,
}
