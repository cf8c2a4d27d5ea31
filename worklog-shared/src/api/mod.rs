use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{PaymentStatus, TimeEntry, round_currency};
use crate::invoice::{DateOrder, InvoiceDay, InvoicePeriod};

pub mod endpoints;

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Time entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntryDto {
    pub id: i32,
    pub start_time: String, // RFC3339 UTC
    pub end_time: Option<String>, // RFC3339 UTC
    pub local_date: Option<NaiveDate>,
    pub hourly_rate: f64,
    pub total_hours: Option<f64>,
    pub total_earned: Option<f64>, // rounded to 2 decimals
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
}

impl From<TimeEntry> for TimeEntryDto {
    fn from(e: TimeEntry) -> Self {
        TimeEntryDto {
            id: e.id,
            start_time: e.start_time.to_rfc3339(),
            end_time: e.end_time.map(|t| t.to_rfc3339()),
            local_date: e.local_date,
            hourly_rate: e.hourly_rate,
            total_hours: e.total_hours,
            total_earned: e.total_earned.map(round_currency),
            payment_status: e.payment_status,
            notes: e.notes,
        }
    }
}

// Sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionReq {
    /// Defaults to the owner's configured default rate.
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopSessionReq {
    pub entry_id: i32,
}

// Backfilled (already closed) entries
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEntryReq {
    pub start_time: String, // RFC3339
    pub end_time: String,   // RFC3339
    pub hourly_rate: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

/// Partial update; absent fields keep their stored values. JSON `null` is
/// treated the same as absent, so `notes` can be replaced but not cleared
/// and a closed entry cannot be reopened through a patch.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateEntryReq {
    pub start_time: Option<String>, // RFC3339
    pub end_time: Option<String>,   // RFC3339
    pub hourly_rate: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

// Bulk payment-status update
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkStatusReq {
    pub entry_ids: Vec<i32>,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkItemError {
    pub entry_id: i32,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkStatusResp {
    pub succeeded: Vec<i32>,
    pub failed: Vec<BulkItemError>,
}

// Invoices
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceDayDto {
    pub date: NaiveDate,
    pub hours: f64,
    pub earned: f64, // rounded to 2 decimals
    pub entries: Vec<TimeEntryDto>,
}

impl From<InvoiceDay> for InvoiceDayDto {
    fn from(d: InvoiceDay) -> Self {
        InvoiceDayDto {
            date: d.date,
            hours: d.hours,
            earned: round_currency(d.earned),
            entries: d.entries.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoicePeriodDto {
    pub total_days: usize,
    pub total_hours: f64,
    pub total_earned: f64, // rounded to 2 decimals
    pub days: Vec<InvoiceDayDto>,
}

impl From<InvoicePeriod> for InvoicePeriodDto {
    fn from(p: InvoicePeriod) -> Self {
        InvoicePeriodDto {
            total_days: p.total_days,
            total_hours: p.total_hours,
            total_earned: round_currency(p.total_earned),
            days: p.days.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<PaymentStatus>,
    pub order: Option<DateOrder>,
}

// Share links
#[derive(Debug, Serialize, Deserialize)]
pub struct ShareReq {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub status: Option<PaymentStatus>,
    pub ttl_days: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResp {
    pub token: String,
    pub public_url: String,
    pub expires_at: String, // RFC3339 UTC
}

// Per-owner settings
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsDto {
    pub timezone_offset: String,
    pub default_hourly_rate: f64,
}
