pub mod models;
pub mod schema;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::DatabaseErrorKind;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{NewTimeEntry, NewUserSetting, TimeEntryRow, UserSetting};
use tracing::trace;
use worklog_shared::domain::{PaymentStatus, TimeEntry, derive_totals};
use worklog_shared::tz::UtcOffset;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The owner already has an open session.
    #[error("a session is already running")]
    SessionAlreadyActive,

    /// Stop was requested but no matching open session exists.
    #[error("no active session")]
    NoActiveSession,

    /// An entry's end would not be strictly after its start.
    #[error("end time must be after start time")]
    InvalidInterval,

    #[error("entry not found: {0}")]
    EntryNotFound(i32),

    /// The entry exists but belongs to a different owner.
    #[error("entry {0} not owned by caller")]
    NotOwner(i32),
}

/// Field-wise patch applied to an existing entry. Absent fields keep their
/// stored values; `None` never clears `notes` or reopens `end_time`.
#[derive(Debug, Default, Clone)]
pub struct EntryPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub hourly_rate: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Seeds per-owner settings for users declared in the config. Existing
    /// rows are left alone so settings edited over the API survive restarts.
    pub async fn seed_settings(
        &self,
        users: &[(String, String, f64)],
    ) -> Result<(), StorageError> {
        use schema::user_settings;

        let pool = self.pool.clone();
        let users_owned = users.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            for (owner, offset, rate) in &users_owned {
                let row = NewUserSetting {
                    owner_id: owner,
                    timezone_offset: offset,
                    default_hourly_rate: *rate,
                };
                diesel::insert_into(user_settings::table)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)?;
            }
            Ok(())
        })
        .await?
    }

    pub async fn get_settings(&self, owner: &str) -> Result<Option<UserSetting>, StorageError> {
        use schema::user_settings::dsl as us;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<UserSetting>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(us::user_settings
                .filter(us::owner_id.eq(&owner_owned))
                .first::<UserSetting>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn upsert_settings(
        &self,
        owner: &str,
        timezone_offset: &str,
        default_hourly_rate: f64,
    ) -> Result<UserSetting, StorageError> {
        use schema::user_settings::dsl as us;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        let offset_owned = timezone_offset.to_string();
        tokio::task::spawn_blocking(move || -> Result<UserSetting, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = NewUserSetting {
                owner_id: &owner_owned,
                timezone_offset: &offset_owned,
                default_hourly_rate,
            };
            diesel::insert_into(us::user_settings)
                .values(&row)
                .on_conflict(us::owner_id)
                .do_update()
                .set((
                    us::timezone_offset.eq(&offset_owned),
                    us::default_hourly_rate.eq(default_hourly_rate),
                ))
                .execute(&mut conn)?;
            Ok(us::user_settings
                .filter(us::owner_id.eq(&owner_owned))
                .first::<UserSetting>(&mut conn)?)
        })
        .await?
    }

    /// Opens a session for `owner` with `start_time = now`. The partial
    /// unique index on open entries turns a concurrent double-start into a
    /// unique violation, which surfaces as `SessionAlreadyActive`.
    pub async fn start_session(
        &self,
        owner: &str,
        hourly_rate: f64,
        now: DateTime<Utc>,
        offset: UtcOffset,
    ) -> Result<TimeEntry, StorageError> {
        use schema::time_entries;
        if hourly_rate <= 0.0 {
            return Err(StorageError::InvalidInput(
                "hourly_rate must be positive".to_string(),
            ));
        }
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        let local_date = offset.local_date_of(now);
        trace!(owner = %owner_owned, %local_date, "start_session");
        tokio::task::spawn_blocking(move || -> Result<TimeEntry, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_row = NewTimeEntry {
                owner_id: &owner_owned,
                start_time: now.naive_utc(),
                end_time: None,
                local_date,
                hourly_rate,
                total_hours: None,
                total_earned: None,
                payment_status: PaymentStatus::NotPaid.as_str(),
                notes: None,
            };
            let row = diesel::insert_into(time_entries::table)
                .values(&new_row)
                .get_result::<TimeEntryRow>(&mut conn)
                .map_err(|e| match e {
                    diesel::result::Error::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => StorageError::SessionAlreadyActive,
                    other => StorageError::Database(other),
                })?;
            row.into_domain()
        })
        .await?
    }

    /// Read-only poll for the owner's open session, safe at any cadence.
    pub async fn active_session(&self, owner: &str) -> Result<Option<TimeEntry>, StorageError> {
        use schema::time_entries::dsl as te;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<TimeEntry>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = te::time_entries
                .filter(te::owner_id.eq(&owner_owned))
                .filter(te::end_time.is_null())
                .first::<TimeEntryRow>(&mut conn)
                .optional()?;
            row.map(TimeEntryRow::into_domain).transpose()
        })
        .await?
    }

    /// Closes the open session: sets `end_time` and both derived totals in
    /// one UPDATE. `local_date` keeps the value assigned at start.
    pub async fn stop_session(
        &self,
        owner: &str,
        entry_id: i32,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry, StorageError> {
        use schema::time_entries::dsl as te;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<TimeEntry, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let row = te::time_entries
                    .filter(te::id.eq(entry_id))
                    .filter(te::owner_id.eq(&owner_owned))
                    .filter(te::end_time.is_null())
                    .first::<TimeEntryRow>(conn)
                    .optional()?
                    .ok_or(StorageError::NoActiveSession)?;
                let start = DateTime::from_naive_utc_and_offset(row.start_time, Utc);
                if now <= start {
                    return Err(StorageError::InvalidInterval);
                }
                let (hours, earned) = derive_totals(start, now, row.hourly_rate);
                let updated = diesel::update(te::time_entries.filter(te::id.eq(row.id)))
                    .set((
                        te::end_time.eq(Some(now.naive_utc())),
                        te::total_hours.eq(Some(hours)),
                        te::total_earned.eq(Some(earned)),
                    ))
                    .get_result::<TimeEntryRow>(conn)?;
                updated.into_domain()
            })
        })
        .await?
    }

    /// Inserts a backfilled, already-closed entry. Validation happens before
    /// anything is written.
    pub async fn create_entry(
        &self,
        owner: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        hourly_rate: f64,
        payment_status: PaymentStatus,
        notes: Option<String>,
        offset: UtcOffset,
    ) -> Result<TimeEntry, StorageError> {
        use schema::time_entries;
        if end <= start {
            return Err(StorageError::InvalidInterval);
        }
        if hourly_rate <= 0.0 {
            return Err(StorageError::InvalidInput(
                "hourly_rate must be positive".to_string(),
            ));
        }
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        let local_date = offset.local_date_of(start);
        let (hours, earned) = derive_totals(start, end, hourly_rate);
        tokio::task::spawn_blocking(move || -> Result<TimeEntry, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_row = NewTimeEntry {
                owner_id: &owner_owned,
                start_time: start.naive_utc(),
                end_time: Some(end.naive_utc()),
                local_date,
                hourly_rate,
                total_hours: Some(hours),
                total_earned: Some(earned),
                payment_status: payment_status.as_str(),
                notes: notes.as_deref(),
            };
            let row = diesel::insert_into(time_entries::table)
                .values(&new_row)
                .get_result::<TimeEntryRow>(&mut conn)?;
            row.into_domain()
        })
        .await?
    }

    /// Applies a patch to an entry in one transaction: re-validates the
    /// interval, recomputes totals, and moves `local_date` only when the
    /// patched start lands on a different local day.
    pub async fn update_entry(
        &self,
        owner: &str,
        entry_id: i32,
        patch: EntryPatch,
        offset: UtcOffset,
    ) -> Result<TimeEntry, StorageError> {
        use schema::time_entries::dsl as te;
        if let Some(rate) = patch.hourly_rate
            && rate <= 0.0
        {
            return Err(StorageError::InvalidInput(
                "hourly_rate must be positive".to_string(),
            ));
        }
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<TimeEntry, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let row = te::time_entries
                    .filter(te::id.eq(entry_id))
                    .first::<TimeEntryRow>(conn)
                    .optional()?
                    .ok_or(StorageError::EntryNotFound(entry_id))?;
                if row.owner_id != owner_owned {
                    return Err(StorageError::NotOwner(entry_id));
                }

                let stored_start = DateTime::from_naive_utc_and_offset(row.start_time, Utc);
                let stored_end = row
                    .end_time
                    .map(|t| DateTime::from_naive_utc_and_offset(t, Utc));
                let new_start = patch.start_time.unwrap_or(stored_start);
                let new_end = patch.end_time.or(stored_end);
                let new_rate = patch.hourly_rate.unwrap_or(row.hourly_rate);

                let (total_hours, total_earned) = match new_end {
                    Some(end) => {
                        if end <= new_start {
                            return Err(StorageError::InvalidInterval);
                        }
                        let (h, money) = derive_totals(new_start, end, new_rate);
                        (Some(h), Some(money))
                    }
                    None => (None, None),
                };

                // local_date follows start_time edits only when the local
                // calendar day actually changes
                let new_local_date: NaiveDate = if patch.start_time.is_some() {
                    let derived = offset.local_date_of(new_start);
                    if derived != row.local_date {
                        derived
                    } else {
                        row.local_date
                    }
                } else {
                    row.local_date
                };

                let new_status = patch.payment_status.map(|s| s.as_str().to_string());
                let updated = diesel::update(te::time_entries.filter(te::id.eq(entry_id)))
                    .set((
                        te::start_time.eq(new_start.naive_utc()),
                        te::end_time.eq(new_end.map(|t| t.naive_utc())),
                        te::local_date.eq(new_local_date),
                        te::hourly_rate.eq(new_rate),
                        te::total_hours.eq(total_hours),
                        te::total_earned.eq(total_earned),
                        te::payment_status
                            .eq(new_status.unwrap_or_else(|| row.payment_status.clone())),
                        te::notes.eq(patch.notes.clone().or_else(|| row.notes.clone())),
                    ))
                    .get_result::<TimeEntryRow>(conn)?;
                updated.into_domain()
            })
        })
        .await?
    }

    pub async fn delete_entry(&self, owner: &str, entry_id: i32) -> Result<(), StorageError> {
        use schema::time_entries::dsl as te;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let row = te::time_entries
                    .filter(te::id.eq(entry_id))
                    .first::<TimeEntryRow>(conn)
                    .optional()?
                    .ok_or(StorageError::EntryNotFound(entry_id))?;
                if row.owner_id != owner_owned {
                    return Err(StorageError::NotOwner(entry_id));
                }
                diesel::delete(te::time_entries.filter(te::id.eq(entry_id))).execute(conn)?;
                Ok(())
            })
        })
        .await?
    }

    /// Lists entries filtered by inclusive local-date range and payment
    /// status, ordered by `start_time` ascending.
    pub async fn list_entries(
        &self,
        owner: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<TimeEntry>, StorageError> {
        use schema::time_entries::dsl as te;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<TimeEntry>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = te::time_entries
                .filter(te::owner_id.eq(&owner_owned))
                .into_boxed();
            if let Some(from) = from {
                query = query.filter(te::local_date.ge(from));
            }
            if let Some(to) = to {
                query = query.filter(te::local_date.le(to));
            }
            if let Some(status) = status {
                query = query.filter(te::payment_status.eq(status.as_str()));
            }
            let rows = query
                .order(te::start_time.asc())
                .load::<TimeEntryRow>(&mut conn)?;
            rows.into_iter().map(TimeEntryRow::into_domain).collect()
        })
        .await?
    }

    /// Sets the payment status on each entry independently. Ids that are
    /// missing or owned by someone else are reported as failures without
    /// rolling back the ones that succeeded.
    pub async fn bulk_update_payment_status(
        &self,
        owner: &str,
        entry_ids: Vec<i32>,
        status: PaymentStatus,
    ) -> Result<(Vec<i32>, Vec<(i32, String)>), StorageError> {
        use schema::time_entries::dsl as te;
        let pool = self.pool.clone();
        let owner_owned = owner.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<(Vec<i32>, Vec<(i32, String)>), StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let mut succeeded = Vec::new();
                let mut failed = Vec::new();
                for entry_id in entry_ids {
                    let result = diesel::update(
                        te::time_entries
                            .filter(te::id.eq(entry_id))
                            .filter(te::owner_id.eq(&owner_owned)),
                    )
                    .set(te::payment_status.eq(status.as_str()))
                    .execute(&mut conn);
                    match result {
                        Ok(0) => {
                            let exists: i64 = te::time_entries
                                .filter(te::id.eq(entry_id))
                                .count()
                                .get_result(&mut conn)?;
                            let reason = if exists > 0 {
                                "not owned by caller"
                            } else {
                                "not found"
                            };
                            failed.push((entry_id, reason.to_string()));
                        }
                        Ok(_) => succeeded.push(entry_id),
                        Err(e) => failed.push((entry_id, e.to_string())),
                    }
                }
                Ok((succeeded, failed))
            },
        )
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
