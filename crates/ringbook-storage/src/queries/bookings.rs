// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking CRUD, status transitions, TAT milestones, and sweep queries.
//!
//! Status writes here are mechanical; the transition rules live in the
//! dispatch crate's lifecycle manager, which is the only caller.

use chrono::{DateTime, Utc};
use ringbook_core::types::{Booking, BookingStatus, BookingType};
use ringbook_core::RingbookError;
use rusqlite::params;

use crate::database::{
    enum_from_db, map_db_err, ts_from_db, ts_opt_from_db, ts_opt_to_db, ts_to_db, Database,
};

fn booking_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        booking_id: row.get(0)?,
        booking_uuid: row.get(1)?,
        user_id: row.get(2)?,
        agent_id: row.get(3)?,
        start_time: ts_opt_from_db(4, row.get(4)?)?,
        end_time: ts_opt_from_db(5, row.get(5)?)?,
        duration_mins: row.get(6)?,
        status: enum_from_db(7, row.get(7)?)?,
        booking_type: enum_from_db(8, row.get(8)?)?,
        is_sticky_agent: row.get::<_, i64>(9)? != 0,
        is_queued: row.get::<_, i64>(10)? != 0,
        retry_count: row.get(11)?,
        first_agent_rang_at: ts_opt_from_db(12, row.get(12)?)?,
        first_agent_answered_at: ts_opt_from_db(13, row.get(13)?)?,
        first_user_rang_at: ts_opt_from_db(14, row.get(14)?)?,
        first_user_answered_at: ts_opt_from_db(15, row.get(15)?)?,
        first_user_hangup_at: ts_opt_from_db(16, row.get(16)?)?,
        last_call_attempted_at: ts_opt_from_db(17, row.get(17)?)?,
        last_scheduled_at: ts_opt_from_db(18, row.get(18)?)?,
        last_scheduled_for: ts_opt_from_db(19, row.get(19)?)?,
        created_at: ts_from_db(20, row.get(20)?)?,
    })
}

const BOOKING_COLUMNS: &str = "booking_id, booking_uuid, user_id, agent_id, start_time, \
    end_time, duration_mins, status, booking_type, is_sticky_agent, is_queued, retry_count, \
    first_agent_rang_at, first_agent_answered_at, first_user_rang_at, first_user_answered_at, \
    first_user_hangup_at, last_call_attempted_at, last_scheduled_at, last_scheduled_for, \
    created_at";

/// Fields for a new booking row.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i64,
    pub agent_id: i64,
    pub duration_mins: i64,
    pub status: BookingStatus,
    pub booking_type: BookingType,
    pub is_sticky_agent: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Insert a new booking.
pub async fn insert_booking(db: &Database, new: NewBooking) -> Result<Booking, RingbookError> {
    let uuid = uuid::Uuid::new_v4().to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bookings (booking_uuid, user_id, agent_id, start_time, end_time,
                                       duration_mins, status, booking_type, is_sticky_agent,
                                       is_queued, retry_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10, ?10)",
                params![
                    uuid,
                    new.user_id,
                    new.agent_id,
                    ts_opt_to_db(new.start_time),
                    ts_opt_to_db(new.end_time),
                    new.duration_mins,
                    new.status.to_string(),
                    new.booking_type.to_string(),
                    new.is_sticky_agent as i64,
                    now,
                ],
            )?;
            let booking_id = conn.last_insert_rowid();
            let booking = conn.query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?1"),
                params![booking_id],
                booking_from_row,
            )?;
            Ok(booking)
        })
        .await
        .map_err(map_db_err)
}

/// Fetch a booking by internal id.
pub async fn get_booking(db: &Database, booking_id: i64) -> Result<Option<Booking>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?1"),
                params![booking_id],
                booking_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
        })
        .await
        .map_err(map_db_err)
}

/// Fetch a booking by public uuid.
pub async fn get_booking_by_uuid(
    db: &Database,
    booking_uuid: &str,
) -> Result<Option<Booking>, RingbookError> {
    let booking_uuid = booking_uuid.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_uuid = ?1"),
                params![booking_uuid],
                booking_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
        })
        .await
        .map_err(map_db_err)
}

/// Update a booking's status, optionally also setting the queued flag.
pub async fn update_status(
    db: &Database,
    booking_id: i64,
    status: BookingStatus,
    is_queued: Option<bool>,
) -> Result<(), RingbookError> {
    let status = status.to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            match is_queued {
                Some(queued) => conn.execute(
                    "UPDATE bookings SET status = ?1, is_queued = ?2, updated_at = ?3
                     WHERE booking_id = ?4",
                    params![status, queued as i64, now, booking_id],
                )?,
                None => conn.execute(
                    "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE booking_id = ?3",
                    params![status, now, booking_id],
                )?,
            };
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Apply a schedule: set times, move to SCHEDULED, clear the queued flag,
/// bump the scheduling counter, and record the TAT fields.
pub async fn apply_schedule(
    db: &Database,
    booking_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<(), RingbookError> {
    let start = ts_to_db(start_time);
    let end = ts_to_db(end_time);
    let status = BookingStatus::Scheduled.to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bookings
                 SET start_time = ?1, end_time = ?2, status = ?3, is_queued = 0,
                     retry_count = retry_count + 1, last_scheduled_at = ?4,
                     last_scheduled_for = ?1, updated_at = ?4
                 WHERE booking_id = ?5",
                params![start, end, status, now, booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Set only the queued flag.
pub async fn set_queued(
    db: &Database,
    booking_id: i64,
    is_queued: bool,
) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bookings SET is_queued = ?1, updated_at = ?2 WHERE booking_id = ?3",
                params![is_queued as i64, now, booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Pin the booking's agent.
pub async fn set_agent(db: &Database, booking_id: i64, agent_id: i64) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bookings SET agent_id = ?1, updated_at = ?2 WHERE booking_id = ?3",
                params![agent_id, now, booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Pin the booking as sticky to `agent_id`.
///
/// Conditional on the booking not already being sticky, so a duplicate
/// first-answer event cannot re-pin. Returns whether the row changed.
pub async fn pin_sticky(
    db: &Database,
    booking_id: i64,
    agent_id: i64,
) -> Result<bool, RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE bookings SET is_sticky_agent = 1, agent_id = ?1, updated_at = ?2
                 WHERE booking_id = ?3 AND is_sticky_agent = 0",
                params![agent_id, now, booking_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_db_err)
}

/// Bookings for a user in any of the given statuses, optionally filtered by
/// queued flag.
pub async fn for_user_with_status(
    db: &Database,
    user_id: i64,
    statuses: &[BookingStatus],
    is_queued: Option<bool>,
) -> Result<Vec<Booking>, RingbookError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
    db.connection()
        .call(move |conn| {
            let placeholders = vec!["?"; statuses.len()].join(", ");
            let mut sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE user_id = ? AND status IN ({placeholders})"
            );
            let mut values: Vec<rusqlite::types::Value> = vec![user_id.into()];
            values.extend(statuses.iter().map(|s| rusqlite::types::Value::from(s.clone())));
            if let Some(queued) = is_queued {
                sql.push_str(" AND is_queued = ?");
                values.push((queued as i64).into());
            }
            sql.push_str(" ORDER BY booking_id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), booking_from_row)?;
            let mut bookings = Vec::new();
            for row in rows {
                bookings.push(row?);
            }
            Ok(bookings)
        })
        .await
        .map_err(map_db_err)
}

/// AWAITING_SCHEDULE bookings created before `older_than` but within the
/// current calendar day (`day_start`). Targets of the forced-schedule sweep.
pub async fn stuck_awaiting_schedule(
    db: &Database,
    older_than: DateTime<Utc>,
    day_start: DateTime<Utc>,
) -> Result<Vec<Booking>, RingbookError> {
    let status = BookingStatus::AwaitingSchedule.to_string();
    let older_than = ts_to_db(older_than);
    let day_start = ts_to_db(day_start);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE status = ?1 AND created_at < ?2 AND created_at > ?3
                 ORDER BY booking_id ASC"
            ))?;
            let rows = stmt.query_map(params![status, older_than, day_start], booking_from_row)?;
            let mut bookings = Vec::new();
            for row in rows {
                bookings.push(row?);
            }
            Ok(bookings)
        })
        .await
        .map_err(map_db_err)
}

/// SCHEDULED, not-yet-queued bookings whose start time has passed `cutoff`,
/// sticky bookings first. Targets of the dispatch sweep.
pub async fn scheduled_due(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Booking>, RingbookError> {
    let status = BookingStatus::Scheduled.to_string();
    let cutoff = ts_to_db(cutoff);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE status = ?1 AND is_queued = 0
                   AND start_time IS NOT NULL AND start_time < ?2
                 ORDER BY is_sticky_agent DESC, booking_id ASC"
            ))?;
            let rows = stmt.query_map(params![status, cutoff], booking_from_row)?;
            let mut bookings = Vec::new();
            for row in rows {
                bookings.push(row?);
            }
            Ok(bookings)
        })
        .await
        .map_err(map_db_err)
}

/// CALL_ERROR bookings whose placement never produced a provider call id
/// and was not a hard do-not-call rejection. Targets of the error sweep.
pub async fn replayable_call_errors(db: &Database) -> Result<Vec<i64>, RingbookError> {
    let status = BookingStatus::CallError.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT b.booking_id FROM bookings b
                 JOIN call_attempts c ON c.booking_id = b.booking_id
                 WHERE b.status = ?1
                   AND c.provider_call_id IS NULL
                   AND (c.provider_response IS NULL
                        OR LOWER(c.provider_response) NOT LIKE '%do not call%')
                 ORDER BY b.booking_id ASC",
            )?;
            let rows = stmt.query_map(params![status], |row| row.get::<_, i64>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
        .map_err(map_db_err)
}

/// First-occurrence TAT milestones on a booking.
#[derive(Debug, Clone, Copy)]
pub enum BookingMilestone {
    FirstAgentRang,
    FirstAgentAnswered,
    FirstUserRang,
    FirstUserAnswered,
    FirstUserHangup,
}

impl BookingMilestone {
    fn column(self) -> &'static str {
        match self {
            Self::FirstAgentRang => "first_agent_rang_at",
            Self::FirstAgentAnswered => "first_agent_answered_at",
            Self::FirstUserRang => "first_user_rang_at",
            Self::FirstUserAnswered => "first_user_answered_at",
            Self::FirstUserHangup => "first_user_hangup_at",
        }
    }
}

/// Set a first-occurrence TAT milestone; a later write is a no-op.
pub async fn set_milestone_once(
    db: &Database,
    booking_id: i64,
    milestone: BookingMilestone,
    at: DateTime<Utc>,
) -> Result<(), RingbookError> {
    let column = milestone.column();
    let at = ts_to_db(at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE bookings SET {column} = ?1, updated_at = ?2
                     WHERE booking_id = ?3 AND {column} IS NULL"
                ),
                params![at, now, booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Record the most recent call-placement attempt time.
pub async fn set_last_call_attempted(
    db: &Database,
    booking_id: i64,
    at: DateTime<Utc>,
) -> Result<(), RingbookError> {
    let at = ts_to_db(at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bookings SET last_call_attempted_at = ?1, updated_at = ?2
                 WHERE booking_id = ?3",
                params![at, now, booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}
