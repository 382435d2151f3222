// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-attempt operations.
//!
//! Milestone timestamps are written with `... AND column IS NULL` guards so
//! duplicated provider events leave the first value untouched.

use chrono::{DateTime, Utc};
use ringbook_core::types::{CallAttempt, CallerRole};
use ringbook_core::RingbookError;
use rusqlite::params;

use crate::database::{
    enum_from_db, map_db_err, ts_opt_from_db, ts_opt_to_db, ts_to_db, Database,
};

fn attempt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallAttempt> {
    let hangup_by: Option<String> = row.get(19)?;
    Ok(CallAttempt {
        call_id: row.get(0)?,
        call_uuid: row.get(1)?,
        booking_id: row.get(2)?,
        agent_id: row.get(3)?,
        user_id: row.get(4)?,
        batch_uuid: row.get(5)?,
        booking_retry_count: row.get(6)?,
        call_retry_count: row.get(7)?,
        provider_call_id: row.get(8)?,
        agent_phone_number: row.get(9)?,
        user_phone_number: row.get(10)?,
        initiated_by: enum_from_db(11, row.get(11)?)?,
        initiated_at: ts_opt_from_db(12, row.get(12)?)?,
        agent_rang_at: ts_opt_from_db(13, row.get(13)?)?,
        agent_answered_at: ts_opt_from_db(14, row.get(14)?)?,
        user_rang_at: ts_opt_from_db(15, row.get(15)?)?,
        user_answered_at: ts_opt_from_db(16, row.get(16)?)?,
        hangup_at: ts_opt_from_db(17, row.get(17)?)?,
        hangup_cause: row.get(18)?,
        hangup_by: hangup_by.map(|raw| enum_from_db(19, raw)).transpose()?,
        is_ongoing: row.get::<_, i64>(20)? != 0,
        is_error: row.get::<_, i64>(21)? != 0,
        is_fulfilled: row.get::<_, i64>(22)? != 0,
        call_duration_ideal_secs: row.get(23)?,
        call_duration_actual_secs: row.get(24)?,
        recording_url: row.get(25)?,
        provider_response: row.get(26)?,
    })
}

const ATTEMPT_COLUMNS: &str = "call_id, call_uuid, booking_id, agent_id, user_id, batch_uuid, \
    booking_retry_count, call_retry_count, provider_call_id, agent_phone_number, \
    user_phone_number, initiated_by, initiated_at, agent_rang_at, agent_answered_at, \
    user_rang_at, user_answered_at, hangup_at, hangup_cause, hangup_by, is_ongoing, is_error, \
    is_fulfilled, call_duration_ideal_secs, call_duration_actual_secs, recording_url, \
    provider_response";

/// Fields for a new call-attempt row.
#[derive(Debug, Clone)]
pub struct NewCallAttempt {
    pub booking_id: Option<i64>,
    pub agent_id: i64,
    pub user_id: Option<i64>,
    pub batch_uuid: String,
    pub booking_retry_count: i64,
    pub call_retry_count: i64,
    pub provider_call_id: Option<String>,
    pub agent_phone_number: String,
    pub user_phone_number: String,
    pub initiated_by: CallerRole,
    pub initiated_at: Option<DateTime<Utc>>,
    pub is_ongoing: bool,
    pub is_error: bool,
    pub call_duration_ideal_secs: i64,
    pub provider_response: Option<String>,
}

/// Insert a new call attempt.
pub async fn insert_attempt(
    db: &Database,
    new: NewCallAttempt,
) -> Result<CallAttempt, RingbookError> {
    let uuid = uuid::Uuid::new_v4().to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO call_attempts (call_uuid, booking_id, agent_id, user_id, batch_uuid,
                     booking_retry_count, call_retry_count, provider_call_id,
                     agent_phone_number, user_phone_number, initiated_by, initiated_at,
                     is_ongoing, is_error, is_fulfilled, call_duration_ideal_secs,
                     provider_response, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, ?15,
                         ?16, ?17, ?17)",
                params![
                    uuid,
                    new.booking_id,
                    new.agent_id,
                    new.user_id,
                    new.batch_uuid,
                    new.booking_retry_count,
                    new.call_retry_count,
                    new.provider_call_id,
                    new.agent_phone_number,
                    new.user_phone_number,
                    new.initiated_by.to_string(),
                    ts_opt_to_db(new.initiated_at),
                    new.is_ongoing as i64,
                    new.is_error as i64,
                    new.call_duration_ideal_secs,
                    new.provider_response,
                    now,
                ],
            )?;
            let call_id = conn.last_insert_rowid();
            let attempt = conn.query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM call_attempts WHERE call_id = ?1"),
                params![call_id],
                attempt_from_row,
            )?;
            Ok(attempt)
        })
        .await
        .map_err(map_db_err)
}

/// Fetch an attempt by internal id.
pub async fn get_attempt(
    db: &Database,
    call_id: i64,
) -> Result<Option<CallAttempt>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM call_attempts WHERE call_id = ?1"),
                params![call_id],
                attempt_from_row,
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

/// Resolve an attempt by the provider-assigned call id.
pub async fn by_provider_call_id(
    db: &Database,
    provider_call_id: &str,
) -> Result<Option<CallAttempt>, RingbookError> {
    let provider_call_id = provider_call_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM call_attempts WHERE provider_call_id = ?1"
                ),
                params![provider_call_id],
                attempt_from_row,
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

/// The live attempt for a booking, if any.
pub async fn ongoing_for_booking(
    db: &Database,
    booking_id: i64,
) -> Result<Option<CallAttempt>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM call_attempts
                     WHERE booking_id = ?1 AND is_ongoing = 1"
                ),
                params![booking_id],
                attempt_from_row,
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

/// Agents already tried within one assignment batch.
pub async fn agents_tried_in_batch(
    db: &Database,
    batch_uuid: &str,
) -> Result<Vec<i64>, RingbookError> {
    let batch_uuid = batch_uuid.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT agent_id FROM call_attempts WHERE batch_uuid = ?1",
            )?;
            let rows = stmt.query_map(params![batch_uuid], |row| row.get::<_, i64>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
        .map_err(map_db_err)
}

/// Provider-reported milestones on a call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMilestone {
    AgentRang,
    AgentAnswered,
    UserRang,
    UserAnswered,
}

impl CallMilestone {
    fn column(self) -> &'static str {
        match self {
            Self::AgentRang => "agent_rang_at",
            Self::AgentAnswered => "agent_answered_at",
            Self::UserRang => "user_rang_at",
            Self::UserAnswered => "user_answered_at",
        }
    }
}

/// Set a milestone timestamp if not already set. Returns whether the row
/// changed, which is false for duplicate events.
pub async fn set_milestone_once(
    db: &Database,
    call_id: i64,
    milestone: CallMilestone,
    at: DateTime<Utc>,
) -> Result<bool, RingbookError> {
    let column = milestone.column();
    let at = ts_to_db(at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE call_attempts SET {column} = ?1, updated_at = ?2
                     WHERE call_id = ?3 AND {column} IS NULL"
                ),
                params![at, now, call_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_db_err)
}

/// Record a hangup. `hangup_at` is set once; cause and initiator are always
/// recorded for the reporting leg.
pub async fn record_hangup(
    db: &Database,
    call_id: i64,
    at: DateTime<Utc>,
    cause: &str,
    by: CallerRole,
) -> Result<(), RingbookError> {
    let at = ts_to_db(at);
    let cause = cause.to_string();
    let by = by.to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE call_attempts
                 SET hangup_at = COALESCE(hangup_at, ?1), hangup_cause = ?2, hangup_by = ?3,
                     is_ongoing = 0, updated_at = ?4
                 WHERE call_id = ?5",
                params![at, cause, by, now, call_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Flip the ongoing flag.
pub async fn set_ongoing(db: &Database, call_id: i64, is_ongoing: bool) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE call_attempts SET is_ongoing = ?1, updated_at = ?2 WHERE call_id = ?3",
                params![is_ongoing as i64, now, call_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Apply a post-call detail record: actual duration, optional recording,
/// fulfilled flag, and the end of the ongoing state.
pub async fn apply_call_detail(
    db: &Database,
    call_id: i64,
    duration_secs: i64,
    recording_url: Option<String>,
    is_fulfilled: bool,
) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE call_attempts
                 SET call_duration_actual_secs = ?1,
                     recording_url = COALESCE(?2, recording_url),
                     is_fulfilled = CASE WHEN ?3 THEN 1 ELSE is_fulfilled END,
                     is_ongoing = 0, updated_at = ?4
                 WHERE call_id = ?5",
                params![duration_secs, recording_url, is_fulfilled, now, call_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Ongoing attempts initiated before `cutoff` with no provider events at
/// all. Targets of the stalled-call sweep.
pub async fn stalled_attempts(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<CallAttempt>, RingbookError> {
    let cutoff = ts_to_db(cutoff);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM call_attempts
                 WHERE is_ongoing = 1
                   AND initiated_at IS NOT NULL AND initiated_at < ?1
                   AND agent_rang_at IS NULL AND agent_answered_at IS NULL
                   AND user_rang_at IS NULL AND user_answered_at IS NULL
                 ORDER BY call_id ASC"
            ))?;
            let rows = stmt.query_map(params![cutoff], attempt_from_row)?;
            let mut attempts = Vec::new();
            for row in rows {
                attempts.push(row?);
            }
            Ok(attempts)
        })
        .await
        .map_err(map_db_err)
}

/// Count event-less attempts for a booking to the same number, initiated
/// before `cutoff`. Bounds how often a silent failure is retried.
pub async fn silent_attempt_count(
    db: &Database,
    booking_id: i64,
    user_phone_number: &str,
    cutoff: DateTime<Utc>,
) -> Result<i64, RingbookError> {
    let user_phone_number = user_phone_number.to_string();
    let cutoff = ts_to_db(cutoff);
    db.connection()
        .call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM call_attempts
                 WHERE booking_id = ?1 AND user_phone_number = ?2
                   AND initiated_at IS NOT NULL AND initiated_at < ?3
                   AND agent_rang_at IS NULL AND agent_answered_at IS NULL
                   AND user_rang_at IS NULL AND user_answered_at IS NULL",
                params![booking_id, user_phone_number, cutoff],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_db_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::agents::insert_agent;
    use crate::queries::bookings::{insert_booking, NewBooking};
    use crate::queries::users::find_or_create_user;
    use chrono::Duration;
    use ringbook_core::types::{AgentRole, BookingStatus, BookingType};
    use tempfile::tempdir;

    struct Fixture {
        db: Database,
        _dir: tempfile::TempDir,
        booking_id: i64,
        agent_id: i64,
        user_id: i64,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let user = find_or_create_user(&db, "919876543210", "Asha").await.unwrap();
        let agent = insert_agent(&db, "Agent", "911111111111", None, AgentRole::Consultant, 10)
            .await
            .unwrap();
        let booking = insert_booking(
            &db,
            NewBooking {
                user_id: user.user_id,
                agent_id: agent.agent_id,
                duration_mins: 15,
                status: BookingStatus::AwaitingCall,
                booking_type: BookingType::BookNow,
                is_sticky_agent: false,
                start_time: None,
                end_time: None,
            },
        )
        .await
        .unwrap();

        Fixture {
            db,
            _dir: dir,
            booking_id: booking.booking_id,
            agent_id: agent.agent_id,
            user_id: user.user_id,
        }
    }

    fn new_attempt(f: &Fixture, provider_call_id: Option<&str>, ongoing: bool) -> NewCallAttempt {
        NewCallAttempt {
            booking_id: Some(f.booking_id),
            agent_id: f.agent_id,
            user_id: Some(f.user_id),
            batch_uuid: "batch-1".to_string(),
            booking_retry_count: 0,
            call_retry_count: 0,
            provider_call_id: provider_call_id.map(String::from),
            agent_phone_number: "911111111111".to_string(),
            user_phone_number: "919876543210".to_string(),
            initiated_by: CallerRole::System,
            initiated_at: Some(Utc::now()),
            is_ongoing: ongoing,
            is_error: false,
            call_duration_ideal_secs: 900,
            provider_response: None,
        }
    }

    #[tokio::test]
    async fn insert_and_resolve_by_provider_id() {
        let f = setup().await;
        let attempt = insert_attempt(&f.db, new_attempt(&f, Some("k-1"), true)).await.unwrap();

        let found = by_provider_call_id(&f.db, "k-1").await.unwrap().unwrap();
        assert_eq!(found.call_id, attempt.call_id);
        assert!(found.is_ongoing);

        assert!(by_provider_call_id(&f.db, "unknown").await.unwrap().is_none());

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_ongoing_attempt_for_booking_is_rejected() {
        let f = setup().await;
        insert_attempt(&f.db, new_attempt(&f, Some("k-1"), true)).await.unwrap();

        let err = insert_attempt(&f.db, new_attempt(&f, Some("k-2"), true)).await;
        assert!(err.is_err(), "unique ongoing index must reject a second live call");

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn milestone_set_once_reports_duplicates() {
        let f = setup().await;
        let attempt = insert_attempt(&f.db, new_attempt(&f, Some("k-1"), true)).await.unwrap();

        let first = Utc::now();
        assert!(set_milestone_once(&f.db, attempt.call_id, CallMilestone::AgentAnswered, first)
            .await
            .unwrap());
        // Duplicate event: no change.
        assert!(!set_milestone_once(
            &f.db,
            attempt.call_id,
            CallMilestone::AgentAnswered,
            first + Duration::seconds(30)
        )
        .await
        .unwrap());

        let reloaded = get_attempt(&f.db, attempt.call_id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.agent_answered_at.map(crate::database::ts_to_db),
            Some(crate::database::ts_to_db(first))
        );

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn hangup_records_cause_and_clears_ongoing() {
        let f = setup().await;
        let attempt = insert_attempt(&f.db, new_attempt(&f, Some("k-1"), true)).await.unwrap();

        let at = Utc::now();
        record_hangup(&f.db, attempt.call_id, at, "NORMAL_CLEARING", CallerRole::Agent)
            .await
            .unwrap();

        let reloaded = get_attempt(&f.db, attempt.call_id).await.unwrap().unwrap();
        assert!(!reloaded.is_ongoing);
        assert_eq!(reloaded.hangup_cause.as_deref(), Some("NORMAL_CLEARING"));
        assert_eq!(reloaded.hangup_by, Some(CallerRole::Agent));

        // Second hangup (other leg): hangup_at unchanged, initiator updated.
        record_hangup(
            &f.db,
            attempt.call_id,
            at + Duration::seconds(2),
            "NORMAL_CLEARING",
            CallerRole::User,
        )
        .await
        .unwrap();
        let again = get_attempt(&f.db, attempt.call_id).await.unwrap().unwrap();
        assert_eq!(
            again.hangup_at.map(crate::database::ts_to_db),
            Some(crate::database::ts_to_db(at))
        );
        assert_eq!(again.hangup_by, Some(CallerRole::User));

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stalled_attempts_require_no_events() {
        let f = setup().await;
        let attempt = insert_attempt(&f.db, new_attempt(&f, Some("k-1"), true)).await.unwrap();

        let cutoff = Utc::now() + Duration::minutes(1);
        assert_eq!(stalled_attempts(&f.db, cutoff).await.unwrap().len(), 1);

        // Any milestone removes the attempt from the stalled set.
        set_milestone_once(&f.db, attempt.call_id, CallMilestone::AgentRang, Utc::now())
            .await
            .unwrap();
        assert!(stalled_attempts(&f.db, cutoff).await.unwrap().is_empty());

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn batch_exclusion_lists_tried_agents() {
        let f = setup().await;
        insert_attempt(&f.db, new_attempt(&f, Some("k-1"), false)).await.unwrap();

        let tried = agents_tried_in_batch(&f.db, "batch-1").await.unwrap();
        assert_eq!(tried, vec![f.agent_id]);
        assert!(agents_tried_in_batch(&f.db, "batch-other").await.unwrap().is_empty());

        f.db.close().await.unwrap();
    }
}
