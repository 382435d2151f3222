// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent and live-status operations.
//!
//! Live-status mutations are single-row conditional updates keyed by
//! `agent_id`; concurrent handlers contending for the same agent serialize
//! at the storage layer.

use chrono::{DateTime, Utc};
use ringbook_core::types::{Agent, AgentLiveStatus, AgentRole, BookingStatus};
use ringbook_core::RingbookError;
use rusqlite::params;

use crate::database::{
    enum_from_db, map_db_err, ts_opt_from_db, ts_opt_to_db, ts_to_db, Database,
};

fn agent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        agent_id: row.get(0)?,
        agent_uuid: row.get(1)?,
        agent_name: row.get(2)?,
        phone_number: row.get(3)?,
        company_number: row.get(4)?,
        role: enum_from_db(5, row.get(5)?)?,
        selection_priority: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

const AGENT_COLUMNS: &str = "agent_id, agent_uuid, agent_name, phone_number, company_number, \
                             role, selection_priority, is_active";

fn status_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentLiveStatus> {
    Ok(AgentLiveStatus {
        agent_id: row.get(0)?,
        is_online: row.get::<_, i64>(1)? != 0,
        is_on_call: row.get::<_, i64>(2)? != 0,
        is_calendar_free: row.get::<_, i64>(3)? != 0,
        busy_until: ts_opt_from_db(4, row.get(4)?)?,
        next_booking_at: ts_opt_from_db(5, row.get(5)?)?,
        last_success_at: ts_opt_from_db(6, row.get(6)?)?,
        last_failure_at: ts_opt_from_db(7, row.get(7)?)?,
        is_active: row.get::<_, i64>(8)? != 0,
    })
}

const STATUS_COLUMNS: &str = "agent_id, is_online, is_on_call, is_calendar_free, busy_until, \
                              next_booking_at, last_success_at, last_failure_at, is_active";

/// Insert an agent. Consultants also get a live-status row, initially
/// offline and free.
pub async fn insert_agent(
    db: &Database,
    agent_name: &str,
    phone_number: &str,
    company_number: Option<&str>,
    role: AgentRole,
    selection_priority: i64,
) -> Result<Agent, RingbookError> {
    let agent_name = agent_name.to_string();
    let phone_number = phone_number.to_string();
    let company_number = company_number.map(String::from);
    let role_text = role.to_string();
    let uuid = uuid::Uuid::new_v4().to_string();
    let now = ts_to_db(Utc::now());

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO agents (agent_uuid, agent_name, phone_number, company_number,
                                     role, selection_priority, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                params![uuid, agent_name, phone_number, company_number, role_text,
                        selection_priority, now],
            )?;
            let agent_id = tx.last_insert_rowid();

            if role_text == AgentRole::Consultant.to_string() {
                tx.execute(
                    "INSERT INTO agent_live_status (agent_id, is_online, is_on_call,
                                                    is_calendar_free, is_active, updated_at)
                     VALUES (?1, 0, 0, 0, 1, ?2)",
                    params![agent_id, now],
                )?;
            }

            let agent = tx.query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"),
                params![agent_id],
                agent_from_row,
            )?;
            tx.commit()?;
            Ok(agent)
        })
        .await
        .map_err(map_db_err)
}

/// Fetch an agent by id.
pub async fn get_agent(db: &Database, agent_id: i64) -> Result<Option<Agent>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"),
                params![agent_id],
                agent_from_row,
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

/// Fetch several agents by id, in no particular order.
pub async fn agents_by_ids(db: &Database, ids: &[i64]) -> Result<Vec<Agent>, RingbookError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql =
                format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), agent_from_row)?;
            let mut agents = Vec::new();
            for row in rows {
                agents.push(row?);
            }
            Ok(agents)
        })
        .await
        .map_err(map_db_err)
}

/// Fetch the live status for one agent.
pub async fn live_status(
    db: &Database,
    agent_id: i64,
) -> Result<Option<AgentLiveStatus>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM agent_live_status WHERE agent_id = ?1"),
                params![agent_id],
                status_from_row,
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

/// Flip the on-call flag.
///
/// Going on call records `busy_until` (None when the duration is unknown);
/// coming off call always clears it.
pub async fn set_on_call(
    db: &Database,
    agent_id: i64,
    is_on_call: bool,
    busy_until: Option<DateTime<Utc>>,
) -> Result<(), RingbookError> {
    let busy = if is_on_call { ts_opt_to_db(busy_until) } else { None };
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status
                 SET is_on_call = ?1, busy_until = ?2, updated_at = ?3
                 WHERE agent_id = ?4",
                params![is_on_call as i64, busy, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Flip the online flag.
pub async fn set_online(db: &Database, agent_id: i64, is_online: bool) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status SET is_online = ?1, updated_at = ?2 WHERE agent_id = ?3",
                params![is_online as i64, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Flip the calendar-free flag.
pub async fn set_calendar_free(
    db: &Database,
    agent_id: i64,
    is_calendar_free: bool,
) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status SET is_calendar_free = ?1, updated_at = ?2
                 WHERE agent_id = ?3",
                params![is_calendar_free as i64, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Record when the agent's next scheduled booking starts.
pub async fn set_next_booking_at(
    db: &Database,
    agent_id: i64,
    next_booking_at: Option<DateTime<Utc>>,
) -> Result<(), RingbookError> {
    let next = ts_opt_to_db(next_booking_at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status SET next_booking_at = ?1, updated_at = ?2
                 WHERE agent_id = ?3",
                params![next, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Record the last successful call completion for the agent.
pub async fn set_last_success_at(
    db: &Database,
    agent_id: i64,
    at: DateTime<Utc>,
) -> Result<(), RingbookError> {
    let at = ts_to_db(at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status SET last_success_at = ?1, updated_at = ?2
                 WHERE agent_id = ?3",
                params![at, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Record the last failed call for the agent.
pub async fn set_last_failure_at(
    db: &Database,
    agent_id: i64,
    at: DateTime<Utc>,
) -> Result<(), RingbookError> {
    let at = ts_to_db(at);
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agent_live_status SET last_failure_at = ?1, updated_at = ?2
                 WHERE agent_id = ?3",
                params![at, now, agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Live-status rows eligible to take a call ending by `tentative_end`:
/// active, not on call, no next booking before `tentative_end`, and either
/// online or calendar-free. `excluded` agents are filtered out; `only`
/// restricts the pool to a single agent (sticky assignment).
pub async fn eligible_live_statuses(
    db: &Database,
    tentative_end: DateTime<Utc>,
    excluded: &[i64],
    only: Option<i64>,
) -> Result<Vec<AgentLiveStatus>, RingbookError> {
    let excluded = excluded.to_vec();
    let cutoff = ts_to_db(tentative_end);
    db.connection()
        .call(move |conn| {
            let mut sql = format!(
                "SELECT {STATUS_COLUMNS} FROM agent_live_status
                 WHERE is_active = 1
                   AND is_on_call = 0
                   AND (next_booking_at IS NULL OR next_booking_at > ?1)
                   AND (is_online = 1 OR is_calendar_free = 1)"
            );
            let mut values: Vec<rusqlite::types::Value> = vec![cutoff.clone().into()];
            if !excluded.is_empty() {
                let placeholders = vec!["?"; excluded.len()].join(", ");
                sql.push_str(&format!(" AND agent_id NOT IN ({placeholders})"));
                values.extend(excluded.iter().map(|id| rusqlite::types::Value::from(*id)));
            }
            if let Some(agent_id) = only {
                sql.push_str(" AND agent_id = ?");
                values.push(agent_id.into());
            }
            sql.push_str(" ORDER BY is_online DESC, is_calendar_free DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), status_from_row)?;
            let mut statuses = Vec::new();
            for row in rows {
                statuses.push(row?);
            }
            Ok(statuses)
        })
        .await
        .map_err(map_db_err)
}

/// Agents currently holding a booking awaiting user feedback.
///
/// An agent with an unresolved feedback backlog must not receive a new lead.
pub async fn agents_with_feedback_backlog(db: &Database) -> Result<Vec<i64>, RingbookError> {
    let status = BookingStatus::AwaitingUserFeedback.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT agent_id FROM bookings WHERE status = ?1 AND agent_id > 0",
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn consultant(db: &Database, phone: &str, priority: i64) -> Agent {
        insert_agent(db, "Agent", phone, None, AgentRole::Consultant, priority)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn consultant_gets_live_status_row() {
        let (db, _dir) = setup_db().await;
        let agent = consultant(&db, "911111111111", 10).await;

        let status = live_status(&db, agent.agent_id).await.unwrap().unwrap();
        assert!(!status.is_online);
        assert!(!status.is_on_call);
        assert!(status.is_active);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn support_agent_has_no_live_status() {
        let (db, _dir) = setup_db().await;
        let agent = insert_agent(&db, "Ops", "913333333333", None, AgentRole::Support, 0)
            .await
            .unwrap();
        assert!(live_status(&db, agent.agent_id).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn on_call_sets_and_clears_busy_until() {
        let (db, _dir) = setup_db().await;
        let agent = consultant(&db, "911111111111", 10).await;
        let busy_until = Utc::now() + Duration::minutes(7);

        set_on_call(&db, agent.agent_id, true, Some(busy_until)).await.unwrap();
        let status = live_status(&db, agent.agent_id).await.unwrap().unwrap();
        assert!(status.is_on_call);
        assert!(status.busy_until.is_some());

        set_on_call(&db, agent.agent_id, false, None).await.unwrap();
        let status = live_status(&db, agent.agent_id).await.unwrap().unwrap();
        assert!(!status.is_on_call);
        assert!(status.busy_until.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn eligible_filters_on_call_and_offline() {
        let (db, _dir) = setup_db().await;
        let online = consultant(&db, "911111111111", 10).await;
        let on_call = consultant(&db, "912222222222", 20).await;
        let offline = consultant(&db, "913333333333", 30).await;

        set_online(&db, online.agent_id, true).await.unwrap();
        set_online(&db, on_call.agent_id, true).await.unwrap();
        set_on_call(&db, on_call.agent_id, true, None).await.unwrap();
        // `offline` stays offline and not calendar-free.
        let _ = offline;

        let cutoff = Utc::now() + Duration::minutes(7);
        let eligible = eligible_live_statuses(&db, cutoff, &[], None).await.unwrap();
        let ids: Vec<i64> = eligible.iter().map(|s| s.agent_id).collect();
        assert_eq!(ids, vec![online.agent_id]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn eligible_respects_next_booking_window() {
        let (db, _dir) = setup_db().await;
        let agent = consultant(&db, "911111111111", 10).await;
        set_online(&db, agent.agent_id, true).await.unwrap();

        // Next booking inside the window makes the agent ineligible.
        set_next_booking_at(&db, agent.agent_id, Some(Utc::now() + Duration::minutes(3)))
            .await
            .unwrap();
        let cutoff = Utc::now() + Duration::minutes(7);
        assert!(eligible_live_statuses(&db, cutoff, &[], None).await.unwrap().is_empty());

        // Next booking beyond the window is fine.
        set_next_booking_at(&db, agent.agent_id, Some(Utc::now() + Duration::minutes(30)))
            .await
            .unwrap();
        assert_eq!(eligible_live_statuses(&db, cutoff, &[], None).await.unwrap().len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn eligible_exclusion_and_only() {
        let (db, _dir) = setup_db().await;
        let a1 = consultant(&db, "911111111111", 10).await;
        let a2 = consultant(&db, "912222222222", 20).await;
        set_online(&db, a1.agent_id, true).await.unwrap();
        set_online(&db, a2.agent_id, true).await.unwrap();

        let cutoff = Utc::now() + Duration::minutes(7);

        let excluded = eligible_live_statuses(&db, cutoff, &[a1.agent_id], None).await.unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].agent_id, a2.agent_id);

        let only = eligible_live_statuses(&db, cutoff, &[], Some(a1.agent_id)).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].agent_id, a1.agent_id);

        db.close().await.unwrap();
    }
}
