// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User CRUD and sticky-mapping operations.

use chrono::Utc;
use ringbook_core::types::{AgentRole, StickyMapping, User};
use ringbook_core::RingbookError;
use rusqlite::params;

use crate::database::{enum_from_db, map_db_err, ts_from_db, ts_to_db, Database};

/// Normalize a phone number: strip spaces/dashes/plus, drop a leading zero,
/// and default 10-digit numbers to the `91` country prefix.
pub fn normalize_phone(raw: &str) -> String {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with('0') {
        digits.remove(0);
    }
    if digits.len() == 10 {
        format!("91{digits}")
    } else {
        digits
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        user_uuid: row.get(1)?,
        phone_number: row.get(2)?,
        calling_number: row.get(3)?,
        user_name: row.get(4)?,
        has_birth_details: row.get::<_, i64>(5)? != 0,
        created_at: ts_from_db(6, row.get(6)?)?,
    })
}

const USER_COLUMNS: &str = "user_id, user_uuid, phone_number, calling_number, user_name, \
                            has_birth_details, created_at";

/// Find a user by normalized phone number, creating one if absent.
///
/// An existing user's name is backfilled only when currently empty; nothing
/// already present is overwritten.
pub async fn find_or_create_user(
    db: &Database,
    phone_number: &str,
    user_name: &str,
) -> Result<User, RingbookError> {
    let phone = normalize_phone(phone_number);
    let name = user_name.to_string();
    let now = ts_to_db(Utc::now());
    let uuid = uuid::Uuid::new_v4().to_string();

    db.connection()
        .call(move |conn| {
            let existing = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1"),
                    params![phone],
                    user_from_row,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok::<_, rusqlite::Error>(None),
                    other => Err(other),
                })?;

            if let Some(user) = existing {
                if user.user_name.is_empty() && !name.is_empty() {
                    conn.execute(
                        "UPDATE users SET user_name = ?1, updated_at = ?2 WHERE user_id = ?3",
                        params![name, now, user.user_id],
                    )?;
                    return Ok(User {
                        user_name: name,
                        ..user
                    });
                }
                return Ok(user);
            }

            conn.execute(
                "INSERT INTO users (user_uuid, phone_number, user_name, has_birth_details,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![uuid, phone, name, now],
            )?;
            let user_id = conn.last_insert_rowid();
            let user = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                user_from_row,
            )?;
            Ok(user)
        })
        .await
        .map_err(map_db_err)
}

/// Fetch a user by internal id.
pub async fn get_user(db: &Database, user_id: i64) -> Result<Option<User>, RingbookError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                user_from_row,
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

/// Mark whether the user's profile carries the details needed to place a call.
pub async fn set_birth_details(
    db: &Database,
    user_id: i64,
    has_birth_details: bool,
) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET has_birth_details = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![has_birth_details as i64, now, user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

/// Set an alternate calling number for outbound calls.
pub async fn set_calling_number(
    db: &Database,
    user_id: i64,
    calling_number: Option<String>,
) -> Result<(), RingbookError> {
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET calling_number = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![calling_number, now, user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_db_err)
}

fn mapping_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StickyMapping> {
    Ok(StickyMapping {
        mapping_id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        agent_role: enum_from_db(3, row.get(3)?)?,
        is_active: row.get::<_, i64>(4)? != 0,
    })
}

/// The active sticky mapping for a (user, role), if any.
pub async fn get_sticky_agent(
    db: &Database,
    user_id: i64,
    role: AgentRole,
) -> Result<Option<StickyMapping>, RingbookError> {
    let role = role.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT mapping_id, user_id, agent_id, agent_role, is_active
                 FROM sticky_mappings
                 WHERE user_id = ?1 AND agent_role = ?2 AND is_active = 1
                 ORDER BY mapping_id DESC LIMIT 1",
                params![user_id, role],
                mapping_from_row,
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

/// Pin `agent_id` as the user's sticky agent for `role`.
///
/// Deactivates any previous mapping; re-pinning the same agent is a no-op.
pub async fn set_sticky_agent(
    db: &Database,
    user_id: i64,
    agent_id: i64,
    role: AgentRole,
) -> Result<StickyMapping, RingbookError> {
    let role = role.to_string();
    let now = ts_to_db(Utc::now());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    "SELECT mapping_id, user_id, agent_id, agent_role, is_active
                     FROM sticky_mappings
                     WHERE user_id = ?1 AND agent_role = ?2 AND is_active = 1
                     ORDER BY mapping_id DESC LIMIT 1",
                    params![user_id, role],
                    mapping_from_row,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok::<_, rusqlite::Error>(None),
                    other => Err(other),
                })?;

            if let Some(mapping) = existing {
                if mapping.agent_id == agent_id {
                    tx.commit()?;
                    return Ok(mapping);
                }
                tx.execute(
                    "UPDATE sticky_mappings SET is_active = 0 WHERE mapping_id = ?1",
                    params![mapping.mapping_id],
                )?;
            }

            tx.execute(
                "INSERT INTO sticky_mappings (user_id, agent_id, agent_role, is_active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![user_id, agent_id, role, now],
            )?;
            let mapping_id = tx.last_insert_rowid();
            let mapping = tx.query_row(
                "SELECT mapping_id, user_id, agent_id, agent_role, is_active
                 FROM sticky_mappings WHERE mapping_id = ?1",
                params![mapping_id],
                mapping_from_row,
            )?;
            tx.commit()?;
            Ok(mapping)
        })
        .await
        .map_err(map_db_err)
}
