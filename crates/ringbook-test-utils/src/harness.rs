// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness: a scratch database plus seed helpers.

use ringbook_core::types::{Agent, AgentRole, User};
use ringbook_storage::queries::{agents, users};
use ringbook_storage::Database;

/// A temp-dir-backed database with seed helpers for common fixtures.
///
/// The temp directory lives as long as the harness; dropping it removes the
/// database file.
pub struct TestHarness {
    pub db: Database,
    _dir: tempfile::TempDir,
    phone_counter: std::sync::atomic::AtomicU64,
}

impl TestHarness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("ringbook-test.db");
        let db = Database::open(db_path.to_str().expect("utf8 path"))
            .await
            .expect("open test db");
        Self {
            db,
            _dir: dir,
            phone_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn next_phone(&self, prefix: u64) -> String {
        let n = self
            .phone_counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("91{:010}", prefix * 1_000_000 + n)
    }

    /// Seed a user with a unique phone number and complete profile.
    pub async fn seed_user(&self, name: &str) -> User {
        let phone = self.next_phone(9);
        let user = users::find_or_create_user(&self.db, &phone, name)
            .await
            .expect("seed user");
        users::set_birth_details(&self.db, user.user_id, true)
            .await
            .expect("seed user details");
        users::get_user(&self.db, user.user_id)
            .await
            .expect("reload user")
            .expect("seeded user exists")
    }

    /// Seed an online consultant ready to take calls.
    pub async fn seed_online_consultant(&self, name: &str, priority: i64) -> Agent {
        let agent = self.seed_offline_consultant(name, priority).await;
        agents::set_online(&self.db, agent.agent_id, true)
            .await
            .expect("seed online");
        agent
    }

    /// Seed a consultant that is registered but offline.
    pub async fn seed_offline_consultant(&self, name: &str, priority: i64) -> Agent {
        let phone = self.next_phone(8);
        agents::insert_agent(&self.db, name, &phone, None, AgentRole::Consultant, priority)
            .await
            .expect("seed consultant")
    }
}
