// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Ringbook call-routing backend.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed CRUD
//! operations for users, agents, live status, sticky mappings, bookings,
//! and call attempts.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{ts_opt_to_db, ts_to_db, Database};
pub use models::*;
