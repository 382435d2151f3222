// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `ringbook-core::types` for use across
//! the workspace. This module re-exports them for convenience within the
//! storage crate.

pub use ringbook_core::types::{
    Agent, AgentLiveStatus, AgentRole, Booking, BookingStatus, BookingType, CallAttempt,
    CallerRole, StickyMapping, User,
};
