// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Ringbook call-routing backend.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Ringbook workspace. Collaborator
//! adapters (telephony, messaging) implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RingbookError;
pub use types::{
    AdapterType, AssignmentEnvelope, Booking, BookingStatus, BookingType, CallAttempt, CallLeg,
    CallPlacement, CallerRole, HealthStatus, ProviderEvent,
};

// Re-export all adapter traits at crate root.
pub use traits::{CollaboratorAdapter, MessagingAdapter, TelephonyAdapter};
