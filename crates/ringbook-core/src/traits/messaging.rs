// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging adapter trait for user notifications.

use async_trait::async_trait;

use crate::error::RingbookError;
use crate::traits::adapter::CollaboratorAdapter;

/// Adapter for the outbound messaging collaborator.
///
/// Sends are fire-and-forget from the caller's perspective: the dispatch
/// layer resolves the internal user id to a phone number and does not
/// depend on delivery confirmation.
#[async_trait]
pub trait MessagingAdapter: CollaboratorAdapter {
    /// Ask the user to pick a new time after a failed call.
    async fn send_reschedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError>;

    /// Ask the user to pick a time for a newly created booking.
    async fn send_schedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError>;
}
