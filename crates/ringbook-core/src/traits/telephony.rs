// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony adapter trait for outbound call placement.

use async_trait::async_trait;

use crate::error::RingbookError;
use crate::traits::adapter::CollaboratorAdapter;
use crate::types::CallPlacement;

/// Adapter for the outbound telephony provider.
///
/// The provider bridges the agent leg and the customer leg; lifecycle
/// milestones arrive later as webhook events, not on this call path.
#[async_trait]
pub trait TelephonyAdapter: CollaboratorAdapter {
    /// Place an outbound bridged call between an agent and a user.
    ///
    /// Returns [`CallPlacement::Rejected`] for provider-level refusals
    /// (invalid number, do-not-call), and `Err` only for transport
    /// failures.
    async fn place_call(
        &self,
        agent_number: &str,
        user_number: &str,
    ) -> Result<CallPlacement, RingbookError>;
}
