// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound call placement for bookings.
//!
//! The agent is marked on-call before the provider round-trip so a
//! concurrent selection cannot hand the same agent a second call; the flag
//! is released on any failure. The placement step re-validates the agent
//! row before committing anything.

use chrono::{Duration, Utc};
use ringbook_core::types::{Booking, BookingStatus, CallPlacement, CallerRole};
use ringbook_core::{RingbookError, TelephonyAdapter};
use ringbook_storage::queries::{agents, bookings, calls};
use ringbook_storage::Database;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one placement attempt.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub placed: bool,
    /// Internal call-attempt id, 0 when no attempt row was created.
    pub call_id: i64,
    pub message: String,
}

impl PlacementResult {
    fn not_placed(message: impl Into<String>) -> Self {
        Self {
            placed: false,
            call_id: 0,
            message: message.into(),
        }
    }
}

/// Places outbound calls and records their attempts.
#[derive(Clone)]
pub struct CallPlacer {
    db: Database,
    telephony: Arc<dyn TelephonyAdapter>,
}

impl CallPlacer {
    pub fn new(db: Database, telephony: Arc<dyn TelephonyAdapter>) -> Self {
        Self { db, telephony }
    }

    /// Place the outbound call for a booking with the chosen agent.
    ///
    /// On success the booking moves to CALL_IN_PROGRESS; a provider-level
    /// refusal or transport failure records an errored attempt, frees the
    /// agent, and moves the booking to CALL_ERROR for the error sweep.
    pub async fn place_for_booking(
        &self,
        booking: &Booking,
        agent_id: i64,
        batch_uuid: &str,
        call_retry_count: i64,
    ) -> Result<PlacementResult, RingbookError> {
        let db = &self.db;
        let now = Utc::now();
        let busy_until = now + Duration::minutes(booking.duration_mins + 2);

        // Claim the agent first; release on every early exit.
        agents::set_on_call(db, agent_id, true, Some(busy_until)).await?;
        bookings::set_last_call_attempted(db, booking.booking_id, now).await?;

        let Some(agent) = agents::get_agent(db, agent_id).await? else {
            agents::set_on_call(db, agent_id, false, None).await?;
            warn!(agent_id, booking_id = booking.booking_id, "agent vanished before placement");
            return Ok(PlacementResult::not_placed("agent not found"));
        };

        bookings::set_agent(db, booking.booking_id, agent_id).await?;

        let Some(user) = ringbook_storage::queries::users::get_user(db, booking.user_id).await?
        else {
            agents::set_on_call(db, agent_id, false, None).await?;
            warn!(user_id = booking.user_id, "user vanished before placement");
            return Ok(PlacementResult::not_placed("user not found"));
        };
        let user_number = user.calling_number.clone().unwrap_or(user.phone_number.clone());

        let placement = self.telephony.place_call(&agent.phone_number, &user_number).await;
        let (provider_call_id, message) = match placement {
            Ok(CallPlacement::Placed { provider_call_id }) => {
                (Some(provider_call_id), "call placed".to_string())
            }
            Ok(CallPlacement::Rejected { reason }) => (None, reason),
            Err(e) => (None, e.to_string()),
        };
        let placed = provider_call_id.is_some();

        let batch_uuid = if batch_uuid.len() == 36 {
            batch_uuid.to_string()
        } else {
            uuid::Uuid::new_v4().to_string()
        };

        let attempt = calls::insert_attempt(
            db,
            calls::NewCallAttempt {
                booking_id: Some(booking.booking_id),
                agent_id,
                user_id: Some(user.user_id),
                batch_uuid,
                booking_retry_count: booking.retry_count,
                call_retry_count,
                provider_call_id,
                agent_phone_number: agent.phone_number.clone(),
                user_phone_number: user_number,
                initiated_by: CallerRole::System,
                initiated_at: placed.then_some(now),
                is_ongoing: placed,
                is_error: !placed,
                call_duration_ideal_secs: booking.duration_mins * 60,
                provider_response: Some(message.clone()),
            },
        )
        .await?;

        if !placed {
            agents::set_on_call(db, agent_id, false, None).await?;
            agents::set_last_failure_at(db, agent_id, now).await?;
        }

        let status = if placed {
            BookingStatus::CallInProgress
        } else {
            BookingStatus::CallError
        };
        bookings::update_status(db, booking.booking_id, status, None).await?;

        if placed {
            info!(
                booking_id = booking.booking_id,
                agent_id,
                call_id = attempt.call_id,
                "call placed"
            );
        } else {
            warn!(
                booking_id = booking.booking_id,
                agent_id,
                reason = %message,
                "call placement failed"
            );
        }

        Ok(PlacementResult {
            placed,
            call_id: attempt.call_id,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbook_core::types::BookingType;
    use ringbook_storage::queries::bookings::NewBooking;
    use ringbook_test_utils::{MockTelephony, TestHarness};

    async fn awaiting_call_booking(harness: &TestHarness, user_id: i64) -> Booking {
        bookings::insert_booking(
            &harness.db,
            NewBooking {
                user_id,
                agent_id: 0,
                duration_mins: 15,
                status: BookingStatus::AwaitingCall,
                booking_type: BookingType::BookNow,
                is_sticky_agent: false,
                start_time: None,
                end_time: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn successful_placement_marks_call_in_progress() {
        let harness = TestHarness::new().await;
        let user = harness.seed_user("Asha").await;
        let agent = harness.seed_online_consultant("Agent", 10).await;
        let booking = awaiting_call_booking(&harness, user.user_id).await;

        let telephony = Arc::new(MockTelephony::new());
        let placer = CallPlacer::new(harness.db.clone(), telephony.clone());

        let result = placer
            .place_for_booking(&booking, agent.agent_id, "", 0)
            .await
            .unwrap();
        assert!(result.placed);

        let reloaded = bookings::get_booking(&harness.db, booking.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, BookingStatus::CallInProgress);
        assert_eq!(reloaded.agent_id, agent.agent_id);
        assert!(reloaded.last_call_attempted_at.is_some());

        let status = agents::live_status(&harness.db, agent.agent_id).await.unwrap().unwrap();
        assert!(status.is_on_call);
        assert!(status.busy_until.is_some());

        let attempt = calls::get_attempt(&harness.db, result.call_id).await.unwrap().unwrap();
        assert!(attempt.is_ongoing);
        assert!(!attempt.is_error);
        assert!(attempt.provider_call_id.is_some());
        assert_eq!(attempt.call_duration_ideal_secs, 900);
        // Empty batch id gets replaced with a fresh uuid.
        assert_eq!(attempt.batch_uuid.len(), 36);
    }

    #[tokio::test]
    async fn rejected_placement_frees_agent_and_marks_error() {
        let harness = TestHarness::new().await;
        let user = harness.seed_user("Asha").await;
        let agent = harness.seed_online_consultant("Agent", 10).await;
        let booking = awaiting_call_booking(&harness, user.user_id).await;

        let telephony = Arc::new(MockTelephony::new());
        telephony
            .script_outcome(Ok(CallPlacement::Rejected {
                reason: "invalid number".to_string(),
            }))
            .await;
        let placer = CallPlacer::new(harness.db.clone(), telephony);

        let result = placer
            .place_for_booking(&booking, agent.agent_id, "", 0)
            .await
            .unwrap();
        assert!(!result.placed);
        assert_eq!(result.message, "invalid number");

        let reloaded = bookings::get_booking(&harness.db, booking.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, BookingStatus::CallError);

        let status = agents::live_status(&harness.db, agent.agent_id).await.unwrap().unwrap();
        assert!(!status.is_on_call);
        assert!(status.last_failure_at.is_some());

        let attempt = calls::get_attempt(&harness.db, result.call_id).await.unwrap().unwrap();
        assert!(attempt.is_error);
        assert!(!attempt.is_ongoing);
        assert!(attempt.provider_call_id.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_absorbed_as_error() {
        let harness = TestHarness::new().await;
        let user = harness.seed_user("Asha").await;
        let agent = harness.seed_online_consultant("Agent", 10).await;
        let booking = awaiting_call_booking(&harness, user.user_id).await;

        let telephony = Arc::new(MockTelephony::new());
        telephony
            .script_outcome(Err(RingbookError::Telephony {
                message: "connect timeout".to_string(),
                source: None,
            }))
            .await;
        let placer = CallPlacer::new(harness.db.clone(), telephony);

        let result = placer
            .place_for_booking(&booking, agent.agent_id, "", 0)
            .await
            .unwrap();
        assert!(!result.placed);
        assert!(result.message.contains("connect timeout"));
    }

    #[tokio::test]
    async fn missing_agent_short_circuits() {
        let harness = TestHarness::new().await;
        let user = harness.seed_user("Asha").await;
        let booking = awaiting_call_booking(&harness, user.user_id).await;

        let placer = CallPlacer::new(harness.db.clone(), Arc::new(MockTelephony::new()));
        let result = placer.place_for_booking(&booking, 9999, "", 0).await.unwrap();
        assert!(!result.placed);
        assert_eq!(result.call_id, 0);
    }

    #[tokio::test]
    async fn calling_number_preferred_over_phone_number() {
        let harness = TestHarness::new().await;
        let user = harness.seed_user("Asha").await;
        ringbook_storage::queries::users::set_calling_number(
            &harness.db,
            user.user_id,
            Some("917000000000".to_string()),
        )
        .await
        .unwrap();
        let agent = harness.seed_online_consultant("Agent", 10).await;
        let booking = awaiting_call_booking(&harness, user.user_id).await;

        let telephony = Arc::new(MockTelephony::new());
        let placer = CallPlacer::new(harness.db.clone(), telephony.clone());
        placer.place_for_booking(&booking, agent.agent_id, "", 0).await.unwrap();

        let placed = telephony.placed_calls().await;
        assert_eq!(placed[0].user_number, "917000000000");
    }
}
