// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call event reconciler.
//!
//! Telephony provider events arrive out of order and may be duplicated;
//! application is idempotent per milestone (storage writes are guarded on
//! the column being unset) and booking transitions are status-guarded.
//! Events for unknown provider call ids are ignored.
//!
//! The provider reports two hangup events, one per call leg; only the
//! agent leg drives the booking's fate.

use chrono::{Duration, Utc};
use ringbook_core::types::{
    AgentRole, Booking, BookingStatus, CallAttempt, CallLeg, CallerRole, ProviderEvent,
};
use ringbook_core::{MessagingAdapter, RingbookError};
use ringbook_storage::queries::bookings::BookingMilestone;
use ringbook_storage::queries::calls::CallMilestone;
use ringbook_storage::queries::{agents, bookings, calls, users};
use ringbook_storage::Database;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies provider events to call attempts and bookings.
pub struct CallEventReconciler {
    db: Database,
    lifecycle: Arc<crate::lifecycle::BookingLifecycle>,
    messaging: Arc<dyn MessagingAdapter>,
}

impl CallEventReconciler {
    pub fn new(
        db: Database,
        lifecycle: Arc<crate::lifecycle::BookingLifecycle>,
        messaging: Arc<dyn MessagingAdapter>,
    ) -> Self {
        Self {
            db,
            lifecycle,
            messaging,
        }
    }

    /// Apply one provider event. Returns whether it matched a known call.
    pub async fn apply(&self, event: &ProviderEvent) -> Result<bool, RingbookError> {
        let Some(call) = calls::by_provider_call_id(&self.db, event.provider_call_id()).await?
        else {
            debug!(provider_call_id = event.provider_call_id(), "event for unknown call, ignoring");
            return Ok(false);
        };

        match call.booking_id {
            Some(booking_id) => self.apply_booked(call, booking_id, event).await,
            None => self.apply_unbooked(call, event).await,
        }
    }

    async fn apply_booked(
        &self,
        call: CallAttempt,
        booking_id: i64,
        event: &ProviderEvent,
    ) -> Result<bool, RingbookError> {
        let db = &self.db;
        let Some(booking) = bookings::get_booking(db, booking_id).await? else {
            warn!(booking_id, call_id = call.call_id, "call references missing booking");
            return Ok(false);
        };

        match event {
            ProviderEvent::AgentRang { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::AgentRang, *at).await?;
                calls::set_ongoing(db, call.call_id, true).await?;
                let busy_mins = (call.call_duration_ideal_secs as u64).div_ceil(60) as i64;
                agents::set_on_call(
                    db,
                    call.agent_id,
                    true,
                    Some(Utc::now() + Duration::minutes(busy_mins)),
                )
                .await?;
                bookings::set_milestone_once(db, booking_id, BookingMilestone::FirstAgentRang, *at)
                    .await?;
            }

            ProviderEvent::AgentAnswered { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::AgentAnswered, *at)
                    .await?;
                bookings::set_milestone_once(
                    db,
                    booking_id,
                    BookingMilestone::FirstAgentAnswered,
                    *at,
                )
                .await?;
            }

            ProviderEvent::UserRang { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::UserRang, *at).await?;
                bookings::set_milestone_once(db, booking_id, BookingMilestone::FirstUserRang, *at)
                    .await?;
            }

            ProviderEvent::UserAnswered { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::UserAnswered, *at)
                    .await?;
                bookings::set_milestone_once(
                    db,
                    booking_id,
                    BookingMilestone::FirstUserAnswered,
                    *at,
                )
                .await?;

                // First successful connect pins the agent for future
                // bookings (first-come affinity). The pin is one-shot, so
                // a duplicate answer event or an operator override is
                // never clobbered.
                if bookings::pin_sticky(db, booking_id, call.agent_id).await? {
                    users::set_sticky_agent(
                        db,
                        booking.user_id,
                        call.agent_id,
                        AgentRole::Consultant,
                    )
                    .await?;
                    info!(
                        booking_id,
                        agent_id = call.agent_id,
                        "sticky agent pinned on first answer"
                    );
                }
            }

            ProviderEvent::Hangup { at, cause, leg, .. } => {
                let by = match leg {
                    CallLeg::Agent => CallerRole::Agent,
                    CallLeg::User => CallerRole::User,
                };
                calls::record_hangup(db, call.call_id, *at, cause, by).await?;

                if booking.first_user_answered_at.is_some()
                    && booking.first_user_hangup_at.is_none()
                {
                    bookings::set_milestone_once(
                        db,
                        booking_id,
                        BookingMilestone::FirstUserHangup,
                        *at,
                    )
                    .await?;
                }

                if *leg == CallLeg::Agent {
                    agents::set_on_call(db, call.agent_id, false, None).await?;
                    self.settle_booking_after_hangup(&call, &booking).await?;
                }
            }

            ProviderEvent::CallDetail { duration_secs, recording_url, .. } => {
                let fulfilled = *duration_secs > 0
                    && call.user_rang_at.is_some()
                    && call.user_answered_at.is_some();
                calls::apply_call_detail(
                    db,
                    call.call_id,
                    *duration_secs,
                    recording_url.clone(),
                    fulfilled,
                )
                .await?;
            }
        }

        Ok(true)
    }

    /// Decide the booking's fate after the agent leg hung up.
    ///
    /// Status-guarded on CALL_IN_PROGRESS so a duplicated hangup event
    /// cannot re-dispatch or re-notify.
    async fn settle_booking_after_hangup(
        &self,
        call: &CallAttempt,
        booking: &Booking,
    ) -> Result<(), RingbookError> {
        if booking.status != BookingStatus::CallInProgress {
            debug!(
                booking_id = booking.booking_id,
                status = %booking.status,
                "hangup fate already settled"
            );
            return Ok(());
        }

        let db = &self.db;
        // Milestones may have landed after our snapshot was read.
        let call = calls::get_attempt(db, call.call_id).await?.unwrap_or_else(|| call.clone());

        if call.agent_answered_at.is_some() && call.user_answered_at.is_some() {
            // Both legs connected: the consultation happened.
            bookings::update_status(
                db,
                booking.booking_id,
                BookingStatus::AwaitingUserFeedback,
                None,
            )
            .await?;
            info!(booking_id = booking.booking_id, "call finished, awaiting feedback");
        } else if call.agent_answered_at.is_some() {
            // Agent picked up but the user never did: ask the user for a
            // new time.
            bookings::update_status(
                db,
                booking.booking_id,
                BookingStatus::AwaitingReschedule,
                Some(false),
            )
            .await?;
            self.notify_reschedule(booking.user_id).await;
            info!(booking_id = booking.booking_id, "user unreachable, awaiting reschedule");
        } else if call.initiated_by == CallerRole::System {
            // Agent never answered a system-placed call: retry.
            agents::set_last_failure_at(db, call.agent_id, Utc::now()).await?;
            if booking.is_sticky_agent {
                let retry_at = Utc::now()
                    + Duration::seconds(self.lifecycle.config().sticky_retry_delay_secs as i64);
                self.lifecycle.reschedule(booking.booking_id, Some(retry_at)).await?;
                info!(booking_id = booking.booking_id, "sticky agent missed call, rescheduled");
            } else {
                self.lifecycle
                    .dispatch_replacement(
                        booking.booking_id,
                        call.batch_uuid.clone(),
                        call.call_retry_count + 1,
                    )
                    .await?;
                info!(booking_id = booking.booking_id, "agent missed call, replacement queued");
            }
        }
        // Agent- or user-initiated calls that never connected leave the
        // booking where it was.

        Ok(())
    }

    /// Attempts without a booking (direct outbound calls): only the
    /// attempt row and the agent flag are maintained.
    async fn apply_unbooked(
        &self,
        call: CallAttempt,
        event: &ProviderEvent,
    ) -> Result<bool, RingbookError> {
        let db = &self.db;
        match event {
            ProviderEvent::AgentRang { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::AgentRang, *at).await?;
                calls::set_ongoing(db, call.call_id, true).await?;
                agents::set_on_call(db, call.agent_id, true, None).await?;
            }
            ProviderEvent::AgentAnswered { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::AgentAnswered, *at)
                    .await?;
            }
            ProviderEvent::UserRang { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::UserRang, *at).await?;
            }
            ProviderEvent::UserAnswered { at, .. } => {
                calls::set_milestone_once(db, call.call_id, CallMilestone::UserAnswered, *at)
                    .await?;
            }
            ProviderEvent::Hangup { at, cause, leg, .. } => {
                let by = match leg {
                    CallLeg::Agent => CallerRole::Agent,
                    CallLeg::User => CallerRole::User,
                };
                calls::record_hangup(db, call.call_id, *at, cause, by).await?;
                if *leg == CallLeg::Agent {
                    agents::set_on_call(db, call.agent_id, false, None).await?;
                }
            }
            ProviderEvent::CallDetail { duration_secs, recording_url, .. } => {
                let fulfilled = *duration_secs > 0
                    && call.user_rang_at.is_some()
                    && call.user_answered_at.is_some();
                calls::apply_call_detail(
                    db,
                    call.call_id,
                    *duration_secs,
                    recording_url.clone(),
                    fulfilled,
                )
                .await?;
            }
        }
        Ok(true)
    }

    /// Fire-and-forget reschedule prompt; failures are logged only.
    async fn notify_reschedule(&self, user_id: i64) {
        match users::get_user(&self.db, user_id).await {
            Ok(Some(user)) => {
                if let Err(e) = self.messaging.send_reschedule_prompt(&user.phone_number).await {
                    warn!(user_id, error = %e, "reschedule prompt failed");
                }
            }
            Ok(None) => warn!(user_id, "reschedule prompt skipped: user not found"),
            Err(e) => warn!(user_id, error = %e, "reschedule prompt lookup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use ringbook_broker::topology::{LEAD_ASSIGNMENT_QUEUE, LEAD_REATTEMPT_QUEUE};
    use ringbook_broker::{Broker, ChannelBinder, InProcessBroker, Topology};
    use ringbook_config::model::AssignmentConfig;
    use ringbook_core::types::BookingType;
    use ringbook_test_utils::{MockMessaging, PromptKind, TestHarness};

    use crate::lifecycle::{AssignmentQueues, BookingLifecycle};

    struct Fixture {
        harness: TestHarness,
        broker: Arc<InProcessBroker>,
        messaging: Arc<MockMessaging>,
        reconciler: CallEventReconciler,
    }

    async fn fixture() -> Fixture {
        let harness = TestHarness::new().await;
        let broker = Arc::new(InProcessBroker::new());
        let channel = broker.connect().await.unwrap();
        let topology = Topology::lead_assignment().unwrap();
        let binder = ChannelBinder::new(Arc::clone(&channel));
        for entry in topology.entries() {
            binder.assert_entry(entry).await.unwrap();
        }

        let queues = AssignmentQueues::from_topology(channel, &topology).unwrap();
        let messaging = Arc::new(MockMessaging::new());
        let lifecycle = Arc::new(BookingLifecycle::new(
            harness.db.clone(),
            queues,
            messaging.clone(),
            AssignmentConfig::default(),
        ));
        let reconciler =
            CallEventReconciler::new(harness.db.clone(), lifecycle, messaging.clone());

        Fixture {
            harness,
            broker,
            messaging,
            reconciler,
        }
    }

    struct LiveCall {
        booking_id: i64,
        call_id: i64,
        agent_id: i64,
    }

    /// Seed a booking in CALL_IN_PROGRESS with one ongoing attempt.
    async fn live_call(f: &Fixture, sticky: bool) -> LiveCall {
        let user = f.harness.seed_user("Asha").await;
        let agent = f.harness.seed_online_consultant("Agent", 10).await;

        let booking = bookings::insert_booking(
            &f.harness.db,
            bookings::NewBooking {
                user_id: user.user_id,
                agent_id: agent.agent_id,
                duration_mins: 15,
                status: BookingStatus::CallInProgress,
                booking_type: BookingType::BookNow,
                is_sticky_agent: sticky,
                start_time: None,
                end_time: None,
            },
        )
        .await
        .unwrap();

        let attempt = calls::insert_attempt(
            &f.harness.db,
            calls::NewCallAttempt {
                booking_id: Some(booking.booking_id),
                agent_id: agent.agent_id,
                user_id: Some(user.user_id),
                batch_uuid: "3f8b2a10-9c4d-4e5f-8a7b-6c5d4e3f2a1b".to_string(),
                booking_retry_count: 0,
                call_retry_count: 0,
                provider_call_id: Some("k-live".to_string()),
                agent_phone_number: agent.phone_number.clone(),
                user_phone_number: user.phone_number.clone(),
                initiated_by: CallerRole::System,
                initiated_at: Some(Utc::now()),
                is_ongoing: true,
                is_error: false,
                call_duration_ideal_secs: 900,
                provider_response: None,
            },
        )
        .await
        .unwrap();

        agents::set_on_call(&f.harness.db, agent.agent_id, true, Some(Utc::now()))
            .await
            .unwrap();

        LiveCall {
            booking_id: booking.booking_id,
            call_id: attempt.call_id,
            agent_id: agent.agent_id,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(secs)
    }

    fn hangup(leg: CallLeg, secs: i64) -> ProviderEvent {
        ProviderEvent::Hangup {
            provider_call_id: "k-live".to_string(),
            at: at(secs),
            cause: "NORMAL_CLEARING".to_string(),
            leg,
        }
    }

    #[tokio::test]
    async fn unknown_call_is_ignored() {
        let f = fixture().await;
        let handled = f
            .reconciler
            .apply(&ProviderEvent::AgentRang {
                provider_call_id: "no-such-call".to_string(),
                at: at(0),
            })
            .await
            .unwrap();
        assert!(!handled);
    }

    #[tokio::test]
    async fn full_happy_path_reaches_feedback() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        for event in [
            ProviderEvent::AgentRang { provider_call_id: "k-live".into(), at: at(0) },
            ProviderEvent::AgentAnswered { provider_call_id: "k-live".into(), at: at(5) },
            ProviderEvent::UserRang { provider_call_id: "k-live".into(), at: at(8) },
            ProviderEvent::UserAnswered { provider_call_id: "k-live".into(), at: at(12) },
            hangup(CallLeg::User, 600),
            hangup(CallLeg::Agent, 602),
        ] {
            assert!(f.reconciler.apply(&event).await.unwrap());
        }

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(booking.status, BookingStatus::AwaitingUserFeedback);
        assert!(booking.first_agent_rang_at.is_some());
        assert!(booking.first_user_answered_at.is_some());
        // Sticky pinned on first user answer.
        assert!(booking.is_sticky_agent);
        let mapping = users::get_sticky_agent(&f.harness.db, booking.user_id, AgentRole::Consultant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.agent_id, call.agent_id);

        let attempt = calls::get_attempt(&f.harness.db, call.call_id).await.unwrap().unwrap();
        assert!(!attempt.is_ongoing);
        assert_eq!(attempt.hangup_by, Some(CallerRole::Agent));

        let status = agents::live_status(&f.harness.db, call.agent_id).await.unwrap().unwrap();
        assert!(!status.is_on_call);
    }

    #[tokio::test]
    async fn duplicate_milestones_keep_first_timestamp() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        let first = ProviderEvent::AgentAnswered {
            provider_call_id: "k-live".into(),
            at: at(5),
        };
        let duplicate = ProviderEvent::AgentAnswered {
            provider_call_id: "k-live".into(),
            at: at(90),
        };
        f.reconciler.apply(&first).await.unwrap();
        f.reconciler.apply(&duplicate).await.unwrap();

        let attempt = calls::get_attempt(&f.harness.db, call.call_id).await.unwrap().unwrap();
        assert_eq!(attempt.agent_answered_at, Some(at(5)));
    }

    #[tokio::test]
    async fn agent_missed_call_non_sticky_gets_immediate_replacement() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        // Agent rang but never answered, then the agent leg hung up.
        f.reconciler
            .apply(&ProviderEvent::AgentRang { provider_call_id: "k-live".into(), at: at(0) })
            .await
            .unwrap();
        f.reconciler.apply(&hangup(CallLeg::Agent, 30)).await.unwrap();

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();
        // Re-dispatched immediately: a fresh envelope on the reattempt
        // queue, not merely a future schedule.
        assert_eq!(booking.status, BookingStatus::AwaitingCall);
        assert!(booking.is_queued);
        assert_eq!(f.broker.buffered_count(LEAD_REATTEMPT_QUEUE), 1);
        assert_eq!(f.broker.buffered_count(LEAD_ASSIGNMENT_QUEUE), 0);

        let status = agents::live_status(&f.harness.db, call.agent_id).await.unwrap().unwrap();
        assert!(!status.is_on_call);
        assert!(status.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn agent_missed_call_sticky_gets_short_reschedule() {
        let f = fixture().await;
        let call = live_call(&f, true).await;

        f.reconciler.apply(&hangup(CallLeg::Agent, 30)).await.unwrap();

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Scheduled);
        assert!(!booking.is_queued);
        // Rescheduled into the future, not queued immediately.
        assert!(booking.start_time.unwrap() > Utc::now() + Duration::minutes(3));
        assert_eq!(f.broker.buffered_count(LEAD_REATTEMPT_QUEUE), 0);
    }

    #[tokio::test]
    async fn user_unreachable_notifies_exactly_once() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        f.reconciler
            .apply(&ProviderEvent::AgentAnswered { provider_call_id: "k-live".into(), at: at(5) })
            .await
            .unwrap();
        f.reconciler
            .apply(&ProviderEvent::UserRang { provider_call_id: "k-live".into(), at: at(8) })
            .await
            .unwrap();
        f.reconciler.apply(&hangup(CallLeg::Agent, 60)).await.unwrap();
        // Duplicate hangup delivery.
        f.reconciler.apply(&hangup(CallLeg::Agent, 61)).await.unwrap();

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(booking.status, BookingStatus::AwaitingReschedule);
        assert_eq!(f.messaging.count(PromptKind::Reschedule).await, 1);
        // No sticky pin: the user never answered.
        assert!(!booking.is_sticky_agent);
    }

    #[tokio::test]
    async fn user_leg_hangup_does_not_settle_fate() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        f.reconciler.apply(&hangup(CallLeg::User, 30)).await.unwrap();

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();
        // Fate waits for the agent leg.
        assert_eq!(booking.status, BookingStatus::CallInProgress);

        let attempt = calls::get_attempt(&f.harness.db, call.call_id).await.unwrap().unwrap();
        assert!(!attempt.is_ongoing);
        assert_eq!(attempt.hangup_by, Some(CallerRole::User));
    }

    #[tokio::test]
    async fn call_detail_records_duration_and_fulfillment() {
        let f = fixture().await;
        let call = live_call(&f, false).await;

        f.reconciler
            .apply(&ProviderEvent::UserRang { provider_call_id: "k-live".into(), at: at(8) })
            .await
            .unwrap();
        f.reconciler
            .apply(&ProviderEvent::UserAnswered { provider_call_id: "k-live".into(), at: at(12) })
            .await
            .unwrap();
        f.reconciler
            .apply(&ProviderEvent::CallDetail {
                provider_call_id: "k-live".into(),
                duration_secs: 540,
                recording_url: Some("https://recordings.example/k-live.mp3".to_string()),
            })
            .await
            .unwrap();

        let attempt = calls::get_attempt(&f.harness.db, call.call_id).await.unwrap().unwrap();
        assert_eq!(attempt.call_duration_actual_secs, Some(540));
        assert!(attempt.is_fulfilled);
        assert!(!attempt.is_ongoing);
        assert!(attempt.recording_url.is_some());
    }

    #[tokio::test]
    async fn operator_override_survives_duplicate_answer_events() {
        let f = fixture().await;
        let call = live_call(&f, false).await;
        let override_agent = f.harness.seed_online_consultant("Override", 50).await;

        f.reconciler
            .apply(&ProviderEvent::UserAnswered { provider_call_id: "k-live".into(), at: at(12) })
            .await
            .unwrap();

        let booking = bookings::get_booking(&f.harness.db, call.booking_id)
            .await
            .unwrap()
            .unwrap();

        // Operator replaces the mapping mid-call.
        users::set_sticky_agent(
            &f.harness.db,
            booking.user_id,
            override_agent.agent_id,
            AgentRole::Consultant,
        )
        .await
        .unwrap();

        // A duplicated answer event must not resurrect the original agent.
        f.reconciler
            .apply(&ProviderEvent::UserAnswered { provider_call_id: "k-live".into(), at: at(13) })
            .await
            .unwrap();

        let mapping = users::get_sticky_agent(&f.harness.db, booking.user_id, AgentRole::Consultant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.agent_id, override_agent.agent_id);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn event(kind: u8, leg_user: bool) -> ProviderEvent {
            let id = "k-live".to_string();
            match kind {
                0 => ProviderEvent::AgentRang { provider_call_id: id, at: at(0) },
                1 => ProviderEvent::AgentAnswered { provider_call_id: id, at: at(5) },
                2 => ProviderEvent::UserRang { provider_call_id: id, at: at(8) },
                3 => ProviderEvent::UserAnswered { provider_call_id: id, at: at(12) },
                4 => ProviderEvent::Hangup {
                    provider_call_id: id,
                    at: at(600),
                    cause: "NORMAL_CLEARING".to_string(),
                    leg: if leg_user { CallLeg::User } else { CallLeg::Agent },
                },
                _ => ProviderEvent::CallDetail {
                    provider_call_id: id,
                    duration_secs: 540,
                    recording_url: None,
                },
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Under any interleaving and duplication of provider events:
            /// at most one attempt stays ongoing per booking, and a full
            /// replay of the same events changes nothing.
            #[test]
            fn random_interleavings_converge(
                sequence in proptest::collection::vec((0u8..6, any::<bool>()), 1..24)
            ) {
                let runtime = tokio::runtime::Runtime::new().expect("runtime");
                runtime.block_on(async move {
                    let f = fixture().await;
                    let call = live_call(&f, false).await;

                    for (kind, leg_user) in &sequence {
                        f.reconciler.apply(&event(*kind, *leg_user)).await.unwrap();
                    }

                    let after_first: Vec<_> = snapshot(&f, call.call_id).await;

                    // Replay everything: idempotent application means the
                    // observable state is unchanged.
                    for (kind, leg_user) in &sequence {
                        f.reconciler.apply(&event(*kind, *leg_user)).await.unwrap();
                    }
                    let after_replay: Vec<_> = snapshot(&f, call.call_id).await;
                    assert_eq!(after_first, after_replay);

                    // Never more than one live call for the booking.
                    let ongoing =
                        calls::ongoing_for_booking(&f.harness.db, call.booking_id).await.unwrap();
                    assert!(ongoing.map(|c| c.call_id == call.call_id).unwrap_or(true));
                });
            }
        }

        async fn snapshot(f: &Fixture, call_id: i64) -> Vec<Option<String>> {
            let attempt = calls::get_attempt(&f.harness.db, call_id).await.unwrap().unwrap();
            vec![
                attempt.agent_rang_at.map(|t| t.to_rfc3339()),
                attempt.agent_answered_at.map(|t| t.to_rfc3339()),
                attempt.user_rang_at.map(|t| t.to_rfc3339()),
                attempt.user_answered_at.map(|t| t.to_rfc3339()),
                attempt.hangup_at.map(|t| t.to_rfc3339()),
                Some(attempt.is_ongoing.to_string()),
            ]
        }
    }
}
