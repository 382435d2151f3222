// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking lifecycle manager.
//!
//! Every booking transition goes through the explicit operations here
//! (create, schedule, dispatch, feedback, cancel, defer, and the sweeps),
//! so the status invariants are enforced in one place. Guard violations
//! are no-ops reported as `Ok(false)`, never errors: under at-least-once
//! delivery a stale command is expected traffic.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use ringbook_core::types::{
    AgentRole, AssignmentEnvelope, Booking, BookingStatus, BookingType,
};
use ringbook_core::{MessagingAdapter, RingbookError};
use ringbook_broker::{QueuePublisher, Topology};
use ringbook_config::model::AssignmentConfig;
use ringbook_storage::queries::{agents, bookings, calls, users};
use ringbook_storage::Database;
use std::sync::Arc;
use tracing::{info, warn};

/// Publishers for the two assignment pipelines.
#[derive(Clone)]
pub struct AssignmentQueues {
    pub assignment: QueuePublisher,
    pub reattempt: QueuePublisher,
}

impl AssignmentQueues {
    /// Build publishers for the standard lead-assignment topology entries.
    pub fn from_topology(
        channel: Arc<dyn ringbook_broker::BrokerChannel>,
        topology: &Topology,
    ) -> Result<Self, RingbookError> {
        let assignment = topology
            .entry("lead_assign")
            .ok_or_else(|| RingbookError::Config("missing lead_assign entry".to_string()))?;
        let reattempt = topology
            .entry("lead_reattempt")
            .ok_or_else(|| RingbookError::Config("missing lead_reattempt entry".to_string()))?;
        Ok(Self {
            assignment: QueuePublisher::for_entry(Arc::clone(&channel), assignment),
            reattempt: QueuePublisher::for_entry(channel, reattempt),
        })
    }
}

/// Outcome of agent feedback on a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Consultation finished; the booking completes.
    Completed,
    /// Escalated for follow-up by the support desk.
    Escalated,
    /// The agent asked to call the user back at a given time.
    CallbackRequested(DateTime<Utc>),
}

/// The state machine governing a booking from creation to completion.
pub struct BookingLifecycle {
    db: Database,
    queues: AssignmentQueues,
    messaging: Arc<dyn MessagingAdapter>,
    config: AssignmentConfig,
}

impl BookingLifecycle {
    pub fn new(
        db: Database,
        queues: AssignmentQueues,
        messaging: Arc<dyn MessagingAdapter>,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            db,
            queues,
            messaging,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Create a booking and synchronously advance it as far as it can go.
    ///
    /// The booking starts in DRAFT and moves to AWAITING_BIRTH_DETAILS or
    /// AWAITING_SCHEDULE depending on profile completeness; BOOK_NOW
    /// bookings with a complete profile are scheduled (and dispatched)
    /// immediately. A sticky mapping pre-pins the agent. Operator-created
    /// bookings left awaiting a schedule prompt the user to pick a time.
    pub async fn create_booking(
        &self,
        user_id: i64,
        duration_mins: i64,
        booking_type: BookingType,
        operator_created: bool,
    ) -> Result<Booking, RingbookError> {
        let sticky = users::get_sticky_agent(&self.db, user_id, AgentRole::Consultant).await?;

        let booking = bookings::insert_booking(
            &self.db,
            bookings::NewBooking {
                user_id,
                agent_id: sticky.as_ref().map(|m| m.agent_id).unwrap_or(0),
                duration_mins,
                status: BookingStatus::Draft,
                booking_type,
                is_sticky_agent: sticky.is_some(),
                start_time: None,
                end_time: None,
            },
        )
        .await?;
        info!(booking_id = booking.booking_id, user_id, "booking created");

        self.advance_pending(user_id).await?;

        let booking = bookings::get_booking(&self.db, booking.booking_id)
            .await?
            .ok_or(RingbookError::NotFound {
                entity: "booking",
                id: booking.booking_id.to_string(),
            })?;

        if operator_created && booking.status == BookingStatus::AwaitingSchedule {
            self.notify_schedule_prompt(user_id).await;
        }

        Ok(booking)
    }

    /// Advance all of a user's pre-call bookings:
    /// DRAFT -> AWAITING_BIRTH_DETAILS / AWAITING_SCHEDULE, BOOK_NOW
    /// bookings through SCHEDULED, and due SCHEDULED bookings into the
    /// queue. Called after creation and after profile updates.
    pub async fn advance_pending(&self, user_id: i64) -> Result<(), RingbookError> {
        let db = &self.db;

        // DRAFT => AWAITING_BIRTH_DETAILS / AWAITING_SCHEDULE
        let drafts = bookings::for_user_with_status(
            db,
            user_id,
            &[BookingStatus::Draft, BookingStatus::AwaitingBirthDetails],
            None,
        )
        .await?;
        if !drafts.is_empty() {
            let has_details = users::get_user(db, user_id)
                .await?
                .map(|u| u.has_birth_details)
                .unwrap_or(false);
            let target = if has_details {
                BookingStatus::AwaitingSchedule
            } else {
                BookingStatus::AwaitingBirthDetails
            };
            for booking in &drafts {
                if booking.status != target {
                    bookings::update_status(db, booking.booking_id, target, None).await?;
                }
            }
        }

        // AWAITING_SCHEDULE => SCHEDULED (immediate bookings only)
        let awaiting =
            bookings::for_user_with_status(db, user_id, &[BookingStatus::AwaitingSchedule], None)
                .await?;
        for booking in awaiting {
            if booking.booking_type == BookingType::BookNow {
                self.schedule(booking.booking_id, Utc::now(), false).await?;
            }
        }

        // SCHEDULED => AWAITING_CALL for bookings whose time has come.
        let scheduled =
            bookings::for_user_with_status(db, user_id, &[BookingStatus::Scheduled], None).await?;
        let now = Utc::now();
        for booking in scheduled {
            if booking.start_time.is_some_and(|start| start <= now) {
                self.dispatch(booking.booking_id, None, 0, false).await?;
            }
        }

        Ok(())
    }

    /// Schedule a booking for `start_time`.
    ///
    /// Allowed from AWAITING_SCHEDULE unconditionally, or from any state
    /// with `force` (reschedule-after-failure, operator overrides). Resets
    /// the queued flag, bumps the scheduling counter, and dispatches
    /// immediately when the start time is already in the past. Returns
    /// whether the guard admitted the command.
    pub async fn schedule(
        &self,
        booking_id: i64,
        start_time: DateTime<Utc>,
        force: bool,
    ) -> Result<bool, RingbookError> {
        let booking = self.load(booking_id).await?;

        if !force && booking.status != BookingStatus::AwaitingSchedule {
            warn!(
                booking_id,
                status = %booking.status,
                "schedule rejected: booking is not awaiting schedule"
            );
            return Ok(false);
        }

        let end_time = start_time + Duration::minutes(booking.duration_mins);
        bookings::apply_schedule(&self.db, booking_id, start_time, end_time).await?;
        info!(booking_id, %start_time, "booking scheduled");

        if start_time <= Utc::now() {
            self.dispatch(booking_id, None, 0, false).await?;
        }

        Ok(true)
    }

    /// Reschedule with the default short delay, from any state.
    pub async fn reschedule(
        &self,
        booking_id: i64,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<(), RingbookError> {
        let start = start_time.unwrap_or_else(|| {
            Utc::now() + Duration::seconds(self.config.no_agent_retry_delay_secs as i64)
        });
        self.schedule(booking_id, start, true).await?;
        Ok(())
    }

    /// Publish the booking onto the assignment queue.
    ///
    /// Guarded on SCHEDULED and not-already-queued unless forced. The
    /// status moves to AWAITING_CALL first; the queued flag is set only
    /// after a successful publish, so a failed publish leaves the booking
    /// eligible for the dispatch sweep.
    pub async fn dispatch(
        &self,
        booking_id: i64,
        batch_uuid: Option<String>,
        call_retry_count: i64,
        force: bool,
    ) -> Result<bool, RingbookError> {
        let booking = self.load(booking_id).await?;

        if !force {
            if booking.is_queued {
                warn!(booking_id, "dispatch rejected: already queued");
                return Ok(false);
            }
            if booking.status != BookingStatus::Scheduled {
                warn!(booking_id, status = %booking.status, "dispatch rejected: not scheduled");
                return Ok(false);
            }
        }

        bookings::update_status(&self.db, booking_id, BookingStatus::AwaitingCall, None).await?;

        let envelope = AssignmentEnvelope::new(&booking, batch_uuid, call_retry_count, Utc::now());
        match self.queues.assignment.publish(&envelope.encode()?).await {
            Ok(()) => {
                bookings::set_queued(&self.db, booking_id, true).await?;
                info!(booking_id, "assignment published");
                Ok(true)
            }
            Err(e) => {
                // Back to SCHEDULED, not queued: the dispatch sweep retries.
                bookings::update_status(&self.db, booking_id, BookingStatus::Scheduled, Some(false))
                    .await?;
                warn!(booking_id, error = %e, "assignment publish failed, sweep will retry");
                Ok(false)
            }
        }
    }

    /// Push a replacement assignment for a failed call, immediately, onto
    /// the fast reattempt queue. Keeps the batch so already-tried agents
    /// stay excluded.
    pub async fn dispatch_replacement(
        &self,
        booking_id: i64,
        batch_uuid: String,
        call_retry_count: i64,
    ) -> Result<(), RingbookError> {
        let booking = self.load(booking_id).await?;

        bookings::update_status(&self.db, booking_id, BookingStatus::AwaitingCall, None).await?;
        let envelope =
            AssignmentEnvelope::new(&booking, Some(batch_uuid), call_retry_count, Utc::now());
        match self.queues.reattempt.publish(&envelope.encode()?).await {
            Ok(()) => {
                bookings::set_queued(&self.db, booking_id, true).await?;
                info!(booking_id, call_retry_count, "replacement assignment published");
            }
            Err(e) => {
                bookings::update_status(&self.db, booking_id, BookingStatus::Scheduled, Some(false))
                    .await?;
                warn!(booking_id, error = %e, "replacement publish failed, sweep will retry");
            }
        }
        Ok(())
    }

    /// Apply agent feedback. Allowed while the booking awaits feedback.
    pub async fn submit_feedback(
        &self,
        booking_id: i64,
        outcome: FeedbackOutcome,
    ) -> Result<bool, RingbookError> {
        let booking = self.load(booking_id).await?;

        if !matches!(
            booking.status,
            BookingStatus::AwaitingUserFeedback | BookingStatus::AwaitingUserFeedbackEscalated
        ) {
            warn!(booking_id, status = %booking.status, "feedback rejected");
            return Ok(false);
        }

        match outcome {
            FeedbackOutcome::Completed => {
                bookings::update_status(&self.db, booking_id, BookingStatus::Completed, None)
                    .await?;
                if booking.agent_id > 0 {
                    agents::set_last_success_at(&self.db, booking.agent_id, Utc::now()).await?;
                }
                info!(booking_id, "booking completed");
            }
            FeedbackOutcome::Escalated => {
                bookings::update_status(
                    &self.db,
                    booking_id,
                    BookingStatus::AwaitingUserFeedbackEscalated,
                    None,
                )
                .await?;
            }
            FeedbackOutcome::CallbackRequested(at) => {
                self.schedule(booking_id, at, true).await?;
            }
        }
        Ok(true)
    }

    /// Cancel a booking. Terminal states stay untouched.
    pub async fn cancel(&self, booking_id: i64) -> Result<bool, RingbookError> {
        let booking = self.load(booking_id).await?;
        if booking.status.is_terminal() {
            return Ok(false);
        }
        bookings::update_status(&self.db, booking_id, BookingStatus::Cancelled, None).await?;
        info!(booking_id, "booking cancelled");
        Ok(true)
    }

    /// Defer a booking for manual follow-up. Terminal states stay untouched.
    pub async fn defer(&self, booking_id: i64) -> Result<bool, RingbookError> {
        let booking = self.load(booking_id).await?;
        if booking.status.is_terminal() {
            return Ok(false);
        }
        bookings::update_status(&self.db, booking_id, BookingStatus::Deferred, None).await?;
        warn!(booking_id, "booking deferred for manual follow-up");
        Ok(true)
    }

    /// Sweep: force bookings stuck in AWAITING_SCHEDULE past the grace
    /// period through scheduling. Same calendar day only, immediate
    /// bookings only.
    pub async fn sweep_awaiting_schedule(&self) -> Result<(), RingbookError> {
        let now = Utc::now();
        let grace_cutoff = now - Duration::minutes(self.config.schedule_grace_mins);
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        let stuck = bookings::stuck_awaiting_schedule(&self.db, grace_cutoff, day_start).await?;
        for booking in stuck {
            if booking.booking_type != BookingType::BookNow {
                continue;
            }
            if let Err(e) = self.schedule(booking.booking_id, now, false).await {
                warn!(booking_id = booking.booking_id, error = %e, "forced schedule failed");
            }
        }
        Ok(())
    }

    /// Sweep: dispatch SCHEDULED, not-yet-queued bookings whose start time
    /// has passed, pacing publishes so a backlog does not burst the queue.
    pub async fn sweep_scheduled(&self) -> Result<(), RingbookError> {
        let cutoff = Utc::now() - Duration::seconds(5);
        let due = bookings::scheduled_due(&self.db, cutoff).await?;
        for booking in due {
            if let Err(e) = self.dispatch(booking.booking_id, None, 0, false).await {
                warn!(booking_id = booking.booking_id, error = %e, "sweep dispatch failed");
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.config.dispatch_gap_ms))
                .await;
        }
        Ok(())
    }

    /// Sweep: reclaim ongoing calls that produced no provider events at
    /// all within the stall timeout. Each is marked non-ongoing, its agent
    /// freed, and the booking rescheduled, a bounded number of times
    /// before it is deferred.
    pub async fn sweep_stalled_calls(&self) -> Result<(), RingbookError> {
        let now = Utc::now();
        let stall_cutoff = now - Duration::minutes(self.config.stall_timeout_mins);
        let stalled = calls::stalled_attempts(&self.db, stall_cutoff).await?;

        for call in stalled {
            if let Some(booking_id) = call.booking_id {
                let silent = calls::silent_attempt_count(
                    &self.db,
                    booking_id,
                    &call.user_phone_number,
                    now - Duration::minutes(1),
                )
                .await?;

                if silent < self.config.max_silent_attempts {
                    self.schedule(booking_id, now + Duration::minutes(5), true).await?;
                } else {
                    self.defer(booking_id).await?;
                }
            }

            calls::set_ongoing(&self.db, call.call_id, false).await?;
            agents::set_on_call(&self.db, call.agent_id, false, None).await?;
            warn!(call_id = call.call_id, "stalled call reclaimed");
        }
        Ok(())
    }

    /// Sweep: put CALL_ERROR bookings whose placement never reached the
    /// provider back onto the schedule and dispatch them.
    pub async fn sweep_call_errors(&self) -> Result<(), RingbookError> {
        let replayable = bookings::replayable_call_errors(&self.db).await?;
        for booking_id in replayable {
            bookings::update_status(&self.db, booking_id, BookingStatus::Scheduled, Some(false))
                .await?;
            info!(booking_id, "errored booking rescheduled");
        }
        self.sweep_scheduled().await
    }

    /// Fire-and-forget schedule prompt; delivery failures are logged only.
    async fn notify_schedule_prompt(&self, user_id: i64) {
        match users::get_user(&self.db, user_id).await {
            Ok(Some(user)) => {
                if let Err(e) = self.messaging.send_schedule_prompt(&user.phone_number).await {
                    warn!(user_id, error = %e, "schedule prompt failed");
                }
            }
            Ok(None) => warn!(user_id, "schedule prompt skipped: user not found"),
            Err(e) => warn!(user_id, error = %e, "schedule prompt lookup failed"),
        }
    }

    async fn load(&self, booking_id: i64) -> Result<Booking, RingbookError> {
        bookings::get_booking(&self.db, booking_id)
            .await?
            .ok_or(RingbookError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })
    }
}
