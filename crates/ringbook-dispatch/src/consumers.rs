// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue handlers for the assignment pipelines.
//!
//! One handler serves the primary assignment queue, its retry queue, the
//! fast reattempt queue, and the parked queue (manual replay): the
//! envelope is self-describing and the booking's status guards make
//! reprocessing idempotent, so the same logic applies everywhere.

use async_trait::async_trait;
use ringbook_core::types::{AssignmentEnvelope, BookingStatus};
use ringbook_core::RingbookError;
use ringbook_broker::{Delivery, HandlerOutcome, HandlerRegistry, QueueHandler};
use ringbook_storage::queries::{bookings, calls};
use ringbook_storage::Database;
use std::sync::Arc;
use tracing::{info, warn};

use crate::availability::AgentSelector;
use crate::lifecycle::BookingLifecycle;
use crate::placement::CallPlacer;

/// Extra headroom asked of the availability resolver beyond the booking's
/// own duration, so a selected agent is not squeezed by wrap-up time.
const SELECTION_HEADROOM_MINS: i64 = 5;

/// Consumes assignment envelopes: resolves an agent and places the call.
pub struct AssignmentHandler {
    db: Database,
    selector: AgentSelector,
    placer: CallPlacer,
    lifecycle: Arc<BookingLifecycle>,
}

impl AssignmentHandler {
    pub fn new(
        db: Database,
        selector: AgentSelector,
        placer: CallPlacer,
        lifecycle: Arc<BookingLifecycle>,
    ) -> Self {
        Self {
            db,
            selector,
            placer,
            lifecycle,
        }
    }

    /// Register one handler instance for every entry it serves.
    pub fn register_all(self: Arc<Self>, registry: &mut HandlerRegistry) {
        registry.register("lead_assign", self.clone());
        registry.register("lead_assign_retry", self.clone());
        registry.register("lead_reattempt", self.clone());
        // Manual replay from the parked queue runs the same logic.
        registry.register("lead_parked", self);
    }
}

#[async_trait]
impl QueueHandler for AssignmentHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<HandlerOutcome, RingbookError> {
        // Unknown versions and garbage go to the retry/dead-letter path,
        // never crash the consumer.
        let envelope = match AssignmentEnvelope::decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "undecodable assignment message");
                return Ok(HandlerOutcome::Fail);
            }
        };
        let data = &envelope.data;

        let Some(booking) = bookings::get_booking_by_uuid(&self.db, &data.booking_uuid).await?
        else {
            // Data-integrity failure: fail into the retry path; the booking
            // row may simply not be visible yet.
            warn!(booking_uuid = %data.booking_uuid, "booking not found for assignment");
            return Ok(HandlerOutcome::Fail);
        };

        // Redelivery of an already-handled envelope is a no-op, not an
        // error: only AWAITING_CALL bookings take a call.
        if booking.status != BookingStatus::AwaitingCall {
            info!(
                booking_id = booking.booking_id,
                status = %booking.status,
                "assignment no-op: booking already progressed"
            );
            return Ok(HandlerOutcome::Ack);
        }

        let duration = booking.duration_mins + SELECTION_HEADROOM_MINS;
        let agent = if booking.is_sticky_agent {
            self.selector.select(duration, &[], Some(booking.agent_id)).await?
        } else {
            let excluded = match &data.metadata.batch_uuid {
                Some(batch) => calls::agents_tried_in_batch(&self.db, batch).await?,
                None => Vec::new(),
            };
            self.selector.select(duration, &excluded, None).await?
        };

        let Some(agent) = agent else {
            // Nobody free right now: reschedule later and settle the message.
            info!(booking_id = booking.booking_id, "no agent available, rescheduling");
            self.lifecycle.reschedule(booking.booking_id, None).await?;
            return Ok(HandlerOutcome::Ack);
        };

        let batch_uuid = data
            .metadata
            .batch_uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let result = self
            .placer
            .place_for_booking(
                &booking,
                agent.agent_id,
                &batch_uuid,
                data.metadata.call_retry_count,
            )
            .await?;

        if !result.placed {
            // CALL_ERROR state and the error sweep own the failure from
            // here; the message itself is done.
            warn!(
                booking_id = booking.booking_id,
                reason = %result.message,
                "placement failed, booking left in error state"
            );
        }

        Ok(HandlerOutcome::Ack)
    }
}
