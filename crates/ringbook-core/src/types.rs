// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Ringbook workspace.
//!
//! Entity structs here are the canonical shapes shared between the storage
//! layer and the dispatch logic. Status enums are stored as their
//! SCREAMING_SNAKE_CASE text form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RingbookError;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a collaborator seam.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Telephony,
    Messaging,
}

/// Lifecycle state of a booking.
///
/// `Completed`, `Cancelled`, and `Deferred` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Draft,
    AwaitingBirthDetails,
    AwaitingSchedule,
    Scheduled,
    AwaitingCall,
    CallInProgress,
    AwaitingUserFeedback,
    AwaitingUserFeedbackEscalated,
    AwaitingReschedule,
    CallError,
    Deferred,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Deferred)
    }

    /// States a booking may hold while its assignment message sits in the
    /// work queue. `is_queued = true` implies one of these.
    pub fn is_pre_call(self) -> bool {
        matches!(self, Self::Scheduled | Self::AwaitingCall)
    }
}

/// How a booking was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    /// Call as soon as an agent is free.
    BookNow,
    /// Call at a user-selected time.
    BookLater,
    /// Extension of an in-progress call.
    ExtendCall,
}

/// Agent roles. Only consultants receive queue-assigned calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Consultant,
    Support,
}

/// Who initiated or hung up a call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CallerRole {
    System,
    Agent,
    User,
}

/// The two legs of a bridged call, as reported by the telephony provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLeg {
    Agent,
    User,
}

/// A registered end user.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub user_uuid: String,
    /// Normalized: digits only, country prefix included.
    pub phone_number: String,
    /// Preferred number for outbound calls, when different from `phone_number`.
    pub calling_number: Option<String>,
    pub user_name: String,
    /// Whether the profile carries the details required to place a call.
    pub has_birth_details: bool,
    pub created_at: DateTime<Utc>,
}

/// A human agent.
#[derive(Debug, Clone)]
pub struct Agent {
    pub agent_id: i64,
    pub agent_uuid: String,
    pub agent_name: String,
    pub phone_number: String,
    pub company_number: Option<String>,
    pub role: AgentRole,
    /// Static rank used by the availability resolver; higher wins.
    pub selection_priority: i64,
    pub is_active: bool,
}

/// Per-agent mutable availability record.
///
/// Owned by the availability resolver and the call-placement path. All
/// mutations are single-row conditional updates keyed by `agent_id`.
#[derive(Debug, Clone)]
pub struct AgentLiveStatus {
    pub agent_id: i64,
    pub is_online: bool,
    pub is_on_call: bool,
    pub is_calendar_free: bool,
    pub busy_until: Option<DateTime<Utc>>,
    pub next_booking_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Durable user-to-agent affinity. At most one active mapping per (user, role).
#[derive(Debug, Clone)]
pub struct StickyMapping {
    pub mapping_id: i64,
    pub user_id: i64,
    pub agent_id: i64,
    pub agent_role: AgentRole,
    pub is_active: bool,
}

/// One consultation request, from payment through completion.
#[derive(Debug, Clone)]
pub struct Booking {
    pub booking_id: i64,
    pub booking_uuid: String,
    pub user_id: i64,
    /// 0 until an agent is resolved.
    pub agent_id: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_mins: i64,
    pub status: BookingStatus,
    pub booking_type: BookingType,
    pub is_sticky_agent: bool,
    pub is_queued: bool,
    /// Incremented on every (re)schedule.
    pub retry_count: i64,
    // Turn-around-time milestones; each is set exactly once.
    pub first_agent_rang_at: Option<DateTime<Utc>>,
    pub first_agent_answered_at: Option<DateTime<Utc>>,
    pub first_user_rang_at: Option<DateTime<Utc>>,
    pub first_user_answered_at: Option<DateTime<Utc>>,
    pub first_user_hangup_at: Option<DateTime<Utc>>,
    pub last_call_attempted_at: Option<DateTime<Utc>>,
    pub last_scheduled_at: Option<DateTime<Utc>>,
    pub last_scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One outbound call placed for a booking (or, for non-prebooked flows,
/// for a raw phone number; `booking_id` is `None` there).
///
/// Milestone timestamps are set once and never overwritten; duplicate
/// provider events must leave them unchanged.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub call_id: i64,
    pub call_uuid: String,
    pub booking_id: Option<i64>,
    pub agent_id: i64,
    pub user_id: Option<i64>,
    /// Groups the retries of one logical assignment cycle.
    pub batch_uuid: String,
    pub booking_retry_count: i64,
    pub call_retry_count: i64,
    /// Provider-assigned id; `None` when placement itself failed.
    pub provider_call_id: Option<String>,
    pub agent_phone_number: String,
    pub user_phone_number: String,
    pub initiated_by: CallerRole,
    pub initiated_at: Option<DateTime<Utc>>,
    pub agent_rang_at: Option<DateTime<Utc>>,
    pub agent_answered_at: Option<DateTime<Utc>>,
    pub user_rang_at: Option<DateTime<Utc>>,
    pub user_answered_at: Option<DateTime<Utc>>,
    pub hangup_at: Option<DateTime<Utc>>,
    pub hangup_cause: Option<String>,
    pub hangup_by: Option<CallerRole>,
    pub is_ongoing: bool,
    pub is_error: bool,
    pub is_fulfilled: bool,
    pub call_duration_ideal_secs: i64,
    pub call_duration_actual_secs: Option<i64>,
    pub recording_url: Option<String>,
    /// Raw provider response from placement, kept for replay filtering.
    pub provider_response: Option<String>,
}

/// Outcome of an outbound call-placement request.
///
/// `Rejected` is a provider-level business refusal (bad number, DNC list);
/// transport failures surface as `Err(RingbookError::Telephony)` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPlacement {
    Placed { provider_call_id: String },
    Rejected { reason: String },
}

/// An asynchronous telephony provider event, decoded from webhook JSON.
///
/// Events arrive out of order and may be duplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AgentRang {
        provider_call_id: String,
        at: DateTime<Utc>,
    },
    AgentAnswered {
        provider_call_id: String,
        at: DateTime<Utc>,
    },
    UserRang {
        provider_call_id: String,
        at: DateTime<Utc>,
    },
    UserAnswered {
        provider_call_id: String,
        at: DateTime<Utc>,
    },
    Hangup {
        provider_call_id: String,
        at: DateTime<Utc>,
        cause: String,
        leg: CallLeg,
    },
    /// Post-call detail record.
    CallDetail {
        provider_call_id: String,
        duration_secs: i64,
        recording_url: Option<String>,
    },
}

impl ProviderEvent {
    /// The provider call id this event refers to.
    pub fn provider_call_id(&self) -> &str {
        match self {
            Self::AgentRang { provider_call_id, .. }
            | Self::AgentAnswered { provider_call_id, .. }
            | Self::UserRang { provider_call_id, .. }
            | Self::UserAnswered { provider_call_id, .. }
            | Self::Hangup { provider_call_id, .. }
            | Self::CallDetail { provider_call_id, .. } => provider_call_id,
        }
    }
}

/// Current wire version of [`AssignmentEnvelope`].
pub const ENVELOPE_VERSION: u32 = 2;

/// Retry metadata carried inside the assignment envelope.
///
/// `call_retry_count` is the authoritative attempt counter for replacement
/// calls within a batch; broker redelivery metadata is never consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default)]
    pub batch_uuid: Option<String>,
    pub booking_retry_count: i64,
    pub call_retry_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeData {
    pub booking_uuid: String,
    pub is_sticky_agent: bool,
    pub booked_at: String,
    pub pushed_at: String,
    pub metadata: EnvelopeMetadata,
}

/// The unit published to the assignment queue.
///
/// Versioned so older consumers can reject unknown versions; the payload is
/// re-derivable from booking + call-attempt state, making redelivery after
/// a crash idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEnvelope {
    pub message_version: u32,
    pub data: EnvelopeData,
}

/// Probe used to check the version before committing to the full schema.
#[derive(Deserialize)]
struct VersionProbe {
    message_version: u32,
}

impl AssignmentEnvelope {
    /// Build a version-2 envelope for a booking.
    pub fn new(
        booking: &Booking,
        batch_uuid: Option<String>,
        call_retry_count: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_version: ENVELOPE_VERSION,
            data: EnvelopeData {
                booking_uuid: booking.booking_uuid.clone(),
                is_sticky_agent: booking.is_sticky_agent,
                booked_at: booking.created_at.to_rfc3339(),
                pushed_at: now.to_rfc3339(),
                metadata: EnvelopeMetadata {
                    batch_uuid,
                    booking_retry_count: booking.retry_count,
                    call_retry_count,
                },
            },
        }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, RingbookError> {
        serde_json::to_vec(self).map_err(|e| RingbookError::Envelope(e.to_string()))
    }

    /// Decode defensively: the version field is checked first so unknown
    /// versions fail with a distinct message and can be dead-lettered
    /// rather than crashing the consumer.
    pub fn decode(payload: &[u8]) -> Result<Self, RingbookError> {
        let probe: VersionProbe = serde_json::from_slice(payload)
            .map_err(|e| RingbookError::Envelope(format!("not an envelope: {e}")))?;
        if probe.message_version != ENVELOPE_VERSION {
            return Err(RingbookError::Envelope(format!(
                "unsupported message_version {} (expected {})",
                probe.message_version, ENVELOPE_VERSION
            )));
        }
        serde_json::from_slice(payload)
            .map_err(|e| RingbookError::Envelope(format!("malformed v{ENVELOPE_VERSION}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_booking() -> Booking {
        Booking {
            booking_id: 1,
            booking_uuid: "b-uuid-1".to_string(),
            user_id: 7,
            agent_id: 0,
            start_time: None,
            end_time: None,
            duration_mins: 15,
            status: BookingStatus::Scheduled,
            booking_type: BookingType::BookNow,
            is_sticky_agent: false,
            is_queued: false,
            retry_count: 2,
            first_agent_rang_at: None,
            first_agent_answered_at: None,
            first_user_rang_at: None,
            first_user_answered_at: None,
            first_user_hangup_at: None,
            last_call_attempted_at: None,
            last_scheduled_at: None,
            last_scheduled_for: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn booking_status_round_trips_through_text() {
        use std::str::FromStr;
        for status in [
            BookingStatus::Draft,
            BookingStatus::AwaitingBirthDetails,
            BookingStatus::AwaitingSchedule,
            BookingStatus::Scheduled,
            BookingStatus::AwaitingCall,
            BookingStatus::CallInProgress,
            BookingStatus::AwaitingUserFeedback,
            BookingStatus::AwaitingUserFeedbackEscalated,
            BookingStatus::AwaitingReschedule,
            BookingStatus::CallError,
            BookingStatus::Deferred,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            let text = status.to_string();
            assert_eq!(BookingStatus::from_str(&text).unwrap(), status);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Deferred.is_terminal());
        assert!(!BookingStatus::AwaitingCall.is_terminal());
    }

    #[test]
    fn envelope_round_trip() {
        let booking = sample_booking();
        let envelope =
            AssignmentEnvelope::new(&booking, Some("batch-1".to_string()), 1, Utc::now());
        let bytes = envelope.encode().unwrap();
        let decoded = AssignmentEnvelope::decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.data.booking_uuid, "b-uuid-1");
        assert_eq!(decoded.data.metadata.booking_retry_count, 2);
        assert_eq!(decoded.data.metadata.call_retry_count, 1);
    }

    #[test]
    fn envelope_rejects_unknown_version() {
        let raw = br#"{"message_version": 99, "data": {}}"#;
        let err = AssignmentEnvelope::decode(raw).unwrap_err();
        assert!(err.to_string().contains("unsupported message_version 99"));
    }

    #[test]
    fn envelope_rejects_garbage() {
        let err = AssignmentEnvelope::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, RingbookError::Envelope(_)));
    }

    #[test]
    fn provider_event_exposes_call_id() {
        let event = ProviderEvent::Hangup {
            provider_call_id: "k-123".to_string(),
            at: Utc::now(),
            cause: "NORMAL_CLEARING".to_string(),
            leg: CallLeg::Agent,
        };
        assert_eq!(event.provider_call_id(), "k-123");
    }
}
