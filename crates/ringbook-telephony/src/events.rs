// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event decoding.
//!
//! The provider posts two shapes: lifecycle milestones carry an
//! `event_type` field with a local (UTC+5:30) event timestamp and a
//! `leg_identifier`; post-call detail records carry `type: "CDR"` with the
//! billed duration and an optional recording URL. Timestamps are
//! normalized to UTC here so nothing downstream sees provider-local time.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use ringbook_core::types::{CallLeg, ProviderEvent};
use ringbook_core::RingbookError;
use serde_json::Value;

/// The provider reports event times in its local zone, UTC+5:30.
const PROVIDER_UTC_OFFSET_MINS: i64 = 330;

/// Decode one webhook payload.
///
/// Returns `Ok(None)` for recognized payloads carrying an event type this
/// core does not track; malformed payloads are errors.
pub fn decode_event(payload: &Value) -> Result<Option<ProviderEvent>, RingbookError> {
    let provider_call_id = payload
        .get("uuid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if provider_call_id.is_empty() {
        return Err(malformed("missing uuid"));
    }

    if let Some(event_type) = payload.get("event_type").and_then(Value::as_str) {
        let at = parse_local_timestamp(
            payload
                .get("event_date_local")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("missing event_date_local"))?,
        )?;

        let event = match event_type {
            "AGENT_CALL" => ProviderEvent::AgentRang { provider_call_id, at },
            "AGENT_ANSWER" => ProviderEvent::AgentAnswered { provider_call_id, at },
            "CUSTOMER_CALL" => ProviderEvent::UserRang { provider_call_id, at },
            "CUSTOMER_ANSWER" => ProviderEvent::UserAnswered { provider_call_id, at },
            "HANGUP" => {
                let leg = match payload.get("leg_identifier").and_then(Value::as_str) {
                    Some("agent") => CallLeg::Agent,
                    Some("customer") => CallLeg::User,
                    other => {
                        return Err(malformed(&format!("unknown leg_identifier {other:?}")));
                    }
                };
                let cause = payload
                    .get("hangup_cause")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN")
                    .to_string();
                ProviderEvent::Hangup { provider_call_id, at, cause, leg }
            }
            _ => return Ok(None),
        };
        return Ok(Some(event));
    }

    if payload.get("type").and_then(Value::as_str) == Some("CDR") {
        let duration_secs = payload
            .get("call_duration")
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("missing call_duration"))?;
        let recording_url = payload
            .get("resource_url")
            .and_then(Value::as_str)
            .map(String::from);
        return Ok(Some(ProviderEvent::CallDetail {
            provider_call_id,
            duration_secs,
            recording_url,
        }));
    }

    Ok(None)
}

/// Parse a provider-local timestamp and normalize to UTC.
fn parse_local_timestamp(raw: &str) -> Result<DateTime<Utc>, RingbookError> {
    // Some event feeds send RFC3339 with an explicit offset; the usual
    // shape is a bare local datetime.
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| malformed(&format!("bad event_date_local `{raw}`: {e}")))?;
    Ok(naive.and_utc() - Duration::minutes(PROVIDER_UTC_OFFSET_MINS))
}

fn malformed(detail: &str) -> RingbookError {
    RingbookError::Telephony {
        message: format!("malformed webhook event: {detail}"),
        source: None,
    }
}
