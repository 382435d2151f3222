// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock telephony adapter for deterministic testing.
//!
//! `MockTelephony` implements `TelephonyAdapter` with scriptable placement
//! outcomes and captured placement requests for assertion in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ringbook_core::traits::adapter::CollaboratorAdapter;
use ringbook_core::traits::telephony::TelephonyAdapter;
use ringbook_core::types::{AdapterType, CallPlacement, HealthStatus};
use ringbook_core::RingbookError;

/// One captured outbound placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCall {
    pub agent_number: String,
    pub user_number: String,
    pub provider_call_id: Option<String>,
}

/// A mock telephony provider.
///
/// Outcomes are scripted via `script_outcome()`; with an empty script every
/// placement succeeds with a generated provider call id (`mock-call-N`).
pub struct MockTelephony {
    script: Mutex<VecDeque<Result<CallPlacement, RingbookError>>>,
    placed: Arc<Mutex<Vec<PlacedCall>>>,
    counter: AtomicU64,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            placed: Arc::new(Mutex::new(Vec::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue an outcome for the next placement request.
    pub async fn script_outcome(&self, outcome: Result<CallPlacement, RingbookError>) {
        self.script.lock().await.push_back(outcome);
    }

    /// All captured placement requests, in order.
    pub async fn placed_calls(&self) -> Vec<PlacedCall> {
        self.placed.lock().await.clone()
    }

    /// Number of placement requests seen so far.
    pub async fn placed_count(&self) -> usize {
        self.placed.lock().await.len()
    }
}

impl Default for MockTelephony {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollaboratorAdapter for MockTelephony {
    fn name(&self) -> &str {
        "mock-telephony"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Telephony
    }

    async fn health_check(&self) -> Result<HealthStatus, RingbookError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RingbookError> {
        Ok(())
    }
}

#[async_trait]
impl TelephonyAdapter for MockTelephony {
    async fn place_call(
        &self,
        agent_number: &str,
        user_number: &str,
    ) -> Result<CallPlacement, RingbookError> {
        let scripted = self.script.lock().await.pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome,
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                Ok(CallPlacement::Placed {
                    provider_call_id: format!("mock-call-{n}"),
                })
            }
        };

        let provider_call_id = match &outcome {
            Ok(CallPlacement::Placed { provider_call_id }) => Some(provider_call_id.clone()),
            _ => None,
        };
        self.placed.lock().await.push(PlacedCall {
            agent_number: agent_number.to_string(),
            user_number: user_number.to_string(),
            provider_call_id,
        });

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_placements_succeed_with_fresh_ids() {
        let mock = MockTelephony::new();
        let first = mock.place_call("911", "922").await.unwrap();
        let second = mock.place_call("911", "922").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(mock.placed_count().await, 2);
    }

    #[tokio::test]
    async fn scripted_rejection_is_returned_in_order() {
        let mock = MockTelephony::new();
        mock.script_outcome(Ok(CallPlacement::Rejected {
            reason: "do not call".to_string(),
        }))
        .await;

        let outcome = mock.place_call("911", "922").await.unwrap();
        assert_eq!(
            outcome,
            CallPlacement::Rejected {
                reason: "do not call".to_string()
            }
        );

        // Script exhausted: back to generated successes.
        assert!(matches!(
            mock.place_call("911", "922").await.unwrap(),
            CallPlacement::Placed { .. }
        ));
    }

    #[tokio::test]
    async fn captures_request_numbers() {
        let mock = MockTelephony::new();
        mock.place_call("911111", "922222").await.unwrap();
        let placed = mock.placed_calls().await;
        assert_eq!(placed[0].agent_number, "911111");
        assert_eq!(placed[0].user_number, "922222");
        assert!(placed[0].provider_call_id.is_some());
    }
}
