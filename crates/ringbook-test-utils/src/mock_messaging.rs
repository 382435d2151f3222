// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging adapter for deterministic testing.
//!
//! Captures every notification request so tests can assert on exactly-once
//! delivery behavior.

use async_trait::async_trait;
use tokio::sync::Mutex;

use ringbook_core::traits::adapter::CollaboratorAdapter;
use ringbook_core::traits::messaging::MessagingAdapter;
use ringbook_core::types::{AdapterType, HealthStatus};
use ringbook_core::RingbookError;

/// Kinds of notification the mock records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Reschedule,
    Schedule,
}

/// A mock messaging provider that records sends.
pub struct MockMessaging {
    sent: Mutex<Vec<(PromptKind, String)>>,
}

impl MockMessaging {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// All sends, in order, as (kind, phone number).
    pub async fn sent(&self) -> Vec<(PromptKind, String)> {
        self.sent.lock().await.clone()
    }

    /// Count of sends of one kind.
    pub async fn count(&self, kind: PromptKind) -> usize {
        self.sent.lock().await.iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Default for MockMessaging {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollaboratorAdapter for MockMessaging {
    fn name(&self) -> &str {
        "mock-messaging"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Messaging
    }

    async fn health_check(&self) -> Result<HealthStatus, RingbookError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RingbookError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingAdapter for MockMessaging {
    async fn send_reschedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError> {
        self.sent
            .lock()
            .await
            .push((PromptKind::Reschedule, phone_number.to_string()));
        Ok(())
    }

    async fn send_schedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError> {
        self.sent
            .lock()
            .await
            .push((PromptKind::Schedule, phone_number.to_string()));
        Ok(())
    }
}
