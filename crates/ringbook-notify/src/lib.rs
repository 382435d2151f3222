// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider adapter for the Ringbook call-routing backend.
//!
//! Implements [`MessagingAdapter`] over the provider's template-send HTTP
//! API. Sends are fire-and-forget from the dispatch layer's perspective;
//! this client still surfaces transport errors so callers can log them.

use async_trait::async_trait;
use ringbook_config::model::MessagingConfig;
use ringbook_core::traits::{CollaboratorAdapter, MessagingAdapter};
use ringbook_core::types::{AdapterType, HealthStatus};
use ringbook_core::RingbookError;
use serde::Serialize;
use tracing::debug;

const SEND_TEMPLATE_PATH: &str = "/api/v1/sendTemplateMessage";

#[derive(Serialize)]
struct TemplateSend<'a> {
    template_name: &'a str,
    broadcast_name: &'a str,
}

/// HTTP client for the messaging provider's template-send API.
pub struct MessagingClient {
    client: reqwest::Client,
    config: MessagingConfig,
    api_key: String,
}

impl MessagingClient {
    /// Creates a new client. Requires `config.api_key` to be set.
    pub fn new(config: MessagingConfig) -> Result<Self, RingbookError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RingbookError::Config("messaging.api_key is required for notifications".into())
        })?;
        if api_key.is_empty() {
            return Err(RingbookError::Config("messaging.api_key cannot be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    async fn send_template(&self, phone_number: &str, template: &str) -> Result<(), RingbookError> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            SEND_TEMPLATE_PATH
        );

        let response = self
            .client
            .post(url)
            .query(&[("whatsappNumber", phone_number)])
            .header("Authorization", &self.api_key)
            .json(&TemplateSend {
                template_name: template,
                broadcast_name: template,
            })
            .send()
            .await
            .map_err(|e| RingbookError::Messaging {
                message: format!("template send `{template}` failed"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RingbookError::Messaging {
                message: format!("template send `{template}` returned HTTP {status}"),
                source: None,
            });
        }

        debug!(template, phone_number, "notification sent");
        Ok(())
    }
}

#[async_trait]
impl CollaboratorAdapter for MessagingClient {
    fn name(&self) -> &str {
        "messaging-http"
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
impl MessagingAdapter for MessagingClient {
    async fn send_reschedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError> {
        self.send_template(phone_number, &self.config.reschedule_template).await
    }

    async fn send_schedule_prompt(&self, phone_number: &str) -> Result<(), RingbookError> {
        self.send_template(phone_number, &self.config.schedule_template).await
    }
}
