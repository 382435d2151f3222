// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony provider adapter for the Ringbook call-routing backend.
//!
//! Implements [`TelephonyAdapter`] over the provider's bridged-call HTTP
//! API and owns the decoding of its webhook events (see [`events`]).

pub mod events;

use async_trait::async_trait;
use ringbook_config::model::TelephonyConfig;
use ringbook_core::traits::{CollaboratorAdapter, TelephonyAdapter};
use ringbook_core::types::{AdapterType, CallPlacement, HealthStatus};
use ringbook_core::RingbookError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use events::decode_event;

const MAKECALL_PATH: &str = "/Basic/v1/account/call/makecall";

#[derive(Serialize)]
struct MakeCallRequest<'a> {
    k_number: &'a str,
    caller_id: &'a str,
    agent_number: String,
    customer_number: String,
}

#[derive(Deserialize)]
struct MakeCallResponse {
    #[serde(default)]
    success: Option<MakeCallSuccess>,
    #[serde(default)]
    error: Option<MakeCallError>,
}

#[derive(Deserialize)]
struct MakeCallSuccess {
    call_id: String,
}

#[derive(Deserialize)]
struct MakeCallError {
    #[serde(default)]
    message: String,
}

/// HTTP client for the telephony provider's outbound-call API.
pub struct TelephonyClient {
    client: reqwest::Client,
    config: TelephonyConfig,
    api_key: String,
}

impl TelephonyClient {
    /// Creates a new client. Requires `config.api_key` to be set.
    pub fn new(config: TelephonyConfig) -> Result<Self, RingbookError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| {
                RingbookError::Config("telephony.api_key is required for outbound calling".into())
            })?;
        if api_key.is_empty() {
            return Err(RingbookError::Config("telephony.api_key cannot be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), MAKECALL_PATH)
    }
}

#[async_trait]
impl CollaboratorAdapter for TelephonyClient {
    fn name(&self) -> &str {
        "telephony-http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Telephony
    }

    async fn health_check(&self) -> Result<HealthStatus, RingbookError> {
        // The provider exposes no health endpoint; report configuration
        // completeness instead.
        if self.config.bridge_number.is_empty() || self.config.caller_id.is_empty() {
            return Ok(HealthStatus::Unhealthy(
                "bridge_number/caller_id not configured".to_string(),
            ));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RingbookError> {
        Ok(())
    }
}

#[async_trait]
impl TelephonyAdapter for TelephonyClient {
    async fn place_call(
        &self,
        agent_number: &str,
        user_number: &str,
    ) -> Result<CallPlacement, RingbookError> {
        let body = MakeCallRequest {
            k_number: &self.config.bridge_number,
            caller_id: &self.config.caller_id,
            agent_number: format!("+{}", agent_number.trim_start_matches('+')),
            customer_number: format!("+{}", user_number.trim_start_matches('+')),
        };

        let mut request = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .json(&body);
        if let Some(authorization) = &self.config.authorization_key {
            request = request.header("Authorization", authorization);
        }

        let response = request.send().await.map_err(|e| RingbookError::Telephony {
            message: "makecall request failed".to_string(),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RingbookError::Telephony {
                message: format!("makecall returned HTTP {status}"),
                source: None,
            });
        }

        let parsed: MakeCallResponse =
            response.json().await.map_err(|e| RingbookError::Telephony {
                message: "makecall response was not valid JSON".to_string(),
                source: Some(Box::new(e)),
            })?;

        if let Some(error) = parsed.error {
            warn!(reason = %error.message, "provider rejected call placement");
            return Ok(CallPlacement::Rejected { reason: error.message });
        }

        match parsed.success {
            Some(success) => {
                debug!(provider_call_id = %success.call_id, "call placed");
                Ok(CallPlacement::Placed {
                    provider_call_id: success.call_id,
                })
            }
            None => Ok(CallPlacement::Rejected {
                reason: "provider returned neither success nor error".to_string(),
            }),
        }
    }
}
