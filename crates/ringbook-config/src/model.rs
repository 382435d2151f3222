// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Ringbook call-routing backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Ringbook configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RingbookConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Work-queue broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telephony provider settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Messaging provider settings.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Assignment, retry, and sweep tuning.
    #[serde(default)]
    pub assignment: AssignmentConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "ringbook".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Work-queue broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Per-channel prefetch: how many deliveries a consumer holds unacked.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            prefetch_count: default_prefetch_count(),
        }
    }
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_prefetch_count() -> u16 {
    1
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("ringbook").join("ringbook.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "ringbook.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Telephony provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelephonyConfig {
    /// Base URL of the provider's call-placement API.
    #[serde(default = "default_telephony_base_url")]
    pub base_url: String,

    /// Provider API key. `None` disables outbound calling.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Secondary authorization key some provider plans require.
    #[serde(default)]
    pub authorization_key: Option<String>,

    /// The bridge number both legs are dialed through.
    #[serde(default)]
    pub bridge_number: String,

    /// Caller id presented to both parties.
    #[serde(default)]
    pub caller_id: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: default_telephony_base_url(),
            api_key: None,
            authorization_key: None,
            bridge_number: String::new(),
            caller_id: String::new(),
        }
    }
}

fn default_telephony_base_url() -> String {
    "https://api.telephony.invalid".to_string()
}

/// Messaging provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    /// Base URL of the provider's template-send API.
    #[serde(default = "default_messaging_base_url")]
    pub base_url: String,

    /// Provider API key. `None` disables outbound notifications.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Template name for the "pick a new time" prompt.
    #[serde(default = "default_reschedule_template")]
    pub reschedule_template: String,

    /// Template name for the "pick a time" prompt on new bookings.
    #[serde(default = "default_schedule_template")]
    pub schedule_template: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_messaging_base_url(),
            api_key: None,
            reschedule_template: default_reschedule_template(),
            schedule_template: default_schedule_template(),
        }
    }
}

fn default_messaging_base_url() -> String {
    "https://api.messaging.invalid".to_string()
}

fn default_reschedule_template() -> String {
    "call_reschedule".to_string()
}

fn default_schedule_template() -> String {
    "select_call_time".to_string()
}

/// Assignment, retry, and sweep tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    /// Slack added to the call duration when checking an agent's next
    /// scheduled booking.
    #[serde(default = "default_selection_buffer_mins")]
    pub selection_buffer_mins: i64,

    /// Gap between successive publishes in the scheduled-bookings sweep,
    /// so a backlog does not burst the assignment queue.
    #[serde(default = "default_dispatch_gap_ms")]
    pub dispatch_gap_ms: u64,

    /// Reschedule delay when no agent is available.
    #[serde(default = "default_no_agent_retry_delay_secs")]
    pub no_agent_retry_delay_secs: u64,

    /// Reschedule delay when a sticky agent misses the call.
    #[serde(default = "default_sticky_retry_delay_secs")]
    pub sticky_retry_delay_secs: u64,

    /// How long a booking may sit in AWAITING_SCHEDULE before the sweep
    /// forces it through scheduling (same calendar day only).
    #[serde(default = "default_schedule_grace_mins")]
    pub schedule_grace_mins: i64,

    /// How long an ongoing call may go without any provider event before
    /// the stalled-call sweep reclaims it.
    #[serde(default = "default_stall_timeout_mins")]
    pub stall_timeout_mins: i64,

    /// Silent (event-less) attempts tolerated per booking before it is
    /// deferred for manual follow-up.
    #[serde(default = "default_max_silent_attempts")]
    pub max_silent_attempts: i64,

    /// Interval between sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            selection_buffer_mins: default_selection_buffer_mins(),
            dispatch_gap_ms: default_dispatch_gap_ms(),
            no_agent_retry_delay_secs: default_no_agent_retry_delay_secs(),
            sticky_retry_delay_secs: default_sticky_retry_delay_secs(),
            schedule_grace_mins: default_schedule_grace_mins(),
            stall_timeout_mins: default_stall_timeout_mins(),
            max_silent_attempts: default_max_silent_attempts(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_selection_buffer_mins() -> i64 {
    2
}

fn default_dispatch_gap_ms() -> u64 {
    50
}

fn default_no_agent_retry_delay_secs() -> u64 {
    60
}

fn default_sticky_retry_delay_secs() -> u64 {
    300
}

fn default_schedule_grace_mins() -> i64 {
    60
}

fn default_stall_timeout_mins() -> i64 {
    7
}

fn default_max_silent_attempts() -> i64 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    60
}
