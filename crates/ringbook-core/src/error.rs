// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Ringbook call-routing backend.

use thiserror::Error;

/// The primary error type used across all Ringbook adapter traits and core operations.
#[derive(Debug, Error)]
pub enum RingbookError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Broker errors (connection loss, topology assertion failure, publish failure).
    #[error("broker error: {message}")]
    Broker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Telephony provider errors (call-placement API failure, malformed events).
    #[error("telephony error: {message}")]
    Telephony {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging provider errors (notification send failure).
    #[error("messaging error: {message}")]
    Messaging {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A queue message envelope could not be decoded.
    #[error("envelope error: {0}")]
    Envelope(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
