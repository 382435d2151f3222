// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait that all collaborator adapters must implement.

use async_trait::async_trait;

use crate::error::RingbookError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for Ringbook's external collaborator adapters.
///
/// Every adapter (telephony, messaging) implements this trait, which
/// provides identity, lifecycle, and health check capabilities.
#[async_trait]
pub trait CollaboratorAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter (telephony or messaging).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, RingbookError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), RingbookError>;
}
