// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./ringbook.toml` > `~/.config/ringbook/ringbook.toml`
//! > `/etc/ringbook/ringbook.toml` with environment variable overrides via
//! `RINGBOOK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RingbookConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/ringbook/ringbook.toml` (system-wide)
/// 3. `~/.config/ringbook/ringbook.toml` (user XDG config)
/// 4. `./ringbook.toml` (local directory)
/// 5. `RINGBOOK_*` environment variables
pub fn load_config() -> Result<RingbookConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingbookConfig::default()))
        .merge(Toml::file("/etc/ringbook/ringbook.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("ringbook/ringbook.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("ringbook.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<RingbookConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingbookConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RingbookConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingbookConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `RINGBOOK_STORAGE_DATABASE_PATH` must
/// map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("RINGBOOK_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("broker_", "broker.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("telephony_", "telephony.", 1)
            .replacen("messaging_", "messaging.", 1)
            .replacen("assignment_", "assignment.", 1);
        mapped.into()
    })
}
