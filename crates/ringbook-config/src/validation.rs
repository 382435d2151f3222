// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and sane retry bounds.

use crate::diagnostic::ConfigError;
use crate::model::RingbookConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &RingbookConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.broker.prefetch_count == 0 {
        errors.push(ConfigError::Validation {
            message: "broker.prefetch_count must be at least 1".to_string(),
        });
    }

    if config.broker.reconnect_delay_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "broker.reconnect_delay_secs must be at least 1".to_string(),
        });
    }

    if config.assignment.selection_buffer_mins < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "assignment.selection_buffer_mins must be non-negative, got {}",
                config.assignment.selection_buffer_mins
            ),
        });
    }

    if config.assignment.max_silent_attempts < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "assignment.max_silent_attempts must be at least 1, got {}",
                config.assignment.max_silent_attempts
            ),
        });
    }

    if config.assignment.stall_timeout_mins < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "assignment.stall_timeout_mins must be at least 1, got {}",
                config.assignment.stall_timeout_mins
            ),
        });
    }

    // An api_key without the paired routing numbers cannot place calls.
    if config.telephony.api_key.is_some()
        && (config.telephony.bridge_number.trim().is_empty()
            || config.telephony.caller_id.trim().is_empty())
    {
        errors.push(ConfigError::Validation {
            message: "telephony.bridge_number and telephony.caller_id are required when \
                      telephony.api_key is set"
                .to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = RingbookConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RingbookConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn zero_prefetch_fails_validation() {
        let mut config = RingbookConfig::default();
        config.broker.prefetch_count = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("prefetch_count"))));
    }

    #[test]
    fn api_key_without_numbers_fails_validation() {
        let mut config = RingbookConfig::default();
        config.telephony.api_key = Some("key".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("bridge_number"))));
    }

    #[test]
    fn toml_deserialization_denies_unknown_fields() {
        let toml_str = r#"
[assignment]
dispatch_gap_ms = 25
unknown_field = true
"#;
        assert!(toml::from_str::<RingbookConfig>(toml_str).is_err());
    }

    #[test]
    fn toml_deserialization_fills_defaults() {
        let toml_str = r#"
[assignment]
dispatch_gap_ms = 25
"#;
        let config: RingbookConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.assignment.dispatch_gap_ms, 25);
        assert_eq!(config.assignment.max_silent_attempts, 3);
    }

    #[test]
    fn full_telephony_section_passes() {
        let mut config = RingbookConfig::default();
        config.telephony.api_key = Some("key".to_string());
        config.telephony.bridge_number = "+918000000000".to_string();
        config.telephony.caller_id = "+918000000001".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
