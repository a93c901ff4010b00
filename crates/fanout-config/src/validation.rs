// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero pool sizes and well-formed addresses.
//! Collects all failures rather than failing fast.

use crate::diagnostic::ConfigError;
use crate::model::FanoutConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &FanoutConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.dispatcher.max_concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatcher.max_concurrency must be at least 1".to_string(),
        });
    }

    if config.dispatcher.batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatcher.batch_size must be at least 1".to_string(),
        });
    }

    if config.dispatcher.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatcher.max_attempts must be at least 1".to_string(),
        });
    }

    if config.dispatcher.backoff_cap_ms < config.dispatcher.backoff_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatcher.backoff_cap_ms ({}) must be >= backoff_base_ms ({})",
                config.dispatcher.backoff_cap_ms, config.dispatcher.backoff_base_ms
            ),
        });
    }

    if config.dispatcher.requeue_after_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatcher.requeue_after_secs must be at least 1".to_string(),
        });
    }

    if config.dispatcher.send_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatcher.send_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.parser.max_rows == 0 {
        errors.push(ConfigError::Validation {
            message: "parser.max_rows must be at least 1".to_string(),
        });
    }

    if config.parser.max_file_bytes == 0 {
        errors.push(ConfigError::Validation {
            message: "parser.max_file_bytes must be at least 1".to_string(),
        });
    }

    {
        let addr = config.http.bind_address.trim();
        if addr.is_empty() {
            errors.push(ConfigError::Validation {
                message: "http.bind_address must not be empty".to_string(),
            });
        } else {
            let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
            let is_valid_hostname = addr
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
            if !is_valid_ip && !is_valid_hostname {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "http.bind_address `{addr}` is not a valid IP address or hostname"
                    ),
                });
            }
        }
    }

    if !config.whatsapp.api_base_url.starts_with("http") {
        errors.push(ConfigError::Validation {
            message: format!(
                "whatsapp.api_base_url `{}` must be an http(s) URL",
                config.whatsapp.api_base_url
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
