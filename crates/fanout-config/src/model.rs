// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the fanout engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level fanout configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FanoutConfig {
    /// Engine identity and logging settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dispatcher worker pool, retry, and pacing settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// WhatsApp Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Recipient file parsing limits.
    #[serde(default)]
    pub parser: ParserConfig,

    /// HTTP API settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Engine identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name of this deployment.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_engine_name() -> String {
    "fanout".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "fanout.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Dispatcher worker pool, retry, and pacing configuration.
///
/// `max_concurrency` and `min_send_interval_ms` are defaults; a credential
/// may override both for its own pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Workers per business credential.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pending recipients claimed per worker iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Send attempts per recipient before a permanent failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for any single backoff delay.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Per-call timeout for one provider send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Minimum pause between consecutive sends on one worker.
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,

    /// How long the scheduler sleeps when no work is claimable.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Age after which a claimed-but-unresolved recipient is re-dispatched.
    /// Covers claims orphaned by a crash between claim and send.
    #[serde(default = "default_requeue_after_secs")]
    pub requeue_after_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            min_send_interval_ms: default_min_send_interval_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            requeue_after_secs: default_requeue_after_secs(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_min_send_interval_ms() -> u64 {
    100
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_requeue_after_secs() -> u64 {
    300
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API base URL including version.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Meta app secret for webhook HMAC verification. `None` disables
    /// signature checks (dev mode) with a startup warning.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token echoed back during the webhook GET verification handshake.
    #[serde(default)]
    pub verify_token: Option<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            app_secret: None,
            verify_token: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://graph.facebook.com/v17.0".to_string()
}

/// Recipient file parsing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParserConfig {
    /// Maximum data rows per file; larger files are rejected whole.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_rows() -> usize {
    100_000
}

fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Host address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8070
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = FanoutConfig::default();
        assert_eq!(config.engine.name, "fanout");
        assert_eq!(config.engine.log_level, "info");
        assert_eq!(config.dispatcher.max_concurrency, 4);
        assert_eq!(config.dispatcher.batch_size, 50);
        assert_eq!(config.dispatcher.max_attempts, 3);
        assert_eq!(config.parser.max_file_bytes, 10 * 1024 * 1024);
        assert!(config.whatsapp.app_secret.is_none());
        assert!(config.storage.wal_mode);
    }

    #[test]
    fn api_base_url_has_no_trailing_slash() {
        let config = WhatsAppConfig::default();
        assert!(!config.api_base_url.ends_with('/'));
    }
}
