// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./fanout.toml` > `~/.config/fanout/fanout.toml`
//! > `/etc/fanout/fanout.toml` with environment variable overrides via
//! the `FANOUT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::FanoutConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/fanout/fanout.toml` (system-wide)
/// 3. `~/.config/fanout/fanout.toml` (user XDG config)
/// 4. `./fanout.toml` (local directory)
/// 5. `FANOUT_*` environment variables
pub fn load_config() -> Result<FanoutConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FanoutConfig::default()))
        .merge(Toml::file("/etc/fanout/fanout.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("fanout/fanout.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("fanout.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<FanoutConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FanoutConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<FanoutConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FanoutConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `FANOUT_WHATSAPP_APP_SECRET` must map
/// to `whatsapp.app_secret`, not `whatsapp.app.secret`.
fn env_provider() -> Env {
    Env::prefixed("FANOUT_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("dispatcher_", "dispatcher.", 1)
            .replacen("whatsapp_", "whatsapp.", 1)
            .replacen("parser_", "parser.", 1)
            .replacen("http_", "http.", 1);
        mapped.into()
    })
}
