// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for fanout integration tests.
//!
//! Provides mock channel clients and database fixtures for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockChannelClient`] - Mock channel with scriptable per-number outcomes
//! - [`fixtures`] - Migrated temp-database setup and record builders

pub mod fixtures;
pub mod mock_channel;

pub use mock_channel::MockChannelClient;
