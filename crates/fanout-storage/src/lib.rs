// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the fanout engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! modules for jobs, recipient deliveries, credentials, and aggregate
//! stats. All per-recipient state transitions are compare-and-swap updates
//! on the current state.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

#[cfg(test)]
pub(crate) mod test_support;

pub use database::Database;
pub use models::*;
