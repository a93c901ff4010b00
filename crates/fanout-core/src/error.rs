// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the fanout engine.

use thiserror::Error;

use crate::types::DeliveryState;

/// The primary error type used across all fanout crates.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel client errors that are not per-recipient send failures
    /// (those are [`SendError`](crate::traits::SendError)).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The uploaded recipient file was rejected as a whole.
    #[error("invalid recipient file: {reason}")]
    InvalidFile { reason: String },

    /// A job was submitted with zero valid recipients after parsing.
    #[error("recipient set is empty after validation")]
    EmptyRecipientSet,

    /// The business does not resolve to an active channel credential.
    #[error("no active credential for business `{business_id}`")]
    CredentialNotFound { business_id: String },

    /// The requested job does not exist.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// A compare-and-swap state update lost the race: the record's current
    /// state no longer matches the expected prior state. Callers must treat
    /// this as "already handled" and skip.
    #[error("stale state for recipient {recipient_id}: expected {expected}")]
    StaleState {
        recipient_id: String,
        expected: DeliveryState,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    /// True for the benign CAS-conflict case that workers log and skip.
    pub fn is_stale_state(&self) -> bool {
        matches!(self, FanoutError::StaleState { .. })
    }
}
