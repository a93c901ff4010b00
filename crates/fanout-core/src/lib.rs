// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the fanout bulk dispatch engine.
//!
//! This crate provides the error type, delivery/job state machines, record
//! types, and the [`ChannelClient`] trait boundary used throughout the
//! fanout workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::FanoutError;
pub use traits::{ChannelClient, OutboundMessage, SendError};
pub use types::{
    ChannelCredential, DeliveryEvent, DeliveryState, EventKind, JobId, JobStats, JobStatus,
    MessageJob, ProviderMessageId, RecipientDelivery, RecipientId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = FanoutError::Config("test".into());
        let _storage = FanoutError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _channel = FanoutError::Channel {
            message: "test".into(),
            source: None,
        };
        let _file = FanoutError::InvalidFile {
            reason: "too large".into(),
        };
        let _empty = FanoutError::EmptyRecipientSet;
        let _cred = FanoutError::CredentialNotFound {
            business_id: "biz-1".into(),
        };
        let _job = FanoutError::JobNotFound {
            job_id: "job-1".into(),
        };
        let stale = FanoutError::StaleState {
            recipient_id: "r-1".into(),
            expected: DeliveryState::Pending,
        };
        assert!(stale.is_stale_state());
        let _timeout = FanoutError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = FanoutError::Internal("test".into());
    }

    #[test]
    fn stale_state_renders_expected_state() {
        let err = FanoutError::StaleState {
            recipient_id: "r-9".into(),
            expected: DeliveryState::Sent,
        };
        let msg = err.to_string();
        assert!(msg.contains("r-9"));
        assert!(msg.contains("sent"));
    }
}
