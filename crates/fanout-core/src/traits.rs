// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The channel client boundary: the one seam between the dispatcher and the
//! external messaging provider.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::ProviderMessageId;

/// The message content handed to a channel client for one recipient, with
/// personalization already rendered into the body.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
}

/// A per-recipient send failure, classified for retry policy.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Provider signaled rate limiting; honor `retry_after` when given.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// The request did not complete within the per-call timeout.
    #[error("send timed out")]
    Timeout,

    /// Network-level failure reaching the provider.
    #[error("connection error: {0}")]
    Connection(String),

    /// The recipient number was rejected as invalid or unreachable.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The business credential was rejected by the provider.
    #[error("credential rejected: {0}")]
    CredentialRejected(String),

    /// Any other provider API error; treated as permanent.
    #[error("provider error: {0}")]
    Api(String),
}

impl SendError {
    /// Transient errors are retried with backoff up to the configured
    /// ceiling; everything else fails the recipient immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SendError::RateLimited { .. } | SendError::Timeout | SendError::Connection(_)
        )
    }
}

/// Thin interface to the messaging provider's send API.
///
/// One client instance is bound to one business credential. Implementations
/// must be safe to share across the credential's worker pool.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Send `message` to the E.164 `to` number. Returns the provider's
    /// message identifier on acceptance.
    async fn send(
        &self,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, SendError>;
}
