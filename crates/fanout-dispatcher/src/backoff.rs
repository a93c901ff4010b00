// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policy for transient send failures.
//!
//! Exponential backoff with half jitter, capped, with provider-supplied
//! `Retry-After` hints acting as a floor.

use std::time::Duration;

use fanout_config::model::DispatcherConfig;
use fanout_core::SendError;
use rand::Rng;

/// Retry parameters for one dispatch batch, snapshotted from config.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl From<&DispatcherConfig> for RetryPolicy {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped, jittered into the upper half of the window.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.backoff_cap_ms).max(1);
        let jittered = rand::thread_rng().gen_range(capped / 2..=capped);
        Duration::from_millis(jittered)
    }

    /// Backoff for a specific transient error. Rate-limit responses that
    /// carry a `Retry-After` hint never sleep less than the hint.
    pub fn delay_for(&self, attempt: u32, error: &SendError) -> Duration {
        let computed = self.backoff(attempt);
        match error {
            SendError::RateLimited {
                retry_after: Some(hint),
            } => computed.max(*hint),
            _ => computed,
        }
    }
}
