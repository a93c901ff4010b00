// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel client for deterministic dispatcher tests.
//!
//! `MockChannelClient` implements `ChannelClient` with scriptable per-number
//! outcomes and captured outbound messages for assertion in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use fanout_core::types::ProviderMessageId;
use fanout_core::{ChannelClient, OutboundMessage, SendError};

/// A mock messaging channel for testing.
///
/// By default every send succeeds with a generated provider id. Outcomes can
/// be scripted per phone number with `script()`; scripted outcomes are
/// consumed in order, after which the number falls back to success.
pub struct MockChannelClient {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Result<String, SendError>>>>>,
    sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    counter: AtomicU64,
}

impl MockChannelClient {
    /// Create a mock client where every send succeeds.
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue one outcome for the next send to `phone`.
    pub async fn script(&self, phone: &str, outcome: Result<String, SendError>) {
        self.scripts
            .lock()
            .await
            .entry(phone.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue one failure for the next send to `phone`.
    pub async fn fail_once(&self, phone: &str, error: SendError) {
        self.script(phone, Err(error)).await;
    }

    /// All `(to, message)` pairs passed to `send()`, in call order.
    pub async fn sent_messages(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().await.clone()
    }

    /// Total number of send attempts captured, including failed ones.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of send attempts for one phone number.
    pub async fn attempts_for(&self, phone: &str) -> usize {
        self.sent.lock().await.iter().filter(|(to, _)| to == phone).count()
    }
}

impl Default for MockChannelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelClient for MockChannelClient {
    async fn send(
        &self,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, SendError> {
        self.sent
            .lock()
            .await
            .push((to.to_string(), message.clone()));

        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(to)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(Ok(id)) => Ok(ProviderMessageId(id)),
            Some(Err(e)) => Err(e),
            None => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed);
                Ok(ProviderMessageId(format!("mock-wamid-{n}")))
            }
        }
    }
}
