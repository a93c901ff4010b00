// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-recipient dispatch: render, send, retry, record.
//!
//! A worker owns one claimed recipient at a time. Transient send failures
//! are retried in-process with backoff up to the attempt ceiling; permanent
//! failures and exhausted retries end the recipient in `failed`. Every state
//! write is a compare-and-swap, so losing a race to a concurrent writer is
//! logged and skipped, never fatal.

use fanout_core::types::{MessageJob, RecipientDelivery};
use fanout_core::{ChannelClient, FanoutError, OutboundMessage};
use fanout_storage::{queries, Database};
use tracing::{debug, warn};

use crate::backoff::RetryPolicy;
use crate::template;

/// How one claimed recipient's dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Provider accepted the message; recipient is `sent`.
    Sent,
    /// Permanent failure or retries exhausted; recipient is `failed`.
    Failed,
    /// A concurrent writer moved the recipient first; nothing recorded.
    Raced,
}

/// Build the outbound message for one recipient, with personalization
/// rendered into the body.
pub fn outbound_for(job: &MessageJob, recipient: &RecipientDelivery) -> OutboundMessage {
    OutboundMessage {
        title: job.title.clone(),
        body: template::render(&job.body, recipient.fields_json.as_deref()),
        media_url: job.media_url.clone(),
    }
}

/// Dispatch one claimed (`queued`) recipient to completion.
pub async fn dispatch_recipient(
    db: &Database,
    client: &dyn ChannelClient,
    job: &MessageJob,
    recipient: &RecipientDelivery,
    retry: &RetryPolicy,
) -> Result<DispatchOutcome, FanoutError> {
    let message = outbound_for(job, recipient);
    // Attempts already burned before a restart still count.
    let mut attempts = recipient.attempt_count.max(0) as u32;

    loop {
        attempts += 1;
        match client.send(&recipient.phone, &message).await {
            Ok(provider_id) => {
                debug!(
                    recipient_id = %recipient.id,
                    provider_message_id = %provider_id.0,
                    attempts,
                    "send accepted"
                );
                return match queries::recipients::mark_sent(db, &recipient.id, &provider_id.0)
                    .await
                {
                    Ok(()) => Ok(DispatchOutcome::Sent),
                    Err(e) if e.is_stale_state() => {
                        warn!(recipient_id = %recipient.id, "lost mark-sent race, skipping");
                        Ok(DispatchOutcome::Raced)
                    }
                    Err(e) => Err(e),
                };
            }
            Err(e) if e.is_transient() && attempts < retry.max_attempts => {
                let delay = retry.delay_for(attempts, &e);
                debug!(
                    recipient_id = %recipient.id,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient send failure, retrying"
                );
                queries::recipients::record_retry(db, &recipient.id, &e.to_string()).await?;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    recipient_id = %recipient.id,
                    attempts,
                    error = %e,
                    "send failed permanently"
                );
                return match queries::recipients::mark_send_failed(db, &recipient.id, &e.to_string())
                    .await
                {
                    Ok(()) => Ok(DispatchOutcome::Failed),
                    Err(err) if err.is_stale_state() => {
                        warn!(recipient_id = %recipient.id, "lost mark-failed race, skipping");
                        Ok(DispatchOutcome::Raced)
                    }
                    Err(err) => Err(err),
                };
            }
        }
    }
}
