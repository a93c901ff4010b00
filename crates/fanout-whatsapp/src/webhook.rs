// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook codec for Meta's Cloud API delivery notifications.
//!
//! Parses the entry/changes envelope into flat [`DeliveryEvent`]s keyed on
//! the provider message id, verifies `X-Hub-Signature-256` request
//! signatures, and answers the `hub.challenge` subscription handshake.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use fanout_core::types::{DeliveryEvent, EventKind, ProviderMessageId};

type HmacSha256 = Hmac<Sha256>;

/// Top-level webhook envelope. Meta nests status updates two levels deep
/// under `entry[].changes[].value.statuses[]`.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// One delivery status notification for a previously sent message.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

/// An inbound message from a recipient, i.e. a reply to a dispatched
/// message. Only the text body is kept; media replies arrive without one.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub text: Option<InboundText>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundText {
    pub body: String,
}

/// A recipient reply flattened out of the webhook envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    /// Sender's phone as Meta reports it (digits, no `+`).
    pub from: String,
    pub text: String,
    /// Unix timestamp, when the provider included one.
    pub timestamp: Option<i64>,
}

impl WebhookPayload {
    /// Flatten the envelope into delivery events. Statuses with no mapping
    /// (provider-specific extras) are skipped with a debug log rather than
    /// failing the whole payload.
    pub fn delivery_events(&self) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                for status in &change.value.statuses {
                    let Some(kind) = map_status(&status.status) else {
                        debug!(status = %status.status, id = %status.id, "skipping unmapped status");
                        continue;
                    };
                    // Meta sends unix timestamps as strings.
                    let timestamp = status.timestamp.as_deref().and_then(|t| t.parse().ok());
                    events.push(DeliveryEvent {
                        provider_message_id: ProviderMessageId(status.id.clone()),
                        kind,
                        timestamp,
                    });
                }
            }
        }
        events
    }

    /// Flatten the envelope into recipient replies. Messages without a text
    /// body (media, reactions) are skipped with a debug log.
    pub fn replies(&self) -> Vec<ReplyEvent> {
        let mut replies = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                for message in &change.value.messages {
                    let Some(text) = &message.text else {
                        debug!(from = %message.from, "skipping non-text inbound message");
                        continue;
                    };
                    let timestamp = message.timestamp.as_deref().and_then(|t| t.parse().ok());
                    replies.push(ReplyEvent {
                        from: message.from.clone(),
                        text: text.body.clone(),
                        timestamp,
                    });
                }
            }
        }
        replies
    }
}

/// Meta reports the "seen" state as `read`.
fn map_status(status: &str) -> Option<EventKind> {
    match status {
        "sent" => Some(EventKind::Sent),
        "delivered" => Some(EventKind::Delivered),
        "read" => Some(EventKind::Seen),
        "failed" => Some(EventKind::Failed),
        _ => None,
    }
}

/// Verify the `X-Hub-Signature-256` header against the raw request body.
///
/// The header carries `sha256=<hex hmac>` computed with the Meta app secret
/// as the key. Returns false on any malformed header.
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Answer the subscription handshake: Meta issues a GET with `hub.mode`,
/// `hub.verify_token`, and `hub.challenge`; we echo the challenge only when
/// the mode and token match.
pub fn verify_subscription<'a>(
    configured_token: &str,
    mode: &str,
    token: &str,
    challenge: &'a str,
) -> Option<&'a str> {
    (mode == "subscribe" && token == configured_token).then_some(challenge)
}
