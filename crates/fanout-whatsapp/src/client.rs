// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel client for the Meta WhatsApp Cloud API send endpoint.
//!
//! One client is bound to one business credential. Media messages go out as
//! an image with the title and body folded into the caption; text-only
//! messages as a plain text payload. Failures are classified into the
//! transient/permanent taxonomy the dispatcher's retry policy consumes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use fanout_config::model::WhatsAppConfig;
use fanout_core::types::{ChannelCredential, ProviderMessageId};
use fanout_core::{ChannelClient, FanoutError, OutboundMessage, SendError};

/// Error codes Meta uses for undeliverable or disallowed recipients.
const RECIPIENT_ERROR_CODES: [i64; 3] = [131_026, 131_030, 131_021];

/// A configured Cloud API client for one business credential.
pub struct WhatsAppClient {
    http: reqwest::Client,
    messages_url: String,
    token: String,
}

impl WhatsAppClient {
    /// Build a client from the engine's WhatsApp settings and one resolved
    /// business credential. `send_timeout` bounds every API call.
    pub fn new(
        config: &WhatsAppConfig,
        credential: &ChannelCredential,
        send_timeout: Duration,
    ) -> Result<Self, FanoutError> {
        if credential.token.is_empty() {
            return Err(FanoutError::Config(format!(
                "credential for business `{}` has an empty token",
                credential.business_id
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .map_err(|e| FanoutError::Channel {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            messages_url: format!(
                "{}/{}/messages",
                config.api_base_url.trim_end_matches('/'),
                credential.phone_id
            ),
            token: credential.token.clone(),
        })
    }

    fn payload(to: &str, message: &OutboundMessage) -> serde_json::Value {
        let caption = format!("{}\n\n{}", message.title, message.body);
        match &message.media_url {
            Some(url) => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "image",
                "image": { "link": url, "caption": caption },
            }),
            None => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": { "body": caption },
            }),
        }
    }
}

#[async_trait]
impl ChannelClient for WhatsAppClient {
    async fn send(
        &self,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, SendError> {
        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.token)
            .json(&Self::payload(to, message))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        debug!(%status, to, "WhatsApp API response");

        if status.is_success() {
            let body: SendResponse = response
                .json()
                .await
                .map_err(|e| SendError::Api(format!("unreadable success body: {e}")))?;
            return body
                .messages
                .into_iter()
                .next()
                .map(|m| ProviderMessageId(m.id))
                .ok_or_else(|| SendError::Api("success response carried no message id".into()));
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SendError::RateLimited { retry_after });
        }

        let detail = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|b| b.error);
        let message_text = detail
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SendError::CredentialRejected(message_text));
        }
        if let Some(code) = detail.as_ref().and_then(|e| e.code) {
            if RECIPIENT_ERROR_CODES.contains(&code) {
                return Err(SendError::InvalidRecipient(message_text));
            }
        }
        Err(SendError::Api(message_text))
    }
}

fn classify_transport_error(e: reqwest::Error) -> SendError {
    if e.is_timeout() {
        SendError::Timeout
    } else if e.is_connect() {
        SendError::Connection(e.to_string())
    } else {
        SendError::Api(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}
