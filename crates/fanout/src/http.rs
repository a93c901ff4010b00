// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API surface built on axum.
//!
//! Job submission and polling under `/api`, provider callbacks under
//! `/webhooks/meta`. The webhook POST always answers the provider with 200
//! once the payload is authenticated and readable; reconciliation outcomes
//! are never surfaced upstream.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use fanout_config::model::{HttpConfig, WhatsAppConfig};
use fanout_core::types::DeliveryState;
use fanout_core::FanoutError;
use fanout_parser::FileFormat;
use fanout_whatsapp::webhook::{verify_signature, verify_subscription, WebhookPayload};

use crate::engine::{Engine, JobSubmission};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub whatsapp: WhatsAppConfig,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Response body for POST /api/jobs.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub total_recipients: i64,
    /// Count of file rows rejected during parsing.
    pub skipped_rows: usize,
    /// Up to three rejection reasons, for operator feedback.
    pub skipped_samples: Vec<String>,
}

/// Query parameters for GET /api/jobs/{id}/recipients.
#[derive(Debug, Deserialize)]
pub struct RecipientsQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Query parameters of Meta's webhook verification handshake.
#[derive(Debug, Deserialize)]
pub struct HubQuery {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/jobs", post(post_job))
        .route("/api/jobs/{id}/status", get(get_job_status))
        .route("/api/jobs/{id}/recipients", get(get_job_recipients))
        .route("/api/jobs/{id}/cancel", post(post_cancel_job))
        .route("/webhooks/meta", get(get_webhook).post(post_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn start_server(
    config: &HttpConfig,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), FanoutError> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FanoutError::Channel {
            message: format!("failed to bind HTTP server to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("HTTP server listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| FanoutError::Channel {
            message: format!("HTTP server error: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Map a domain error onto an HTTP status.
fn error_status(e: &FanoutError) -> StatusCode {
    match e {
        FanoutError::InvalidFile { .. } | FanoutError::EmptyRecipientSet => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FanoutError::CredentialNotFound { .. } | FanoutError::JobNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        FanoutError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: FanoutError) -> Response {
    let status = error_status(&e);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "request failed");
    }
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn get_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/jobs — multipart form: `title`, `body`, `business_id`,
/// `user_id`, optional `task_id`/`media_url`, and the recipient `file`.
async fn post_job(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut title = None;
    let mut body = None;
    let mut business_id = None;
    let mut user_id = None;
    let mut task_id = None;
    let mut media_url = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        };
        let name = field.name().unwrap_or("").to_string();
        let slot = match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, bytes.to_vec())),
                    Err(e) => return bad_request(format!("failed to read file field: {e}")),
                }
                continue;
            }
            "title" => &mut title,
            "body" => &mut body,
            "business_id" => &mut business_id,
            "user_id" => &mut user_id,
            "task_id" => &mut task_id,
            "media_url" => &mut media_url,
            other => return bad_request(format!("unexpected field `{other}`")),
        };
        match field.text().await {
            Ok(value) => *slot = Some(value),
            Err(e) => return bad_request(format!("failed to read field `{name}`: {e}")),
        }
    }

    let (Some(title), Some(body), Some(business_id), Some(user_id), Some((file_name, bytes))) =
        (title, body, business_id, user_id, file)
    else {
        return bad_request("required fields: title, body, business_id, user_id, file");
    };

    let Some(format) = FileFormat::from_file_name(&file_name) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                error: format!("unsupported file type `{file_name}`; expected .csv or .xlsx"),
            }),
        )
            .into_response();
    };

    let submission = JobSubmission {
        user_id,
        business_id,
        task_id,
        title,
        body,
        media_url,
        file_bytes: bytes,
        format,
    };

    match state.engine.submit_job(submission).await {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(SubmitResponse {
                skipped_samples: receipt
                    .skipped
                    .iter()
                    .take(3)
                    .map(|s| format!("row {}: {}", s.row, s.reason))
                    .collect(),
                skipped_rows: receipt.skipped.len(),
                job_id: receipt.job_id,
                total_recipients: receipt.total_recipients,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/{id}/status
async fn get_job_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.get_job_status(&id).await {
        Ok(report) => Json(serde_json::json!({
            "job": report.job,
            "stats": report.stats,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/{id}/recipients?state=&limit=&offset=
async fn get_job_recipients(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RecipientsQuery>,
) -> Response {
    let state_filter = match query.state.as_deref() {
        None | Some("") => None,
        Some(s) => match DeliveryState::from_str(s) {
            Ok(parsed) => Some(parsed),
            Err(_) => return bad_request(format!("unknown delivery state `{s}`")),
        },
    };

    match state
        .engine
        .list_recipients(&id, state_filter, query.limit.min(500), query.offset)
        .await
    {
        Ok(recipients) => Json(serde_json::json!({ "recipients": recipients })).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/jobs/{id}/cancel
async fn post_cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.cancel_job(&id).await {
        Ok(cancelled) => Json(serde_json::json!({ "cancelled": cancelled })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /webhooks/meta — Meta's subscription verification handshake.
async fn get_webhook(State(state): State<AppState>, Query(query): Query<HubQuery>) -> Response {
    let Some(configured) = state.whatsapp.verify_token.as_deref() else {
        warn!("webhook handshake rejected: no whatsapp.verify_token configured");
        return StatusCode::FORBIDDEN.into_response();
    };
    match verify_subscription(configured, &query.mode, &query.verify_token, &query.challenge) {
        Some(challenge) => challenge.to_string().into_response(),
        None => {
            warn!(mode = %query.mode, "webhook handshake rejected: token mismatch");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhooks/meta — delivery status events and recipient replies.
async fn post_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.whatsapp.app_secret.as_deref() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, &body, signature) {
            warn!("webhook rejected: bad or missing signature");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return bad_request(format!("unreadable webhook payload: {e}")),
    };

    for event in payload.delivery_events() {
        // Reconciliation outcomes are all benign; only storage failures log.
        if let Err(e) = state.engine.receive_delivery_event(&event).await {
            error!(
                provider_message_id = %event.provider_message_id.0,
                error = %e,
                "failed to apply delivery event"
            );
        }
    }

    for reply in payload.replies() {
        if let Err(e) = state
            .engine
            .receive_reply(&reply.from, &reply.text, reply.timestamp)
            .await
        {
            error!(from = %reply.from, error = %e, "failed to record reply");
        }
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        assert_eq!(
            error_status(&FanoutError::EmptyRecipientSet),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&FanoutError::InvalidFile {
                reason: "no phone column".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&FanoutError::JobNotFound {
                job_id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&FanoutError::CredentialNotFound {
                business_id: "b".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&FanoutError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn hub_query_uses_dotted_names() {
        let query: HubQuery = serde_json::from_value(serde_json::json!({
            "hub.mode": "subscribe",
            "hub.verify_token": "tok",
            "hub.challenge": "12345",
        }))
        .unwrap();
        assert_eq!(query.mode, "subscribe");
        assert_eq!(query.challenge, "12345");
    }

    #[test]
    fn recipients_query_defaults() {
        let query: RecipientsQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(query.state.is_none());
    }
}
