// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the fanout engine: delivery/job state machines,
//! id newtypes, and the records owned by the job store.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a message job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Unique identifier for a recipient delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub String);

/// The provider's message identifier, assigned once a send is accepted.
/// Immutable after being set; the reconciliation key for webhook events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderMessageId(pub String);

/// Per-recipient delivery lifecycle state.
///
/// Transitions are strictly forward:
/// `pending -> queued -> sent -> delivered -> seen`, with `failed` reachable
/// from `queued` (send errors) and `sent` (provider failure events).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Queued,
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl DeliveryState {
    /// A terminal state counts toward job completion. `delivered` is
    /// terminal for completion purposes even though `seen` may still follow.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Seen | Self::Failed)
    }

    /// Whether the forward-only state machine permits `self -> next`.
    pub fn can_transition_to(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Sent)
                | (Queued, Failed)
                | (Sent, Delivered)
                | (Sent, Seen)
                | (Sent, Failed)
                | (Delivered, Seen)
        )
    }
}

/// Coarse job status, cached on the job row and recomputed from the
/// recipient set whenever a delivery transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// Job-level setup failure only; mixed per-recipient outcomes still
    /// end in `completed`.
    Failed,
    Cancelled,
}

/// Kind of an inbound delivery event from the provider webhook.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Confirmation of a send the dispatcher already recorded; a no-op.
    Sent,
    Delivered,
    Seen,
    Failed,
}

/// One bulk-send request for a single business credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageJob {
    pub id: String,
    pub user_id: String,
    pub business_id: String,
    /// Optional task linkage, purely for display grouping.
    pub task_id: Option<String>,
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
    /// Fixed at creation; equals the count of recipient records.
    pub total_recipients: i64,
    pub status: JobStatus,
    /// Set on job-level setup failure.
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The per-recipient unit of work and its delivery lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientDelivery {
    pub id: String,
    pub job_id: String,
    /// E.164-normalized phone number.
    pub phone: String,
    /// Ordered personalization fields as a JSON object string, if any.
    pub fields_json: Option<String>,
    pub state: DeliveryState,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub attempt_count: i64,
    /// Insertion order within the job; dispatch follows it best-effort.
    pub position: i64,
    /// Text of the recipient's latest inbound reply, if any.
    pub reply_text: Option<String>,
    pub reply_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-state recipient counts for one job, computed fresh on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: i64,
    pub queued: i64,
    pub sent: i64,
    pub delivered: i64,
    pub seen: i64,
    pub failed: i64,
    /// Recipients that have sent an inbound reply. Orthogonal to delivery
    /// state and excluded from [`JobStats::total`].
    pub replied: i64,
}

impl JobStats {
    pub fn total(&self) -> i64 {
        self.pending + self.queued + self.sent + self.delivered + self.seen + self.failed
    }

    /// True when every recipient is in a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.pending == 0 && self.queued == 0 && self.sent == 0
    }

    /// True when at least one dispatch has started.
    pub fn dispatch_started(&self) -> bool {
        self.queued + self.sent + self.delivered + self.seen + self.failed > 0
    }
}

/// An active business messaging credential, as resolved from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCredential {
    pub business_id: String,
    pub token: String,
    pub phone_id: String,
    pub waba_id: String,
    /// Worker pool size for this credential.
    pub max_concurrency: i64,
    /// Minimum pause between consecutive sends on one worker.
    pub min_send_interval_ms: i64,
}

/// A delivery event keyed by provider message id, as handed to the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub provider_message_id: ProviderMessageId,
    pub kind: EventKind,
    /// Provider-reported unix timestamp, if present.
    pub timestamp: Option<i64>,
}

/// Current UTC time as an RFC 3339 string with millisecond precision,
/// matching the TEXT timestamp format used throughout storage.
pub fn now_rfc3339() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// RFC 3339 rendering of a provider unix timestamp, falling back to the
/// current time when the provider sent none.
pub fn rfc3339_from_unix(ts: Option<i64>) -> String {
    ts.and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(now_rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn delivery_state_round_trips_through_strings() {
        let variants = [
            DeliveryState::Pending,
            DeliveryState::Queued,
            DeliveryState::Sent,
            DeliveryState::Delivered,
            DeliveryState::Seen,
            DeliveryState::Failed,
        ];
        for state in variants {
            let s = state.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(DeliveryState::from_str(&s).unwrap(), state);
        }
    }

    #[test]
    fn state_machine_is_forward_only() {
        use DeliveryState::*;
        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Sent));
        assert!(Queued.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Seen));
        assert!(Sent.can_transition_to(Failed));
        assert!(Delivered.can_transition_to(Seen));

        // No skips, no backward moves.
        assert!(!Pending.can_transition_to(Sent));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Sent.can_transition_to(Queued));
        assert!(!Delivered.can_transition_to(Failed));
        assert!(!Seen.can_transition_to(Delivered));
        assert!(!Failed.can_transition_to(Sent));
    }

    #[test]
    fn terminal_states() {
        assert!(DeliveryState::Delivered.is_terminal());
        assert!(DeliveryState::Seen.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(!DeliveryState::Queued.is_terminal());
        assert!(!DeliveryState::Sent.is_terminal());
    }

    #[test]
    fn stats_helpers() {
        let stats = JobStats {
            sent: 2,
            failed: 1,
            replied: 1,
            ..Default::default()
        };
        assert_eq!(stats.total(), 3);
        assert!(!stats.all_terminal());
        assert!(stats.dispatch_started());

        let done = JobStats {
            delivered: 2,
            seen: 3,
            failed: 1,
            ..Default::default()
        };
        assert!(done.all_terminal());
    }

    #[test]
    fn job_status_serialization() {
        let status = JobStatus::Running;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"running\"");
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
