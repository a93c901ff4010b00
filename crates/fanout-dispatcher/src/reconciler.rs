// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciles provider delivery events with recipient state.
//!
//! Events are keyed strictly on the provider message id. Duplicates,
//! out-of-order arrivals, and events for unknown messages are all benign:
//! the forward-only state machine plus compare-and-swap writes make every
//! application idempotent.

use fanout_core::types::{DeliveryEvent, DeliveryState, EventKind};
use fanout_core::FanoutError;
use fanout_storage::{queries, Database};
use tracing::{debug, info};

/// How one delivery event was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The recipient advanced to the event's state.
    Applied(DeliveryState),
    /// Duplicate or out-of-order event; recipient already at or past it.
    AlreadyApplied,
    /// No recipient carries this provider message id.
    UnknownMessage,
    /// Event kind carries no state change (send confirmations).
    Ignored,
}

/// Apply one webhook delivery event.
///
/// Never fails on provider noise: only storage errors propagate.
pub async fn apply_event(
    db: &Database,
    event: &DeliveryEvent,
) -> Result<ReconcileOutcome, FanoutError> {
    let target = match event.kind {
        // The dispatcher already recorded the send when the API accepted it.
        EventKind::Sent => return Ok(ReconcileOutcome::Ignored),
        EventKind::Delivered => DeliveryState::Delivered,
        EventKind::Seen => DeliveryState::Seen,
        EventKind::Failed => DeliveryState::Failed,
    };

    let pmid = &event.provider_message_id.0;
    let Some(recipient) = queries::recipients::find_by_provider_message_id(db, pmid).await? else {
        debug!(provider_message_id = %pmid, "event for unknown message, ignoring");
        return Ok(ReconcileOutcome::UnknownMessage);
    };

    if recipient.state == target || !recipient.state.can_transition_to(target) {
        debug!(
            recipient_id = %recipient.id,
            state = %recipient.state,
            event = %event.kind,
            "event already reflected, ignoring"
        );
        return Ok(ReconcileOutcome::AlreadyApplied);
    }

    let error = matches!(event.kind, EventKind::Failed)
        .then_some("provider reported delivery failure");
    match queries::recipients::update_state(db, &recipient.id, recipient.state, target, error).await
    {
        Ok(()) => {}
        Err(e) if e.is_stale_state() => {
            // Raced a concurrent event for the same message.
            debug!(recipient_id = %recipient.id, "lost reconcile race, ignoring");
            return Ok(ReconcileOutcome::AlreadyApplied);
        }
        Err(e) => return Err(e),
    }

    info!(
        recipient_id = %recipient.id,
        job_id = %recipient.job_id,
        from = %recipient.state,
        to = %target,
        "delivery state advanced"
    );
    queries::jobs::refresh_status(db, &recipient.job_id).await?;
    Ok(ReconcileOutcome::Applied(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::types::{JobStatus, ProviderMessageId};
    use fanout_test_utils::fixtures::{seed_job, setup_db};

    fn event(pmid: &str, kind: EventKind) -> DeliveryEvent {
        DeliveryEvent {
            provider_message_id: ProviderMessageId(pmid.to_string()),
            kind,
            timestamp: Some(1_714_000_000),
        }
    }

    /// Seed one job with one recipient already marked sent under `pmid`.
    async fn seed_sent(db: &Database, pmid: &str) -> (String, String) {
        let job = seed_job(db, "job-1", &["+15550001"]).await;
        let claimed = queries::recipients::claim_pending_batch(db, &job.id, 1, 300)
            .await
            .unwrap();
        queries::recipients::mark_sent(db, &claimed[0].id, pmid)
            .await
            .unwrap();
        (job.id, claimed[0].id.clone())
    }

    async fn state_of(db: &Database, job_id: &str) -> DeliveryState {
        queries::recipients::list_for_job(db, job_id, None, 10, 0)
            .await
            .unwrap()[0]
            .state
    }

    #[tokio::test]
    async fn delivered_then_seen_advances_and_completes_job() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        let outcome = apply_event(&db, &event("wamid.A", EventKind::Delivered))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(DeliveryState::Delivered));
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Delivered);

        // delivered is terminal for completion purposes
        let job = queries::jobs::get_job(&db, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let outcome = apply_event(&db, &event("wamid.A", EventKind::Seen))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(DeliveryState::Seen));
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Seen);
    }

    #[tokio::test]
    async fn seen_can_skip_delivered() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        let outcome = apply_event(&db, &event("wamid.A", EventKind::Seen))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(DeliveryState::Seen));
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Seen);
    }

    #[tokio::test]
    async fn duplicate_event_is_a_no_op() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        apply_event(&db, &event("wamid.A", EventKind::Delivered))
            .await
            .unwrap();
        let outcome = apply_event(&db, &event("wamid.A", EventKind::Delivered))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadyApplied);
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn late_delivered_after_seen_does_not_regress() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        apply_event(&db, &event("wamid.A", EventKind::Seen))
            .await
            .unwrap();
        let outcome = apply_event(&db, &event("wamid.A", EventKind::Delivered))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadyApplied);
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Seen);
    }

    #[tokio::test]
    async fn provider_failure_event_fails_the_recipient() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        let outcome = apply_event(&db, &event("wamid.A", EventKind::Failed))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(DeliveryState::Failed));
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Failed);

        let rows = queries::recipients::list_for_job(&db, &job_id, None, 10, 0)
            .await
            .unwrap();
        assert!(rows[0].last_error.is_some());
    }

    #[tokio::test]
    async fn unknown_message_id_is_ignored() {
        let (db, _dir) = setup_db().await;
        seed_sent(&db, "wamid.A").await;

        let outcome = apply_event(&db, &event("wamid.NOPE", EventKind::Delivered))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownMessage);
    }

    #[tokio::test]
    async fn sent_confirmations_are_ignored() {
        let (db, _dir) = setup_db().await;
        let (job_id, _) = seed_sent(&db, "wamid.A").await;

        let outcome = apply_event(&db, &event("wamid.A", EventKind::Sent))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ignored);
        assert_eq!(state_of(&db, &job_id).await, DeliveryState::Sent);
    }
}
