// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade: the operations the host application and HTTP surface
//! call.
//!
//! Submission is all-or-nothing: the credential is resolved and the file
//! parsed before anything is written, and the job plus its recipient rows
//! land in one transaction. Everything after submission is driven by the
//! dispatcher and reconciler against the same database.

use fanout_config::FanoutConfig;
use fanout_core::types::{
    now_rfc3339, rfc3339_from_unix, DeliveryEvent, DeliveryState, JobStats, JobStatus, MessageJob,
    RecipientDelivery,
};
use fanout_core::FanoutError;
use fanout_dispatcher::ReconcileOutcome;
use fanout_parser::{FileFormat, SkippedRow};
use fanout_storage::models::NewRecipient;
use fanout_storage::{queries, Database};
use tracing::{debug, info, warn};

/// One bulk-send request as received from the caller.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub user_id: String,
    pub business_id: String,
    /// Optional task linkage, purely for display grouping.
    pub task_id: Option<String>,
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
    pub file_bytes: Vec<u8>,
    pub format: FileFormat,
}

/// What an accepted submission produced.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub total_recipients: i64,
    /// Rows rejected during parsing, for operator feedback.
    pub skipped: Vec<SkippedRow>,
}

/// The polling payload: the job row plus a fresh stats snapshot.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub job: MessageJob,
    pub stats: JobStats,
}

/// The bulk dispatch engine over one database.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    config: FanoutConfig,
}

impl Engine {
    /// Open the configured database and build the engine.
    pub async fn new(config: FanoutConfig) -> Result<Self, FanoutError> {
        let db = Database::open(&config.storage.database_path).await?;
        if !config.storage.wal_mode {
            db.disable_wal().await?;
        }
        Ok(Self { db, config })
    }

    /// Build an engine over an already-open database.
    pub fn with_database(db: Database, config: FanoutConfig) -> Self {
        Self { db, config }
    }

    /// The shared database handle, for wiring up the scheduler.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Validate and persist one bulk-send request.
    ///
    /// Rejects before any write: no active credential for the business, an
    /// unparseable file, or a file yielding zero valid recipients. On
    /// success the job and all its `pending` recipient rows exist
    /// atomically.
    pub async fn submit_job(
        &self,
        submission: JobSubmission,
    ) -> Result<SubmissionReceipt, FanoutError> {
        queries::credentials::get_active_credential(&self.db, &submission.business_id).await?;

        let outcome = fanout_parser::parse_recipients(
            &submission.file_bytes,
            submission.format,
            &self.config.parser,
        )?;
        if outcome.records.is_empty() {
            warn!(
                business_id = %submission.business_id,
                skipped = outcome.skipped.len(),
                reasons = ?outcome.sample_reasons(3),
                "submission rejected: no valid recipients"
            );
            return Err(FanoutError::EmptyRecipientSet);
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let recipients: Vec<NewRecipient> = outcome
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| NewRecipient {
                id: format!("{job_id}-r{i}"),
                phone: r.phone.clone(),
                fields_json: fields_to_json(&r.fields),
            })
            .collect();

        let job = MessageJob {
            id: job_id.clone(),
            user_id: submission.user_id,
            business_id: submission.business_id,
            task_id: submission.task_id,
            title: submission.title,
            body: submission.body,
            media_url: submission.media_url,
            total_recipients: recipients.len() as i64,
            status: JobStatus::Queued,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        };

        queries::jobs::create_job_with_recipients(&self.db, &job, &recipients).await?;

        info!(
            job_id = %job.id,
            business_id = %job.business_id,
            total_recipients = job.total_recipients,
            skipped = outcome.skipped.len(),
            "job submitted"
        );

        Ok(SubmissionReceipt {
            job_id,
            total_recipients: job.total_recipients,
            skipped: outcome.skipped,
        })
    }

    /// The job row plus a fresh per-state stats snapshot.
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, FanoutError> {
        let job = self.require_job(job_id).await?;
        let stats = queries::stats::job_stats(&self.db, job_id).await?;
        Ok(JobStatusReport { job, stats })
    }

    /// Paginated recipient listing in file order, optionally filtered by
    /// delivery state.
    pub async fn list_recipients(
        &self,
        job_id: &str,
        state: Option<DeliveryState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecipientDelivery>, FanoutError> {
        self.require_job(job_id).await?;
        queries::recipients::list_for_job(&self.db, job_id, state, limit, offset).await
    }

    /// Mark a job cancelled so the dispatcher stops claiming its pending
    /// recipients. In-flight sends complete normally. Returns false when
    /// the job was already terminal.
    pub async fn cancel_job(&self, job_id: &str) -> Result<bool, FanoutError> {
        self.require_job(job_id).await?;
        let cancelled = queries::jobs::cancel(&self.db, job_id).await?;
        if cancelled {
            info!(job_id, "job cancelled");
        }
        Ok(cancelled)
    }

    /// Absorb one provider delivery event. Unknown ids and duplicates are
    /// benign no-ops; only storage failures surface.
    pub async fn receive_delivery_event(
        &self,
        event: &DeliveryEvent,
    ) -> Result<ReconcileOutcome, FanoutError> {
        fanout_dispatcher::apply_event(&self.db, event).await
    }

    /// Absorb one recipient reply. The sender's phone is normalized to the
    /// stored E.164 form; replies from phones no job ever messaged (or
    /// unparseable ones) are dropped silently, like unknown provider ids.
    /// Returns the number of recipient rows the reply attached to.
    pub async fn receive_reply(
        &self,
        from: &str,
        text: &str,
        timestamp: Option<i64>,
    ) -> Result<usize, FanoutError> {
        // Meta reports senders as bare digits.
        let raw = if from.starts_with('+') {
            from.to_string()
        } else {
            format!("+{from}")
        };
        let Ok(phone) = fanout_parser::phone::normalize(&raw) else {
            debug!(from, "dropping reply from unparseable phone");
            return Ok(0);
        };
        let reply_at = rfc3339_from_unix(timestamp);
        let updated = queries::recipients::record_reply(&self.db, &phone, text, &reply_at).await?;
        if updated > 0 {
            info!(phone = %phone, updated, "reply recorded");
        }
        Ok(updated)
    }

    async fn require_job(&self, job_id: &str) -> Result<MessageJob, FanoutError> {
        queries::jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| FanoutError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }
}

fn fields_to_json(fields: &[(String, String)]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let map: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    Some(serde_json::Value::Object(map).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::types::{EventKind, ProviderMessageId};
    use fanout_test_utils::fixtures::{make_credential, setup_db};

    async fn engine() -> (Engine, tempfile::TempDir) {
        let (db, dir) = setup_db().await;
        queries::credentials::upsert_credential(&db, &make_credential("biz-1"), true)
            .await
            .unwrap();
        (Engine::with_database(db, FanoutConfig::default()), dir)
    }

    fn csv_submission(csv: &str) -> JobSubmission {
        JobSubmission {
            user_id: "user-1".into(),
            business_id: "biz-1".into(),
            task_id: None,
            title: "Spring promo".into(),
            body: "Hello {{name}}!".into(),
            media_url: None,
            file_bytes: csv.as_bytes().to_vec(),
            format: FileFormat::Csv,
        }
    }

    #[tokio::test]
    async fn submission_creates_job_with_pending_recipients() {
        let (engine, _dir) = engine().await;
        let receipt = engine
            .submit_job(csv_submission(
                "phone,name\n+15550001,Ada\n+15550002,Bob\n+15550003,Eve\n",
            ))
            .await
            .unwrap();
        assert_eq!(receipt.total_recipients, 3);
        assert!(receipt.skipped.is_empty());

        let report = engine.get_job_status(&receipt.job_id).await.unwrap();
        assert_eq!(report.job.status, JobStatus::Queued);
        assert_eq!(report.job.total_recipients, 3);
        assert_eq!(report.stats.pending, 3);
        assert_eq!(report.stats.total(), 3);

        let recipients = engine
            .list_recipients(&receipt.job_id, None, 10, 0)
            .await
            .unwrap();
        assert_eq!(recipients.len(), 3);
        assert!(recipients.iter().all(|r| r.state == DeliveryState::Pending));
        assert_eq!(
            recipients[0].fields_json.as_deref(),
            Some(r#"{"name":"Ada"}"#)
        );
    }

    #[tokio::test]
    async fn duplicates_and_bad_rows_are_skipped_not_fatal() {
        let (engine, _dir) = engine().await;
        let receipt = engine
            .submit_job(csv_submission(
                "phone,name\n+15550001,Ada\n+15550001,Ada again\nnot-a-phone,Bob\n",
            ))
            .await
            .unwrap();
        assert_eq!(receipt.total_recipients, 1);
        assert_eq!(receipt.skipped.len(), 2);
    }

    #[tokio::test]
    async fn resubmitting_the_same_file_creates_a_disjoint_job() {
        let (engine, _dir) = engine().await;
        let csv = "phone,name\n+15550001,Ada\n+15550002,Bob\n";
        let first = engine.submit_job(csv_submission(csv)).await.unwrap();
        let second = engine.submit_job(csv_submission(csv)).await.unwrap();
        assert_ne!(first.job_id, second.job_id);
        assert_eq!(second.total_recipients, 2);

        let first_ids: Vec<String> = engine
            .list_recipients(&first.job_id, None, 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let second_rows = engine
            .list_recipients(&second.job_id, None, 10, 0)
            .await
            .unwrap();
        assert!(second_rows.iter().all(|r| !first_ids.contains(&r.id)));
    }

    #[tokio::test]
    async fn replies_are_recorded_and_counted() {
        let (engine, _dir) = engine().await;
        let receipt = engine
            .submit_job(csv_submission("phone,name\n+15550001,Ada\n"))
            .await
            .unwrap();

        // Meta reports senders as bare digits.
        let updated = engine
            .receive_reply("15550001", "count me in", Some(1_714_000_200))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let report = engine.get_job_status(&receipt.job_id).await.unwrap();
        assert_eq!(report.stats.replied, 1);

        let rows = engine
            .list_recipients(&receipt.job_id, None, 10, 0)
            .await
            .unwrap();
        assert_eq!(rows[0].reply_text.as_deref(), Some("count me in"));
        assert!(rows[0].reply_at.is_some());

        // A stranger's reply attaches to nothing.
        let updated = engine.receive_reply("19998887777", "hi", None).await.unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn empty_recipient_set_persists_nothing() {
        let (engine, _dir) = engine().await;
        let err = engine
            .submit_job(csv_submission("phone,name\nnot-a-phone,Ada\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, FanoutError::EmptyRecipientSet));

        let active = queries::jobs::list_active_jobs(engine.database(), None)
            .await
            .unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn unknown_business_rejected_before_parsing() {
        let (engine, _dir) = engine().await;
        let mut submission = csv_submission("phone\n+15550001\n");
        submission.business_id = "biz-unknown".into();
        let err = engine.submit_job(submission).await.unwrap_err();
        assert!(matches!(err, FanoutError::CredentialNotFound { .. }));
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_not_found() {
        let (engine, _dir) = engine().await;
        let err = engine.get_job_status("no-such-job").await.unwrap_err();
        assert!(matches!(err, FanoutError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_marks_job_and_is_idempotent_about_result() {
        let (engine, _dir) = engine().await;
        let receipt = engine
            .submit_job(csv_submission("phone\n+15550001\n"))
            .await
            .unwrap();

        assert!(engine.cancel_job(&receipt.job_id).await.unwrap());
        // Already cancelled: the CAS finds no active row to move.
        assert!(!engine.cancel_job(&receipt.job_id).await.unwrap());

        let report = engine.get_job_status(&receipt.job_id).await.unwrap();
        assert_eq!(report.job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn delivery_events_flow_through_to_stats() {
        let (engine, _dir) = engine().await;
        let receipt = engine
            .submit_job(csv_submission("phone\n+15550001\n"))
            .await
            .unwrap();
        let claimed =
            queries::recipients::claim_pending_batch(engine.database(), &receipt.job_id, 1, 300)
                .await
                .unwrap();
        queries::recipients::mark_sent(engine.database(), &claimed[0].id, "wamid.A")
            .await
            .unwrap();

        let outcome = engine
            .receive_delivery_event(&DeliveryEvent {
                provider_message_id: ProviderMessageId("wamid.A".into()),
                kind: EventKind::Delivered,
                timestamp: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(DeliveryState::Delivered));

        let report = engine.get_job_status(&receipt.job_id).await.unwrap();
        assert_eq!(report.stats.delivered, 1);
        assert_eq!(report.job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_provider_id_never_errors() {
        let (engine, _dir) = engine().await;
        let outcome = engine
            .receive_delivery_event(&DeliveryEvent {
                provider_message_id: ProviderMessageId("wamid.NOPE".into()),
                kind: EventKind::Seen,
                timestamp: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownMessage);
    }
}
