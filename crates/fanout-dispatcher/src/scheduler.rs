// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch scheduler: polls active jobs, claims batches, and fans them
//! out over a bounded worker pool per business credential.
//!
//! Each pass groups active jobs by business and dispatches the groups
//! concurrently, so one credential's pacing or backoff never stalls
//! another's. Within a group jobs are visited round-robin, one claimed
//! batch per job per pass, so a large job cannot starve later submissions
//! for the same credential. The pool width is the smaller of the
//! credential's `max_concurrency` and the configured ceiling.

use std::sync::Arc;
use std::time::Duration;

use fanout_config::model::DispatcherConfig;
use fanout_core::types::{ChannelCredential, MessageJob};
use fanout_core::{ChannelClient, FanoutError};
use fanout_storage::{queries, Database};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::RetryPolicy;
use crate::worker;

/// Builds a channel client for one business credential.
///
/// The scheduler resolves credentials from storage per job; this seam lets
/// the host application supply the real provider client and tests supply a
/// mock.
pub trait ClientFactory: Send + Sync {
    fn client_for(
        &self,
        credential: &ChannelCredential,
    ) -> Result<Arc<dyn ChannelClient>, FanoutError>;
}

/// The dispatch loop over all active jobs.
pub struct Scheduler {
    db: Database,
    config: DispatcherConfig,
    factory: Arc<dyn ClientFactory>,
}

impl Scheduler {
    pub fn new(db: Database, config: DispatcherConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            db,
            config,
            factory,
        }
    }

    /// Run until `cancel` fires. Cancellation is observed between passes,
    /// so the pass in progress drains its claimed batches before the loop
    /// exits.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), FanoutError> {
        info!(
            batch_size = self.config.batch_size,
            max_concurrency = self.config.max_concurrency,
            "dispatcher started"
        );
        let idle = Duration::from_millis(self.config.idle_poll_ms.max(1));
        loop {
            if cancel.is_cancelled() {
                info!("dispatcher stopping");
                return Ok(());
            }
            let dispatched = match self.run_once().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "scheduling pass failed");
                    0
                }
            };
            if dispatched == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("dispatcher stopping");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(idle) => {}
                }
            }
        }
    }

    /// One scheduling pass: claim and dispatch at most one batch per active
    /// job, with each business's jobs dispatched concurrently with every
    /// other business's. Returns the number of recipients dispatched.
    pub async fn run_once(&self) -> Result<usize, FanoutError> {
        let jobs = queries::jobs::list_active_jobs(&self.db, None).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        // Group by business, preserving the round-robin job order within
        // each group.
        let mut groups: Vec<(String, Vec<MessageJob>)> = Vec::new();
        for job in jobs {
            match groups.iter_mut().find(|(biz, _)| *biz == job.business_id) {
                Some((_, group)) => group.push(job),
                None => groups.push((job.business_id.clone(), vec![job])),
            }
        }

        let passes = groups
            .into_iter()
            .map(|(business_id, group)| self.dispatch_business(business_id, group));
        let mut dispatched = 0;
        for result in futures::future::join_all(passes).await {
            dispatched += result?;
        }
        Ok(dispatched)
    }

    /// Dispatch one batch for each of a business's active jobs, in order.
    /// A missing credential is a job-level setup failure, not a scheduler
    /// error.
    async fn dispatch_business(
        &self,
        business_id: String,
        jobs: Vec<MessageJob>,
    ) -> Result<usize, FanoutError> {
        let credential =
            match queries::credentials::get_active_credential(&self.db, &business_id).await {
                Ok(c) => c,
                Err(FanoutError::CredentialNotFound { .. }) => {
                    for job in &jobs {
                        warn!(job_id = %job.id, %business_id, "no active credential, failing job");
                        queries::jobs::mark_failed(
                            &self.db,
                            &job.id,
                            "no active credential for business",
                        )
                        .await?;
                    }
                    return Ok(0);
                }
                Err(e) => return Err(e),
            };

        let mut dispatched = 0;
        for job in &jobs {
            dispatched += self.dispatch_batch(job, &credential).await?;
        }
        Ok(dispatched)
    }

    /// Claim one batch for `job` and dispatch it over the worker pool.
    async fn dispatch_batch(
        &self,
        job: &MessageJob,
        credential: &ChannelCredential,
    ) -> Result<usize, FanoutError> {
        let batch =
            queries::recipients::claim_pending_batch(
                &self.db,
                &job.id,
                self.config.batch_size,
                self.config.requeue_after_secs,
            )
            .await?;
        if batch.is_empty() {
            // Nothing left to claim; fold any finished deliveries into the
            // cached status.
            queries::jobs::refresh_status(&self.db, &job.id).await?;
            return Ok(0);
        }
        queries::jobs::refresh_status(&self.db, &job.id).await?;

        let client = self.factory.client_for(credential)?;
        let retry = RetryPolicy::from(&self.config);
        let pool = (credential.max_concurrency.max(1) as usize).min(self.config.max_concurrency);
        let pause = Duration::from_millis(
            (credential.min_send_interval_ms.max(0) as u64).max(self.config.min_send_interval_ms),
        );

        let claimed = batch.len();
        debug!(job_id = %job.id, claimed, pool, "dispatching batch");

        let db = &self.db;
        futures::stream::iter(batch)
            .for_each_concurrent(pool, |recipient| {
                let client = Arc::clone(&client);
                async move {
                    let result =
                        worker::dispatch_recipient(db, client.as_ref(), job, &recipient, &retry)
                            .await;
                    if let Err(e) = result {
                        error!(recipient_id = %recipient.id, error = %e, "dispatch failed");
                    }
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
            })
            .await;

        let status = queries::jobs::refresh_status(&self.db, &job.id).await?;
        debug!(job_id = %job.id, status = %status, "batch dispatched");
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::types::{DeliveryState, JobStatus};
    use fanout_core::SendError;
    use fanout_test_utils::fixtures::{make_credential, seed_job, setup_db};
    use fanout_test_utils::MockChannelClient;

    struct MockFactory {
        client: Arc<MockChannelClient>,
    }

    impl ClientFactory for MockFactory {
        fn client_for(
            &self,
            _credential: &ChannelCredential,
        ) -> Result<Arc<dyn ChannelClient>, FanoutError> {
            Ok(self.client.clone() as Arc<dyn ChannelClient>)
        }
    }

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            max_concurrency: 2,
            batch_size: 10,
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_cap_ms: 2,
            min_send_interval_ms: 0,
            idle_poll_ms: 1,
            ..DispatcherConfig::default()
        }
    }

    async fn scheduler_with_mock(db: &Database) -> (Scheduler, Arc<MockChannelClient>) {
        let client = Arc::new(MockChannelClient::new());
        let scheduler = Scheduler::new(
            db.clone(),
            test_config(),
            Arc::new(MockFactory {
                client: client.clone(),
            }),
        );
        (scheduler, client)
    }

    #[tokio::test]
    async fn drains_a_job_to_all_sent() {
        let (db, _dir) = setup_db().await;
        let job = seed_job(&db, "job-1", &["+15550001", "+15550002", "+15550003"]).await;
        let (scheduler, client) = scheduler_with_mock(&db).await;

        let dispatched = scheduler.run_once().await.unwrap();
        assert!(dispatched > 0);
        assert_eq!(client.sent_count().await, 3);

        let rows = queries::recipients::list_for_job(&db, &job.id, None, 10, 0)
            .await
            .unwrap();
        assert!(rows.iter().all(|r| r.state == DeliveryState::Sent));

        // All recipients sent but none terminal yet: job stays running
        // until delivery events arrive.
        let fetched = queries::jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn mixed_outcomes_leave_job_running_with_failures_recorded() {
        let (db, _dir) = setup_db().await;
        let job = seed_job(&db, "job-1", &["+15550001", "+15550002"]).await;
        let (scheduler, client) = scheduler_with_mock(&db).await;
        client
            .fail_once("+15550002", SendError::InvalidRecipient("bad".into()))
            .await;

        scheduler.run_once().await.unwrap();

        let rows = queries::recipients::list_for_job(&db, &job.id, None, 10, 0)
            .await
            .unwrap();
        let failed: Vec<_> = rows
            .iter()
            .filter(|r| r.state == DeliveryState::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].phone, "+15550002");
    }

    #[tokio::test]
    async fn missing_credential_fails_job_without_dispatching() {
        let (db, _dir) = setup_db().await;
        // Seed the job by hand with no credential row.
        let job = fanout_test_utils::fixtures::make_job("job-1", 1);
        let recipients = fanout_test_utils::fixtures::make_recipients("job-1", &["+15550001"]);
        queries::jobs::create_job_with_recipients(&db, &job, &recipients)
            .await
            .unwrap();
        let (scheduler, client) = scheduler_with_mock(&db).await;

        let dispatched = scheduler.run_once().await.unwrap();
        assert_eq!(dispatched, 0);
        assert_eq!(client.sent_count().await, 0);

        let fetched = queries::jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert!(fetched.error.is_some());
    }

    #[tokio::test]
    async fn cancelled_job_is_not_scheduled() {
        let (db, _dir) = setup_db().await;
        let job = seed_job(&db, "job-1", &["+15550001"]).await;
        assert!(queries::jobs::cancel(&db, &job.id).await.unwrap());
        let (scheduler, client) = scheduler_with_mock(&db).await;

        let dispatched = scheduler.run_once().await.unwrap();
        assert_eq!(dispatched, 0);
        assert_eq!(client.sent_count().await, 0);
    }

    #[tokio::test]
    async fn round_robin_touches_every_active_job() {
        let (db, _dir) = setup_db().await;
        seed_job(&db, "job-1", &["+15550001"]).await;
        // Second job shares the business; seed_job upserts the same credential.
        let job2 = fanout_test_utils::fixtures::make_job("job-2", 1);
        let recipients = fanout_test_utils::fixtures::make_recipients("job-2", &["+15550009"]);
        queries::jobs::create_job_with_recipients(&db, &job2, &recipients)
            .await
            .unwrap();
        queries::credentials::upsert_credential(&db, &make_credential("biz-1"), true)
            .await
            .unwrap();
        let (scheduler, client) = scheduler_with_mock(&db).await;

        scheduler.run_once().await.unwrap();

        let sent = client.sent_messages().await;
        let phones: Vec<&str> = sent.iter().map(|(to, _)| to.as_str()).collect();
        assert!(phones.contains(&"+15550001"));
        assert!(phones.contains(&"+15550009"));
    }

    #[tokio::test]
    async fn orphaned_claims_are_dispatched_on_a_later_pass() {
        let (db, _dir) = setup_db().await;
        let job = seed_job(&db, "job-1", &["+15550001"]).await;

        // Claim and abandon, as if a previous process died between claim
        // and send.
        let claimed = queries::recipients::claim_pending_batch(&db, &job.id, 1, 300)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        let client = Arc::new(MockChannelClient::new());
        let mut config = test_config();
        config.requeue_after_secs = 0;
        let scheduler = Scheduler::new(
            db.clone(),
            config,
            Arc::new(MockFactory {
                client: client.clone(),
            }),
        );

        let dispatched = scheduler.run_once().await.unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(client.sent_count().await, 1);

        let rows = queries::recipients::list_for_job(&db, &job.id, None, 10, 0)
            .await
            .unwrap();
        assert_eq!(rows[0].state, DeliveryState::Sent);
    }

    #[tokio::test]
    async fn slow_business_does_not_stall_other_credentials() {
        let (db, _dir) = setup_db().await;

        // biz-slow serializes its batch: one worker, 200ms pacing per send.
        let mut slow = make_credential("biz-slow");
        slow.max_concurrency = 1;
        slow.min_send_interval_ms = 200;
        queries::credentials::upsert_credential(&db, &slow, true)
            .await
            .unwrap();
        queries::credentials::upsert_credential(&db, &make_credential("biz-fast"), true)
            .await
            .unwrap();

        // The slow job sorts first so a serialized pass would drain it
        // before touching biz-fast.
        let mut job_slow = fanout_test_utils::fixtures::make_job("job-slow", 4);
        job_slow.business_id = "biz-slow".to_string();
        job_slow.created_at = "2026-01-01T00:00:00+00:00".to_string();
        let slow_recipients = fanout_test_utils::fixtures::make_recipients(
            "job-slow",
            &["+15550001", "+15550002", "+15550003", "+15550004"],
        );
        queries::jobs::create_job_with_recipients(&db, &job_slow, &slow_recipients)
            .await
            .unwrap();

        let mut job_fast = fanout_test_utils::fixtures::make_job("job-fast", 1);
        job_fast.business_id = "biz-fast".to_string();
        let fast_recipients =
            fanout_test_utils::fixtures::make_recipients("job-fast", &["+15559999"]);
        queries::jobs::create_job_with_recipients(&db, &job_fast, &fast_recipients)
            .await
            .unwrap();

        let (scheduler, client) = scheduler_with_mock(&db).await;
        let pass = tokio::spawn(async move { scheduler.run_once().await.unwrap() });

        // Well before biz-slow's pacing drains its batch, biz-fast's lone
        // send must already have gone out.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let phones: Vec<String> = client
            .sent_messages()
            .await
            .iter()
            .map(|(to, _)| to.clone())
            .collect();
        assert!(
            phones.iter().any(|p| p == "+15559999"),
            "fast credential waited behind the slow batch: sent so far {phones:?}"
        );

        assert_eq!(pass.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let (db, _dir) = setup_db().await;
        let (scheduler, _client) = scheduler_with_mock(&db).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), scheduler.run(cancel))
            .await
            .expect("run did not stop")
            .unwrap();
    }
}
