// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job CRUD and the cached-status refresh.

use std::str::FromStr;

use fanout_core::types::JobStatus;
use fanout_core::FanoutError;
use rusqlite::params;
use tracing::debug;

use crate::database::Database;
use crate::models::{MessageJob, NewRecipient};

pub(crate) fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageJob> {
    let status_text: String = row.get(8)?;
    let status = JobStatus::from_str(&status_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MessageJob {
        id: row.get(0)?,
        user_id: row.get(1)?,
        business_id: row.get(2)?,
        task_id: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        media_url: row.get(6)?,
        total_recipients: row.get(7)?,
        status,
        error: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const JOB_COLUMNS: &str = "id, user_id, business_id, task_id, title, body, media_url,
     total_recipients, status, error, created_at, updated_at";

/// Atomically persist one job and one `pending` recipient row per accepted
/// recipient, in file order.
///
/// The job's `total_recipients` must already equal `recipients.len()`; the
/// count is fixed at creation and never changes.
pub async fn create_job_with_recipients(
    db: &Database,
    job: &MessageJob,
    recipients: &[NewRecipient],
) -> Result<(), FanoutError> {
    let job = job.clone();
    let recipients = recipients.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO jobs (id, user_id, business_id, task_id, title, body, media_url,
                                   total_recipients, status, error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    job.id,
                    job.user_id,
                    job.business_id,
                    job.task_id,
                    job.title,
                    job.body,
                    job.media_url,
                    job.total_recipients,
                    job.status.to_string(),
                    job.error,
                    job.created_at,
                    job.updated_at,
                ],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO recipients (id, job_id, phone, fields_json, state,
                                             attempt_count, position, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?6)",
                )?;
                for (position, r) in recipients.iter().enumerate() {
                    stmt.execute(params![
                        r.id,
                        job.id,
                        r.phone,
                        r.fields_json,
                        position as i64,
                        job.created_at,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch one job by id.
pub async fn get_job(db: &Database, job_id: &str) -> Result<Option<MessageJob>, FanoutError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                job_from_row,
            );
            match result {
                Ok(job) => Ok(Some(job)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List jobs still eligible for dispatch (`queued` or `running`) in
/// creation order, optionally scoped to one business.
pub async fn list_active_jobs(
    db: &Database,
    business_id: Option<&str>,
) -> Result<Vec<MessageJob>, FanoutError> {
    let business_id = business_id.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut jobs = Vec::new();
            match business_id {
                Some(biz) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {JOB_COLUMNS} FROM jobs
                         WHERE business_id = ?1 AND status IN ('queued', 'running')
                         ORDER BY created_at ASC"
                    ))?;
                    let rows = stmt.query_map(params![biz], job_from_row)?;
                    for row in rows {
                        jobs.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {JOB_COLUMNS} FROM jobs
                         WHERE status IN ('queued', 'running')
                         ORDER BY created_at ASC"
                    ))?;
                    let rows = stmt.query_map([], job_from_row)?;
                    for row in rows {
                        jobs.push(row?);
                    }
                }
            }
            Ok(jobs)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Recompute the cached job status from the current recipient states.
///
/// `failed` and `cancelled` are sticky job-level outcomes and are never
/// overwritten. Otherwise: `completed` when every recipient is terminal,
/// `running` once any dispatch has started, else `queued`. Returns the
/// refreshed status.
pub async fn refresh_status(db: &Database, job_id: &str) -> Result<JobStatus, FanoutError> {
    let job_id = job_id.to_string();
    let status = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current: String = tx.query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )?;
            let current = JobStatus::from_str(&current).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

            if matches!(current, JobStatus::Failed | JobStatus::Cancelled) {
                tx.commit()?;
                return Ok(current);
            }

            let (total, terminal, started): (i64, i64, i64) = tx.query_row(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE state IN ('delivered', 'seen', 'failed')),
                        COUNT(*) FILTER (WHERE state != 'pending')
                 FROM recipients WHERE job_id = ?1",
                params![job_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let next = if total > 0 && terminal == total {
                JobStatus::Completed
            } else if started > 0 {
                JobStatus::Running
            } else {
                JobStatus::Queued
            };

            if next != current {
                tx.execute(
                    "UPDATE jobs SET status = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![next.to_string(), job_id],
                )?;
            }
            tx.commit()?;
            Ok(next)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    Ok(status)
}

/// Mark a job as a job-level setup failure, recording the reason.
pub async fn mark_failed(db: &Database, job_id: &str, error: &str) -> Result<(), FanoutError> {
    let job_id = job_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'failed', error = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![error, job_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a job for cancellation. The dispatcher stops claiming new pending
/// recipients; in-flight sends complete normally. Returns false if the job
/// was already in a terminal status.
pub async fn cancel(db: &Database, job_id: &str) -> Result<bool, FanoutError> {
    let id = job_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE jobs SET status = 'cancelled',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status IN ('queued', 'running')",
                params![id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed > 0 {
        debug!(job_id, "job cancelled");
    }
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_job, make_recipients, setup_db};
    use fanout_core::types::DeliveryState;

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (db, _dir) = setup_db().await;
        let job = make_job("job-1", 2);
        let recipients = make_recipients("job-1", &["+15551230001", "+15551230002"]);
        create_job_with_recipients(&db, &job, &recipients)
            .await
            .unwrap();

        let fetched = get_job(&db, "job-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "job-1");
        assert_eq!(fetched.total_recipients, 2);
        assert_eq!(fetched.status, JobStatus::Queued);

        let rows = crate::queries::recipients::list_for_job(&db, "job-1", None, 100, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.state == DeliveryState::Pending));
        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[1].position, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_job_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_job(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn creation_is_atomic_on_duplicate_phone() {
        let (db, _dir) = setup_db().await;
        let job = make_job("job-1", 2);
        // Same phone twice violates the (job_id, phone) unique index; the
        // whole transaction must roll back, including the job row.
        let recipients = make_recipients("job-1", &["+15551230001", "+15551230001"]);
        let result = create_job_with_recipients(&db, &job, &recipients).await;
        assert!(result.is_err());
        assert!(get_job(&db, "job-1").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn refresh_status_walks_queued_running_completed() {
        let (db, _dir) = setup_db().await;
        let job = make_job("job-1", 2);
        let recipients = make_recipients("job-1", &["+15551230001", "+15551230002"]);
        create_job_with_recipients(&db, &job, &recipients)
            .await
            .unwrap();

        assert_eq!(refresh_status(&db, "job-1").await.unwrap(), JobStatus::Queued);

        let claimed = crate::queries::recipients::claim_pending_batch(&db, "job-1", 10, 300)
            .await
            .unwrap();
        assert_eq!(refresh_status(&db, "job-1").await.unwrap(), JobStatus::Running);

        for (i, r) in claimed.iter().enumerate() {
            crate::queries::recipients::mark_sent(&db, &r.id, &format!("wamid.{i}"))
                .await
                .unwrap();
        }
        // Sent is not terminal; the job is still running.
        assert_eq!(refresh_status(&db, "job-1").await.unwrap(), JobStatus::Running);

        for r in &claimed {
            crate::queries::recipients::update_state(
                &db,
                &r.id,
                DeliveryState::Sent,
                DeliveryState::Delivered,
                None,
            )
            .await
            .unwrap();
        }
        assert_eq!(
            refresh_status(&db, "job-1").await.unwrap(),
            JobStatus::Completed
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_and_cancelled_are_sticky() {
        let (db, _dir) = setup_db().await;
        let job = make_job("job-1", 1);
        let recipients = make_recipients("job-1", &["+15551230001"]);
        create_job_with_recipients(&db, &job, &recipients)
            .await
            .unwrap();

        assert!(cancel(&db, "job-1").await.unwrap());
        assert_eq!(
            refresh_status(&db, "job-1").await.unwrap(),
            JobStatus::Cancelled
        );
        // Cancelling again reports no change.
        assert!(!cancel(&db, "job-1").await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn active_jobs_scoped_by_business() {
        let (db, _dir) = setup_db().await;
        for (id, biz) in [("job-1", "biz-a"), ("job-2", "biz-b"), ("job-3", "biz-a")] {
            let mut job = make_job(id, 1);
            job.business_id = biz.to_string();
            let recipients = make_recipients(id, &["+15551230001"]);
            create_job_with_recipients(&db, &job, &recipients)
                .await
                .unwrap();
        }
        cancel(&db, "job-3").await.unwrap();

        let active = list_active_jobs(&db, Some("biz-a")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "job-1");

        let all = list_active_jobs(&db, None).await.unwrap();
        assert_eq!(all.len(), 2);

        db.close().await.unwrap();
    }
}
