// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database and record fixtures shared by dispatcher and engine tests.

use fanout_core::types::{now_rfc3339, ChannelCredential, JobStatus, MessageJob};
use fanout_storage::models::NewRecipient;
use fanout_storage::{queries, Database};

/// A fresh migrated SQLite database in a temp directory. Keep the returned
/// `TempDir` alive for the duration of the test.
pub async fn setup_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

pub fn make_job(id: &str, total: i64) -> MessageJob {
    let now = now_rfc3339();
    MessageJob {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        business_id: "biz-1".to_string(),
        task_id: None,
        title: "Spring promo".to_string(),
        body: "Hello {{name}}!".to_string(),
        media_url: None,
        total_recipients: total,
        status: JobStatus::Queued,
        error: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

pub fn make_recipients(job_id: &str, phones: &[&str]) -> Vec<NewRecipient> {
    phones
        .iter()
        .enumerate()
        .map(|(i, phone)| NewRecipient {
            id: format!("{job_id}-r{i}"),
            phone: phone.to_string(),
            fields_json: None,
        })
        .collect()
}

pub fn make_credential(business_id: &str) -> ChannelCredential {
    ChannelCredential {
        business_id: business_id.to_string(),
        token: format!("token-{business_id}"),
        phone_id: format!("phone-{business_id}"),
        waba_id: format!("waba-{business_id}"),
        max_concurrency: 2,
        min_send_interval_ms: 0,
    }
}

/// Persist a queued job with one pending recipient per phone, plus an active
/// credential for its business. Returns the created job.
pub async fn seed_job(db: &Database, job_id: &str, phones: &[&str]) -> MessageJob {
    let job = make_job(job_id, phones.len() as i64);
    let recipients = make_recipients(job_id, phones);
    queries::credentials::upsert_credential(db, &make_credential(&job.business_id), true)
        .await
        .unwrap();
    queries::jobs::create_job_with_recipients(db, &job, &recipients)
        .await
        .unwrap();
    job
}
