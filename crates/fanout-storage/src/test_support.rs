// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for storage tests.

use fanout_core::types::{now_rfc3339, ChannelCredential, JobStatus, MessageJob};

use crate::database::Database;
use crate::models::NewRecipient;

pub(crate) async fn setup_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

pub(crate) fn make_job(id: &str, total: i64) -> MessageJob {
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

pub(crate) fn make_recipients(job_id: &str, phones: &[&str]) -> Vec<NewRecipient> {
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

pub(crate) fn make_credential(business_id: &str) -> ChannelCredential {
    ChannelCredential {
        business_id: business_id.to_string(),
        token: format!("token-{business_id}"),
        phone_id: format!("phone-{business_id}"),
        waba_id: format!("waba-{business_id}"),
        max_concurrency: 2,
        min_send_interval_ms: 0,
    }
}
