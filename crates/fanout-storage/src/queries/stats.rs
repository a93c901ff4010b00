// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-demand aggregate stats, always recomputed from the authoritative
//! recipient set. No cached counters that can drift.

use fanout_core::types::JobStats;
use fanout_core::FanoutError;
use rusqlite::params;

use crate::database::Database;

/// Per-state recipient counts for one job, plus the replied count.
///
/// Both queries run back-to-back on the single writer connection, so the
/// counts are one consistent snapshot, never a mix of two points in time.
pub async fn job_stats(db: &Database, job_id: &str) -> Result<JobStats, FanoutError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stats = JobStats::default();
            let mut stmt = conn.prepare(
                "SELECT state, COUNT(*) FROM recipients
                 WHERE job_id = ?1 GROUP BY state",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (state, count) = row?;
                match state.as_str() {
                    "pending" => stats.pending = count,
                    "queued" => stats.queued = count,
                    "sent" => stats.sent = count,
                    "delivered" => stats.delivered = count,
                    "seen" => stats.seen = count,
                    "failed" => stats.failed = count,
                    // CHECK constraint makes this unreachable.
                    _ => {}
                }
            }
            stats.replied = conn.query_row(
                "SELECT COUNT(*) FROM recipients
                 WHERE job_id = ?1 AND reply_text IS NOT NULL",
                params![job_id],
                |row| row.get(0),
            )?;
            Ok(stats)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
