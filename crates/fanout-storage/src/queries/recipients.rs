// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient delivery operations: batch claiming, CAS state transitions,
//! and reconciliation lookups.
//!
//! Every state change goes through a compare-and-swap on the current state
//! (`UPDATE ... WHERE state = expected`). A transition that affects zero
//! rows lost the race and surfaces as [`FanoutError::StaleState`]; callers
//! treat that as "already handled" and skip.

use std::str::FromStr;

use fanout_core::types::DeliveryState;
use fanout_core::FanoutError;
use rusqlite::params;

use crate::database::Database;
use crate::models::RecipientDelivery;

pub(crate) fn recipient_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecipientDelivery> {
    let state_text: String = row.get(4)?;
    let state = DeliveryState::from_str(&state_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(RecipientDelivery {
        id: row.get(0)?,
        job_id: row.get(1)?,
        phone: row.get(2)?,
        fields_json: row.get(3)?,
        state,
        provider_message_id: row.get(5)?,
        last_error: row.get(6)?,
        attempt_count: row.get(7)?,
        position: row.get(8)?,
        reply_text: row.get(9)?,
        reply_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

const RECIPIENT_COLUMNS: &str = "id, job_id, phone, fields_json, state, provider_message_id,
     last_error, attempt_count, position, reply_text, reply_at, created_at, updated_at";

/// Atomically claim up to `limit` recipients of one job for dispatch,
/// moving them `pending -> queued` in insertion order.
///
/// A claim is a lease: `queued` rows untouched for longer than
/// `requeue_after_secs` belonged to a dispatcher that died (or hit a
/// storage error) before recording an outcome, and are re-claimed along
/// with the pending ones. Returns the claimed rows (already in state
/// `queued`). The select and update run in one transaction on the single
/// writer thread, so two workers can never claim the same row.
pub async fn claim_pending_batch(
    db: &Database,
    job_id: &str,
    limit: usize,
    requeue_after_secs: u64,
) -> Result<Vec<RecipientDelivery>, FanoutError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let mut claimed = Vec::new();
            {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RECIPIENT_COLUMNS} FROM recipients
                     WHERE job_id = ?1
                       AND (state = 'pending'
                            OR (state = 'queued'
                                AND datetime(updated_at)
                                    <= datetime('now', '-' || ?3 || ' seconds')))
                     ORDER BY position ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(
                    params![job_id, limit as i64, requeue_after_secs as i64],
                    recipient_from_row,
                )?;
                for row in rows {
                    claimed.push(row?);
                }
            }

            {
                let mut update = tx.prepare(
                    "UPDATE recipients SET state = 'queued',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1 AND state IN ('pending', 'queued')",
                )?;
                for r in &mut claimed {
                    update.execute(params![r.id])?;
                    r.state = DeliveryState::Queued;
                }
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// CAS transition of one recipient from `expected` to `next`.
///
/// Rejects transitions the state machine forbids with an internal error;
/// loses to a concurrent writer with [`FanoutError::StaleState`].
pub async fn update_state(
    db: &Database,
    recipient_id: &str,
    expected: DeliveryState,
    next: DeliveryState,
    last_error: Option<&str>,
) -> Result<(), FanoutError> {
    if !expected.can_transition_to(next) {
        return Err(FanoutError::Internal(format!(
            "illegal transition {expected} -> {next} for recipient {recipient_id}"
        )));
    }

    let id = recipient_id.to_string();
    let error_text = last_error.map(|s| s.to_string());
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE recipients SET state = ?1,
                 last_error = COALESCE(?2, last_error),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3 AND state = ?4",
                params![next.to_string(), error_text, id, expected.to_string()],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if changed == 0 {
        return Err(FanoutError::StaleState {
            recipient_id: recipient_id.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Record a successful send: CAS `queued -> sent`, setting the immutable
/// provider message id and counting the attempt.
pub async fn mark_sent(
    db: &Database,
    recipient_id: &str,
    provider_message_id: &str,
) -> Result<(), FanoutError> {
    let id = recipient_id.to_string();
    let pmid = provider_message_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE recipients SET state = 'sent', provider_message_id = ?1,
                 attempt_count = attempt_count + 1, last_error = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND state = 'queued' AND provider_message_id IS NULL",
                params![pmid, id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if changed == 0 {
        return Err(FanoutError::StaleState {
            recipient_id: recipient_id.to_string(),
            expected: DeliveryState::Queued,
        });
    }
    Ok(())
}

/// Record a permanently failed send: CAS `queued -> failed` with the final
/// error, counting the attempt.
pub async fn mark_send_failed(
    db: &Database,
    recipient_id: &str,
    error: &str,
) -> Result<(), FanoutError> {
    let id = recipient_id.to_string();
    let error = error.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE recipients SET state = 'failed', last_error = ?1,
                 attempt_count = attempt_count + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND state = 'queued'",
                params![error, id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if changed == 0 {
        return Err(FanoutError::StaleState {
            recipient_id: recipient_id.to_string(),
            expected: DeliveryState::Queued,
        });
    }
    Ok(())
}

/// Count a failed attempt that will be retried: bumps `attempt_count` and
/// records the error without leaving `queued`.
pub async fn record_retry(
    db: &Database,
    recipient_id: &str,
    error: &str,
) -> Result<(), FanoutError> {
    let id = recipient_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE recipients SET attempt_count = attempt_count + 1, last_error = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND state = 'queued'",
                params![error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reconciliation lookup by the provider's message id.
pub async fn find_by_provider_message_id(
    db: &Database,
    provider_message_id: &str,
) -> Result<Option<RecipientDelivery>, FanoutError> {
    let pmid = provider_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {RECIPIENT_COLUMNS} FROM recipients
                     WHERE provider_message_id = ?1"
                ),
                params![pmid],
                recipient_from_row,
            );
            match result {
                Ok(r) => Ok(Some(r)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record an inbound reply on every recipient row matching the sender's
/// phone. Phones may recur across jobs; each job that reached the sender
/// gets the reply. Returns the number of rows updated (zero when the phone
/// was never messaged).
pub async fn record_reply(
    db: &Database,
    phone: &str,
    reply_text: &str,
    reply_at: &str,
) -> Result<usize, FanoutError> {
    let phone = phone.to_string();
    let reply_text = reply_text.to_string();
    let reply_at = reply_at.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE recipients SET reply_text = ?2, reply_at = ?3,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE phone = ?1",
                params![phone, reply_text, reply_at],
            )?;
            Ok(updated)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Paginated recipient listing for one job in insertion order, optionally
/// filtered by state.
pub async fn list_for_job(
    db: &Database,
    job_id: &str,
    state: Option<DeliveryState>,
    limit: usize,
    offset: usize,
) -> Result<Vec<RecipientDelivery>, FanoutError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut recipients = Vec::new();
            match state {
                Some(state) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECIPIENT_COLUMNS} FROM recipients
                         WHERE job_id = ?1 AND state = ?2
                         ORDER BY position ASC LIMIT ?3 OFFSET ?4"
                    ))?;
                    let rows = stmt.query_map(
                        params![job_id, state.to_string(), limit as i64, offset as i64],
                        recipient_from_row,
                    )?;
                    for row in rows {
                        recipients.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECIPIENT_COLUMNS} FROM recipients
                         WHERE job_id = ?1
                         ORDER BY position ASC LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt.query_map(
                        params![job_id, limit as i64, offset as i64],
                        recipient_from_row,
                    )?;
                    for row in rows {
                        recipients.push(row?);
                    }
                }
            }
            Ok(recipients)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
