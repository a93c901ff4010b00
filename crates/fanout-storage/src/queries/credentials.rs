// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business credential lookup.
//!
//! The engine treats business administration as an external collaborator;
//! this table is the minimal projection the dispatcher needs to resolve a
//! business id into an active channel credential.

use fanout_core::types::{now_rfc3339, ChannelCredential};
use fanout_core::FanoutError;
use rusqlite::params;

use crate::database::Database;

/// Resolve a business id into its active credential.
///
/// Fails with [`FanoutError::CredentialNotFound`] when the business is
/// unknown or its credential is deactivated.
pub async fn get_active_credential(
    db: &Database,
    business_id: &str,
) -> Result<ChannelCredential, FanoutError> {
    let id = business_id.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT business_id, token, phone_id, waba_id, max_concurrency,
                        min_send_interval_ms
                 FROM credentials WHERE business_id = ?1 AND active = 1",
                params![id],
                |row| {
                    Ok(ChannelCredential {
                        business_id: row.get(0)?,
                        token: row.get(1)?,
                        phone_id: row.get(2)?,
                        waba_id: row.get(3)?,
                        max_concurrency: row.get(4)?,
                        min_send_interval_ms: row.get(5)?,
                    })
                },
            );
            match result {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    found.ok_or_else(|| FanoutError::CredentialNotFound {
        business_id: business_id.to_string(),
    })
}

/// Insert or replace a credential. Used by the host application's admin
/// surface and by tests.
pub async fn upsert_credential(
    db: &Database,
    credential: &ChannelCredential,
    active: bool,
) -> Result<(), FanoutError> {
    let c = credential.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials (business_id, token, phone_id, waba_id, active,
                                          max_concurrency, min_send_interval_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(business_id) DO UPDATE SET
                     token = excluded.token,
                     phone_id = excluded.phone_id,
                     waba_id = excluded.waba_id,
                     active = excluded.active,
                     max_concurrency = excluded.max_concurrency,
                     min_send_interval_ms = excluded.min_send_interval_ms",
                params![
                    c.business_id,
                    c.token,
                    c.phone_id,
                    c.waba_id,
                    active as i64,
                    c.max_concurrency,
                    c.min_send_interval_ms,
                    now_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
