// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical record types live in `fanout-core::types` for use across
//! crate boundaries; this module re-exports them and adds the
//! storage-specific insert payloads.

pub use fanout_core::types::{ChannelCredential, MessageJob, RecipientDelivery};

/// Insert payload for one recipient row at job creation.
///
/// State, attempt count, and position are assigned by the job store.
#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub id: String,
    /// Canonical E.164 phone number.
    pub phone: String,
    /// Personalization fields as a JSON object string, if any.
    pub fields_json: Option<String>,
}
