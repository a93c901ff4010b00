// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API integration: the outbound channel client and the
//! inbound webhook codec.

pub mod client;
pub mod webhook;

pub use client::WhatsAppClient;
pub use webhook::{verify_signature, verify_subscription, WebhookPayload};
