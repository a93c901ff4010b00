// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fanout — bulk message dispatch and delivery-tracking engine.
//!
//! The [`Engine`] facade is the programmatic surface: submit a job from an
//! uploaded recipient file, poll its status and per-recipient states,
//! cancel it, and feed provider delivery events back in. The [`http`]
//! module exposes the same operations over axum, and [`serve`] wires the
//! engine, the dispatch scheduler, and the HTTP server into one process.

pub mod engine;
pub mod http;
pub mod serve;

pub use engine::{Engine, JobStatusReport, JobSubmission, SubmissionReceipt};
