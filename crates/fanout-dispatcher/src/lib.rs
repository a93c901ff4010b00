// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch and reconciliation for the fanout engine.
//!
//! The [`Scheduler`] polls active jobs and drives claimed recipient batches
//! through per-credential worker pools with retry and pacing; the
//! [`reconciler`] absorbs provider delivery events back into recipient
//! state. Both sides rely on compare-and-swap state transitions, so they
//! can run concurrently against the same database.

pub mod backoff;
pub mod reconciler;
pub mod scheduler;
pub mod template;
pub mod worker;

pub use backoff::RetryPolicy;
pub use reconciler::{apply_event, ReconcileOutcome};
pub use scheduler::{ClientFactory, Scheduler};
pub use worker::DispatchOutcome;
