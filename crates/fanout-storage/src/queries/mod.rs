// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each accepts `&Database` and runs on the single
//! writer thread via `connection().call()`.

pub mod credentials;
pub mod jobs;
pub mod recipients;
pub mod stats;
