// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blast dispatch pipeline for the Wawa platform.
//!
//! A blast fans one message out to many recipients through one device. The
//! [`BlastDispatcher`] turns a recipient list into staggered `send_queue`
//! tasks; the [`BlastWorker`] claims due tasks, gates them through the
//! shared rolling-window [`RateLimiter`], sends through the connection
//! registry, and records every outcome via the transactional accounting in
//! `wawa-storage`.

pub mod dispatcher;
pub mod rate_limit;
pub mod worker;

pub use dispatcher::{BlastDispatcher, SendTask};
pub use rate_limit::RateLimiter;
pub use worker::BlastWorker;
