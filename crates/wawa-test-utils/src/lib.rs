// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Wawa integration tests.
//!
//! Provides a scripted transport and database seeding helpers for fast,
//! deterministic, CI-runnable tests without a real provider connection.
//!
//! # Components
//!
//! - [`MockTransport`] - Scripted transport with event injection and send capture
//! - [`harness`] - In-memory database seeding helpers

pub mod harness;
pub mod mock_transport;

pub use mock_transport::{MockTransport, SentMessage};
