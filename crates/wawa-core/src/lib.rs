// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wawa blast platform.
//!
//! This crate provides the foundational error type, common domain types, and
//! the transport trait seam used throughout the Wawa workspace. The wire
//! protocol itself lives behind [`traits::Transport`] and is opaque here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WawaError;
pub use traits::{CloseReason, Transport, TransportEvent, TransportSession};
pub use types::{
    DeviceId, DeviceStatus, JobStatus, MessageId, RecipientStatus, SendReport,
};
