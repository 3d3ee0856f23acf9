// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `wawa-core::types` for use across
//! adapter trait boundaries. This module re-exports them for convenience
//! within the storage crate.

pub use wawa_core::types::{
    BlastJob, BlastRecipient, Device, DeviceId, DeviceStatus, JobStatus, QueueEntry,
    RecipientStatus,
};
