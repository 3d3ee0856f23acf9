// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the Wawa core and its external collaborators.

pub mod transport;

pub use transport::{CloseReason, Transport, TransportEvent, TransportSession};
