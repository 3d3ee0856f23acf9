// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device lifecycle events.
//!
//! Each device slot carries a broadcast channel of these events. Consumers
//! subscribe through [`crate::ConnectionRegistry::subscribe`]; per-device
//! emission order matches the transport's event order.

/// A lifecycle event for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A new QR payload for the pairing screen. Supersedes earlier ones.
    QrUpdated(String),
    /// A numeric pairing code was issued for the device's phone number.
    PairingCode(String),
    /// The session opened and is ready to send.
    Connected { phone: String },
    /// The session closed; `reason` is human-readable.
    Disconnected { reason: String },
}
