// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport seam over the wire-level messaging protocol.
//!
//! The protocol implementation is opaque to this workspace: it exposes
//! connect, an ordered per-session event stream, send, and logout. The
//! connection registry consumes events strictly in emission order and feeds
//! every credential rotation back into persistent storage so a session can
//! be restored after a process restart.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::WawaError;
use crate::types::{DeviceId, MessageId};

/// Why a transport session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The provider invalidated the session (explicit logout). Terminal:
    /// the registry must not reconnect.
    LoggedOut,
    /// Any other close. The registry treats this as a transient drop and
    /// schedules a supervised reconnect.
    Transient(String),
}

/// Events emitted by a transport session, delivered strictly in the order
/// the transport produced them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A rotating QR payload for the pairing screen. Each emission
    /// supersedes the previous one.
    Qr(String),
    /// The session opened; `phone` is the number bound to the session
    /// identity.
    Open { phone: String },
    /// The session closed.
    Closed { reason: CloseReason },
    /// The session rotated its credentials. Must be persisted.
    CredentialsRotated(Vec<u8>),
}

/// Factory for transport sessions, one per device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Initiates a provider session for `device_id`, restoring from the
    /// given credential blob when present.
    ///
    /// Returns the session handle together with its event stream. The
    /// stream is handed over exactly once; the caller owns draining it.
    async fn connect(
        &self,
        device_id: &DeviceId,
        credentials: Option<Vec<u8>>,
    ) -> Result<
        (
            Arc<dyn TransportSession>,
            mpsc::Receiver<TransportEvent>,
        ),
        WawaError,
    >;
}

/// A live provider session.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Requests a numeric pairing code bound to `phone`. Only meaningful
    /// while the session is still pairing.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, WawaError>;

    /// Sends a text message to the normalized recipient address and returns
    /// the provider message id.
    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, WawaError>;

    /// Gracefully invalidates the session with the provider.
    async fn logout(&self) -> Result<(), WawaError>;
}
