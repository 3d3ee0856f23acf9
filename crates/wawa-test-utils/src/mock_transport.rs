// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockTransport` implements `Transport` with injectable session events and
//! captured outbound sends for assertion in tests. Each `connect` hands back
//! a fresh event channel; the test drives the session by emitting
//! `TransportEvent`s through [`MockTransport::emit`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use wawa_core::WawaError;
use wawa_core::traits::{Transport, TransportEvent, TransportSession};
use wawa_core::types::{DeviceId, MessageId};

/// A message captured by [`MockTransport`] through `send_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub device_id: String,
    pub address: String,
    pub text: String,
}

#[derive(Default)]
struct MockState {
    event_senders: HashMap<String, mpsc::Sender<TransportEvent>>,
    connect_counts: HashMap<String, u32>,
    connect_credentials: HashMap<String, Vec<Option<Vec<u8>>>>,
    sent: Vec<SentMessage>,
    fail_sends_remaining: u32,
    pairing_requests: Vec<(String, String)>,
    auto_open_phone: Option<String>,
}

/// A scripted transport for testing the connection registry and the blast
/// pipeline.
///
/// Behaviors:
/// - **Event injection**: `emit()` pushes a `TransportEvent` into the latest
///   session channel for a device.
/// - **Auto-open**: with `auto_open`, every `connect` immediately queues an
///   `Open` event so tests skip the pairing phase.
/// - **Scripted failures**: `fail_sends(n)` makes the next `n` `send_text`
///   calls fail before succeeding again.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a transport whose sessions stay in the pairing phase until the
    /// test emits events.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a transport that emits `Open { phone }` as soon as a session
    /// connects.
    pub fn auto_open(phone: &str) -> Self {
        let transport = Self::new();
        {
            let state = transport.state.clone();
            // Constructor runs outside async context in some tests, so set
            // the flag through a blocking-free try_lock: the mutex is
            // freshly created and uncontended.
            state
                .try_lock()
                .map(|mut s| s.auto_open_phone = Some(phone.to_string()))
                .ok();
        }
        transport
    }

    /// Push an event into the most recent session channel for `device_id`.
    ///
    /// Panics if the device never connected.
    pub async fn emit(&self, device_id: &DeviceId, event: TransportEvent) {
        let sender = {
            let state = self.state.lock().await;
            state
                .event_senders
                .get(&device_id.0)
                .cloned()
                .unwrap_or_else(|| panic!("no session for device {device_id}"))
        };
        sender.send(event).await.expect("event channel closed");
    }

    /// Script the next `n` `send_text` calls to fail.
    pub async fn fail_sends(&self, n: u32) {
        self.state.lock().await.fail_sends_remaining = n;
    }

    /// Number of times `connect` was called for a device.
    pub async fn connect_count(&self, device_id: &DeviceId) -> u32 {
        self.state
            .lock()
            .await
            .connect_counts
            .get(&device_id.0)
            .copied()
            .unwrap_or(0)
    }

    /// Credential blobs passed to each `connect`, in call order.
    pub async fn connect_credentials(&self, device_id: &DeviceId) -> Vec<Option<Vec<u8>>> {
        self.state
            .lock()
            .await
            .connect_credentials
            .get(&device_id.0)
            .cloned()
            .unwrap_or_default()
    }

    /// All messages captured through `send_text`, in send order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    /// Count of captured sends.
    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }

    /// Pairing-code requests as `(device_id, phone)` pairs.
    pub async fn pairing_requests(&self) -> Vec<(String, String)> {
        self.state.lock().await.pairing_requests.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        device_id: &DeviceId,
        credentials: Option<Vec<u8>>,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<TransportEvent>), WawaError> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.state.lock().await;
        *state.connect_counts.entry(device_id.0.clone()).or_insert(0) += 1;
        state
            .connect_credentials
            .entry(device_id.0.clone())
            .or_default()
            .push(credentials);
        if let Some(phone) = state.auto_open_phone.clone() {
            tx.try_send(TransportEvent::Open { phone })
                .expect("fresh event channel full");
        }
        state.event_senders.insert(device_id.0.clone(), tx);

        let session = MockSession {
            device_id: device_id.0.clone(),
            state: self.state.clone(),
        };
        Ok((Arc::new(session), rx))
    }
}

struct MockSession {
    device_id: String,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn request_pairing_code(&self, phone: &str) -> Result<String, WawaError> {
        let mut state = self.state.lock().await;
        state
            .pairing_requests
            .push((self.device_id.clone(), phone.to_string()));
        Ok("MOCK-1234".to_string())
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, WawaError> {
        let mut state = self.state.lock().await;
        if state.fail_sends_remaining > 0 {
            state.fail_sends_remaining -= 1;
            return Err(WawaError::transport("scripted send failure"));
        }
        state.sent.push(SentMessage {
            device_id: self.device_id.clone(),
            address: address.to_string(),
            text: text.to_string(),
        });
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }

    async fn logout(&self) -> Result<(), WawaError> {
        Ok(())
    }
}
