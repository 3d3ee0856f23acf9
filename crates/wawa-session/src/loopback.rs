// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback transport for local development.
//!
//! Sessions open immediately with a synthetic phone number and accept every
//! send, logging it instead of delivering anywhere. Useful for exercising
//! the registry and the blast pipeline without provider credentials.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use wawa_core::WawaError;
use wawa_core::traits::{Transport, TransportEvent, TransportSession};
use wawa_core::types::{DeviceId, MessageId};

/// A transport whose sessions connect instantly and deliver nowhere.
#[derive(Default)]
pub struct LoopbackTransport {
    sequence: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        device_id: &DeviceId,
        _credentials: Option<Vec<u8>>,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<TransportEvent>), WawaError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let phone = format!("62000{seq:07}");
        let (tx, rx) = mpsc::channel(16);
        tx.try_send(TransportEvent::Open {
            phone: phone.clone(),
        })
        .map_err(|_| WawaError::transport("loopback event channel full"))?;

        Ok((
            Arc::new(LoopbackSession {
                device_id: device_id.clone(),
            }),
            rx,
        ))
    }
}

struct LoopbackSession {
    device_id: DeviceId,
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn request_pairing_code(&self, _phone: &str) -> Result<String, WawaError> {
        let code: u32 = rand::random::<u32>() % 100_000_000;
        Ok(format!("{code:08}"))
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, WawaError> {
        info!(
            device_id = %self.device_id,
            address,
            chars = text.len(),
            "loopback send"
        );
        Ok(MessageId(format!("loopback-{}", uuid::Uuid::new_v4())))
    }

    async fn logout(&self) -> Result<(), WawaError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_open_immediately_with_unique_phones() {
        let transport = LoopbackTransport::new();
        let (_s1, mut rx1) = transport
            .connect(&DeviceId::from("dev-a"), None)
            .await
            .unwrap();
        let (_s2, mut rx2) = transport
            .connect(&DeviceId::from("dev-b"), None)
            .await
            .unwrap();

        let phone1 = match rx1.recv().await.unwrap() {
            TransportEvent::Open { phone } => phone,
            other => panic!("unexpected event {other:?}"),
        };
        let phone2 = match rx2.recv().await.unwrap() {
            TransportEvent::Open { phone } => phone,
            other => panic!("unexpected event {other:?}"),
        };
        assert_ne!(phone1, phone2);
    }

    #[tokio::test]
    async fn sends_yield_message_ids() {
        let transport = LoopbackTransport::new();
        let (session, _rx) = transport
            .connect(&DeviceId::from("dev-a"), None)
            .await
            .unwrap();
        let id = session.send_text("628111", "hello").await.unwrap();
        assert!(id.0.starts_with("loopback-"));
    }
}
