// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed pairing-code requests.
//!
//! The transport handshake needs a moment before it accepts a pairing-code
//! request, so the request runs on a timer after connect. A failed request
//! is logged and swallowed: pairing simply does not progress, and the QR
//! flow remains available.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wawa_core::traits::TransportSession;
use wawa_core::types::{DeviceId, DeviceStatus, normalize_phone};

use crate::events::DeviceEvent;
use crate::registry::Inner;

pub(crate) fn spawn_pairing_request(
    inner: Arc<Inner>,
    device_id: DeviceId,
    generation: u64,
    session: Arc<dyn TransportSession>,
    phone: String,
    cancel: CancellationToken,
) {
    let delay = Duration::from_millis(inner.config.pairing_code_delay_ms);
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(device_id = %device_id, "pairing request cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let phone_digits = normalize_phone(&phone);
        match session.request_pairing_code(&phone_digits).await {
            Ok(code) => {
                let mut slots = inner.slots.lock().await;
                if let Some(slot) = slots.get_mut(&device_id) {
                    // A superseded generation or an already-open session
                    // must not resurrect a pairing code.
                    if slot.generation == generation && slot.status == DeviceStatus::Pairing {
                        slot.pairing_code = Some(code.clone());
                        let _ = slot.events.send(DeviceEvent::PairingCode(code));
                        info!(device_id = %device_id, phone = %phone_digits, "pairing code issued");
                    }
                }
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "pairing code request failed");
            }
        }
    });
}
