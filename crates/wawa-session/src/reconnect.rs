// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervised reconnection after transient closes.
//!
//! Backoff is bounded exponential: `base × 2^(attempt-1)` up to the
//! configured attempt cap. Every timer carries the generation it was
//! scheduled under plus the slot's cancellation token; if either says the
//! world moved on, the timer is inert. The attempt counter resets once a
//! session reaches CONNECTED.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wawa_core::types::DeviceId;

use crate::registry::Inner;

pub(crate) fn schedule_reconnect(
    inner: Arc<Inner>,
    device_id: DeviceId,
    generation: u64,
    attempt: u32,
    cancel: CancellationToken,
) {
    let base = inner.config.reconnect_base_delay_ms;
    let shift = attempt.saturating_sub(1).min(16);
    let delay = Duration::from_millis(base.saturating_mul(1 << shift));
    debug!(
        device_id = %device_id,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "reconnect scheduled"
    );

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(device_id = %device_id, "reconnect timer cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let options = {
            let slots = inner.slots.lock().await;
            match slots.get(&device_id) {
                Some(slot) if slot.generation == generation => slot.options.clone(),
                _ => {
                    debug!(device_id = %device_id, "stale reconnect timer ignored");
                    return;
                }
            }
        };

        info!(device_id = %device_id, attempt, "attempting reconnect");
        match Inner::connect(inner, device_id.clone(), options, Some(generation)).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(device_id = %device_id, "reconnect superseded"),
            Err(e) => warn!(device_id = %device_id, error = %e, "reconnect attempt failed"),
        }
    });
}
