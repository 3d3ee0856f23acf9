// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The connection registry: one live handle per device, no globals.
//!
//! The registry is an explicitly constructed service. Handle creation and
//! registration happen under one async lock, so two concurrent `connect`
//! calls for the same device yield exactly one transport session. Each
//! connect bumps the slot's generation; background tasks (event pump,
//! pairing request, reconnect timer) carry the generation they were spawned
//! under and become inert once it is superseded.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wawa_config::model::SessionConfig;
use wawa_core::WawaError;
use wawa_core::traits::{CloseReason, Transport, TransportEvent, TransportSession};
use wawa_core::types::{DeviceId, DeviceStatus, MessageId, SendReport, normalize_phone};
use wawa_storage::Database;
use wawa_storage::queries::devices;

use crate::events::DeviceEvent;

/// How a connect should pair the device when no stored credentials exist.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Request a numeric pairing code instead of relying on QR scans.
    pub use_pairing_code: bool,
    /// Phone number the pairing code is bound to. Required for the
    /// pairing-code flow, ignored otherwise.
    pub phone_number: Option<String>,
}

/// A consistent point-in-time view of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub status: DeviceStatus,
    pub phone_number: Option<String>,
    /// Latest QR payload while pairing.
    pub qr: Option<String>,
    /// Latest pairing code while pairing.
    pub pairing_code: Option<String>,
}

pub(crate) struct Slot {
    pub(crate) status: DeviceStatus,
    pub(crate) session: Option<Arc<dyn TransportSession>>,
    pub(crate) events: broadcast::Sender<DeviceEvent>,
    pub(crate) qr: Option<String>,
    pub(crate) pairing_code: Option<String>,
    pub(crate) phone_number: Option<String>,
    pub(crate) generation: u64,
    /// Cancels the event pump, pairing request, and reconnect timer spawned
    /// for this generation.
    pub(crate) lifecycle: CancellationToken,
    pub(crate) reconnect_attempts: u32,
    /// Options to replay on supervised reconnect.
    pub(crate) options: ConnectOptions,
}

pub(crate) struct Inner {
    pub(crate) db: Database,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: SessionConfig,
    pub(crate) slots: Mutex<HashMap<DeviceId, Slot>>,
}

/// Registry of live device connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new(db: Database, transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                transport,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Initiate (or return) the transport session for a registered device.
    ///
    /// Idempotent: a PAIRING or CONNECTED handle is returned unchanged. The
    /// device row must exist; stored credentials are replayed into the
    /// transport so a previously paired device reconnects without a new QR.
    pub async fn connect(
        &self,
        device_id: &DeviceId,
        options: ConnectOptions,
    ) -> Result<DeviceSnapshot, WawaError> {
        match Inner::connect(self.inner.clone(), device_id.clone(), options, None).await? {
            Some(snapshot) => Ok(snapshot),
            // Only supervised reconnects pass an expected generation, so a
            // user-facing connect always produces a snapshot.
            None => Err(WawaError::Internal(format!(
                "connect for {device_id} resolved to a stale generation"
            ))),
        }
    }

    /// Tear down the device's session. Terminal: cancels any pending
    /// reconnect, best-effort logs out, and persists DISCONNECTED. With
    /// `delete_session` the stored credential blob is purged, forcing a
    /// fresh pairing next time.
    pub async fn disconnect(
        &self,
        device_id: &DeviceId,
        delete_session: bool,
    ) -> Result<(), WawaError> {
        let slot = {
            let mut slots = self.inner.slots.lock().await;
            slots.remove(device_id)
        };
        if let Some(slot) = slot {
            slot.lifecycle.cancel();
            let _ = slot.events.send(DeviceEvent::Disconnected {
                reason: "disconnected".to_string(),
            });
            if let Some(session) = slot.session {
                // Cleanup path: a failed logout must not block removal.
                if let Err(e) = session.logout().await {
                    debug!(device_id = %device_id, error = %e, "logout failed during disconnect");
                }
            }
        }
        devices::mark_disconnected(&self.inner.db, device_id).await?;
        if delete_session {
            devices::purge_credentials(&self.inner.db, device_id).await?;
        }
        info!(device_id = %device_id, delete_session, "device disconnected");
        Ok(())
    }

    /// Snapshot of one device: the live slot when present, otherwise the
    /// persisted row.
    pub async fn get_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceSnapshot>, WawaError> {
        {
            let slots = self.inner.slots.lock().await;
            if let Some(slot) = slots.get(device_id) {
                return Ok(Some(snapshot_of(device_id, slot)));
            }
        }
        let device = devices::find_device(&self.inner.db, device_id).await?;
        Ok(device.map(|d| DeviceSnapshot {
            id: d.id,
            status: d.status,
            phone_number: d.phone_number,
            qr: None,
            pairing_code: None,
        }))
    }

    /// Snapshots of all registered devices, live slots overriding rows.
    pub async fn all_devices(&self) -> Result<Vec<DeviceSnapshot>, WawaError> {
        let rows = devices::list_devices(&self.inner.db).await?;
        let slots = self.inner.slots.lock().await;
        Ok(rows
            .into_iter()
            .map(|d| match slots.get(&d.id) {
                Some(slot) => snapshot_of(&d.id, slot),
                None => DeviceSnapshot {
                    id: d.id,
                    status: d.status,
                    phone_number: d.phone_number,
                    qr: None,
                    pairing_code: None,
                },
            })
            .collect())
    }

    /// Send a text through a CONNECTED device.
    ///
    /// Fast-fails with [`WawaError::DeviceNotConnected`] before touching the
    /// transport when there is no live CONNECTED handle. The recipient phone
    /// is normalized to digits first.
    pub async fn send(
        &self,
        device_id: &DeviceId,
        phone: &str,
        text: &str,
    ) -> Result<MessageId, WawaError> {
        let session = {
            let slots = self.inner.slots.lock().await;
            let slot = slots.get(device_id).ok_or(WawaError::DeviceNotConnected {
                device_id: device_id.clone(),
            })?;
            if slot.status != DeviceStatus::Connected {
                return Err(WawaError::DeviceNotConnected {
                    device_id: device_id.clone(),
                });
            }
            slot.session.clone().ok_or(WawaError::DeviceNotConnected {
                device_id: device_id.clone(),
            })?
        };
        let address = normalize_phone(phone);
        session.send_text(&address, text).await
    }

    /// `send` with a structured outcome instead of an error, mirroring the
    /// `{success, message_id?, error?}` shape the blast pipeline consumes.
    pub async fn send_message(&self, device_id: &DeviceId, phone: &str, text: &str) -> SendReport {
        match self.send(device_id, phone, text).await {
            Ok(message_id) => SendReport::ok(message_id),
            Err(e) => {
                debug!(device_id = %device_id, error = %e, "send failed");
                SendReport::failed(e.to_string())
            }
        }
    }

    /// Subscribe to the device's lifecycle events. Requires a live slot.
    pub async fn subscribe(
        &self,
        device_id: &DeviceId,
    ) -> Result<broadcast::Receiver<DeviceEvent>, WawaError> {
        let slots = self.inner.slots.lock().await;
        let slot = slots.get(device_id).ok_or(WawaError::DeviceNotRegistered {
            device_id: device_id.clone(),
        })?;
        Ok(slot.events.subscribe())
    }

    /// Reconnect every device that has stored credentials. Called at
    /// startup; individual failures are logged and skipped.
    pub async fn restore_sessions(&self) -> Result<usize, WawaError> {
        let rows = devices::list_devices(&self.inner.db).await?;
        let mut restored = 0;
        for device in rows {
            if devices::load_credentials(&self.inner.db, &device.id)
                .await?
                .is_some()
            {
                match self.connect(&device.id, ConnectOptions::default()).await {
                    Ok(_) => restored += 1,
                    Err(e) => {
                        warn!(device_id = %device.id, error = %e, "failed to restore session")
                    }
                }
            }
        }
        if restored > 0 {
            info!(count = restored, "restored stored sessions");
        }
        Ok(restored)
    }
}

fn snapshot_of(device_id: &DeviceId, slot: &Slot) -> DeviceSnapshot {
    DeviceSnapshot {
        id: device_id.clone(),
        status: slot.status,
        phone_number: slot.phone_number.clone(),
        qr: slot.qr.clone(),
        pairing_code: slot.pairing_code.clone(),
    }
}

impl Inner {
    /// Core connect path, shared by user connects and supervised reconnects.
    ///
    /// `expected_generation` is set by reconnect timers: the connect only
    /// proceeds if the slot still sits at that generation in DISCONNECTED,
    /// otherwise `Ok(None)` marks the timer stale. The slots lock is held
    /// across the transport call so creation + registration is atomic.
    pub(crate) async fn connect(
        inner: Arc<Inner>,
        device_id: DeviceId,
        options: ConnectOptions,
        expected_generation: Option<u64>,
    ) -> Result<Option<DeviceSnapshot>, WawaError> {
        let mut slots = inner.slots.lock().await;

        if let Some(expected) = expected_generation {
            let stale = match slots.get(&device_id) {
                Some(slot) => {
                    slot.generation != expected || slot.status != DeviceStatus::Disconnected
                }
                None => true,
            };
            if stale {
                debug!(device_id = %device_id, expected, "stale reconnect ignored");
                return Ok(None);
            }
        }

        if let Some(slot) = slots.get(&device_id) {
            if matches!(slot.status, DeviceStatus::Connected | DeviceStatus::Pairing) {
                debug!(device_id = %device_id, status = %slot.status, "connect is a no-op for a live handle");
                return Ok(Some(snapshot_of(&device_id, slot)));
            }
        }

        let device = devices::find_device(&inner.db, &device_id)
            .await?
            .ok_or(WawaError::DeviceNotRegistered {
                device_id: device_id.clone(),
            })?;
        let credentials = devices::load_credentials(&inner.db, &device_id).await?;

        let (generation, events, reconnect_attempts) = match slots.get_mut(&device_id) {
            Some(prev) => {
                prev.lifecycle.cancel();
                (prev.generation + 1, prev.events.clone(), prev.reconnect_attempts)
            }
            None => {
                let (tx, _) = broadcast::channel(inner.config.event_buffer);
                (1, tx, 0)
            }
        };
        let lifecycle = CancellationToken::new();

        devices::set_status(&inner.db, &device_id, DeviceStatus::Pairing).await?;

        let (session, event_rx) = match inner.transport.connect(&device_id, credentials).await {
            Ok(pair) => pair,
            Err(e) => {
                devices::mark_disconnected(&inner.db, &device_id).await.ok();
                if let Some(slot) = slots.get_mut(&device_id) {
                    slot.status = DeviceStatus::Disconnected;
                    slot.session = None;
                }
                return Err(e);
            }
        };

        slots.insert(
            device_id.clone(),
            Slot {
                status: DeviceStatus::Pairing,
                session: Some(session.clone()),
                events: events.clone(),
                qr: None,
                pairing_code: None,
                phone_number: device.phone_number.clone(),
                generation,
                lifecycle: lifecycle.clone(),
                reconnect_attempts,
                options: options.clone(),
            },
        );
        let snapshot = DeviceSnapshot {
            id: device_id.clone(),
            status: DeviceStatus::Pairing,
            phone_number: device.phone_number,
            qr: None,
            pairing_code: None,
        };
        drop(slots);

        info!(device_id = %device_id, generation, "transport session initiated");

        tokio::spawn(pump_events(
            inner.clone(),
            device_id.clone(),
            generation,
            event_rx,
            lifecycle.clone(),
        ));

        if options.use_pairing_code {
            match options.phone_number.clone() {
                Some(phone) => crate::pairing::spawn_pairing_request(
                    inner.clone(),
                    device_id.clone(),
                    generation,
                    session,
                    phone,
                    lifecycle,
                ),
                None => {
                    warn!(device_id = %device_id, "pairing code requested without a phone number, falling back to QR")
                }
            }
        }

        Ok(Some(snapshot))
    }
}

/// Drains one session's event stream, in emission order, until the session
/// closes or the generation is superseded.
async fn pump_events(
    inner: Arc<Inner>,
    device_id: DeviceId,
    generation: u64,
    mut rx: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(device_id = %device_id, generation, "event pump cancelled");
                return;
            }
            event = rx.recv() => match event {
                Some(event) => event,
                None => {
                    debug!(device_id = %device_id, generation, "event stream ended");
                    return;
                }
            },
        };

        match event {
            TransportEvent::Qr(value) => {
                let mut slots = inner.slots.lock().await;
                let Some(slot) = slot_at(&mut slots, &device_id, generation) else {
                    return;
                };
                slot.qr = Some(value.clone());
                let _ = slot.events.send(DeviceEvent::QrUpdated(value));
            }
            TransportEvent::CredentialsRotated(blob) => {
                {
                    let mut slots = inner.slots.lock().await;
                    if slot_at(&mut slots, &device_id, generation).is_none() {
                        return;
                    }
                }
                if let Err(e) = devices::store_credentials(&inner.db, &device_id, blob).await {
                    warn!(device_id = %device_id, error = %e, "failed to persist rotated credentials");
                }
            }
            TransportEvent::Open { phone } => {
                {
                    let mut slots = inner.slots.lock().await;
                    let Some(slot) = slot_at(&mut slots, &device_id, generation) else {
                        return;
                    };
                    slot.status = DeviceStatus::Connected;
                    slot.phone_number = Some(phone.clone());
                    slot.qr = None;
                    slot.pairing_code = None;
                    slot.reconnect_attempts = 0;
                    let _ = slot.events.send(DeviceEvent::Connected {
                        phone: phone.clone(),
                    });
                }
                if let Err(e) = devices::mark_connected(&inner.db, &device_id, &phone).await {
                    warn!(device_id = %device_id, error = %e, "failed to persist connected state");
                }
                info!(device_id = %device_id, phone = %phone, "device connected");
            }
            TransportEvent::Closed { reason } => {
                handle_closed(inner, device_id, generation, reason).await;
                return;
            }
        }
    }
}

async fn handle_closed(
    inner: Arc<Inner>,
    device_id: DeviceId,
    generation: u64,
    reason: CloseReason,
) {
    match reason {
        CloseReason::LoggedOut => {
            let removed = {
                let mut slots = inner.slots.lock().await;
                let matches = slots
                    .get(&device_id)
                    .is_some_and(|slot| slot.generation == generation);
                if matches { slots.remove(&device_id) } else { None }
            };
            if let Some(slot) = removed {
                let _ = slot.events.send(DeviceEvent::Disconnected {
                    reason: "logged out".to_string(),
                });
                slot.lifecycle.cancel();
                if let Err(e) = devices::mark_disconnected(&inner.db, &device_id).await {
                    warn!(device_id = %device_id, error = %e, "failed to persist disconnect");
                }
                if let Err(e) = devices::purge_credentials(&inner.db, &device_id).await {
                    warn!(device_id = %device_id, error = %e, "failed to purge credentials");
                }
                info!(device_id = %device_id, "session logged out, credentials purged");
            }
        }
        CloseReason::Transient(message) => {
            let schedule = {
                let mut slots = inner.slots.lock().await;
                match slots.get_mut(&device_id) {
                    Some(slot) if slot.generation == generation => {
                        slot.status = DeviceStatus::Disconnected;
                        slot.session = None;
                        let _ = slot.events.send(DeviceEvent::Disconnected {
                            reason: message.clone(),
                        });
                        if slot.reconnect_attempts < inner.config.reconnect_max_attempts {
                            slot.reconnect_attempts += 1;
                            Some((slot.reconnect_attempts, slot.lifecycle.clone()))
                        } else {
                            None
                        }
                    }
                    _ => return,
                }
            };
            if let Err(e) = devices::mark_disconnected(&inner.db, &device_id).await {
                warn!(device_id = %device_id, error = %e, "failed to persist disconnect");
            }
            info!(device_id = %device_id, reason = %message, "session closed");
            match schedule {
                Some((attempt, token)) => {
                    crate::reconnect::schedule_reconnect(inner, device_id, generation, attempt, token);
                }
                None => {
                    warn!(device_id = %device_id, "reconnect attempts exhausted, device stays disconnected")
                }
            }
        }
    }
}

fn slot_at<'a>(
    slots: &'a mut HashMap<DeviceId, Slot>,
    device_id: &DeviceId,
    generation: u64,
) -> Option<&'a mut Slot> {
    slots
        .get_mut(device_id)
        .filter(|slot| slot.generation == generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wawa_storage::queries::users;
    use wawa_test_utils::MockTransport;
    use wawa_test_utils::harness::{memory_db, seed_user_device};

    async fn setup(transport: Arc<MockTransport>) -> (ConnectionRegistry, Database, DeviceId) {
        let db = memory_db().await;
        let device_id = seed_user_device(&db, "user-1", "dev-1").await;
        let registry =
            ConnectionRegistry::new(db.clone(), transport, SessionConfig::default());
        (registry, db, device_id)
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn connect_requires_registered_device() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, _) = setup(transport.clone()).await;

        let err = registry
            .connect(&DeviceId::from("ghost"), ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WawaError::DeviceNotRegistered { .. }));
        assert_eq!(transport.connect_count(&DeviceId::from("ghost")).await, 0);
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_live() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        let first = registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        assert_eq!(first.status, DeviceStatus::Pairing);

        let second = registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        assert_eq!(second.status, DeviceStatus::Pairing);
        assert_eq!(transport.connect_count(&device_id).await, 1);
    }

    #[tokio::test]
    async fn concurrent_connects_yield_one_session() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        let (a, b) = tokio::join!(
            registry.connect(&device_id, ConnectOptions::default()),
            registry.connect(&device_id, ConnectOptions::default()),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(transport.connect_count(&device_id).await, 1);
    }

    #[tokio::test]
    async fn open_event_promotes_to_connected() {
        let transport = Arc::new(MockTransport::new());
        let (registry, db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        let mut events = registry.subscribe(&device_id).await.unwrap();

        transport
            .emit(
                &device_id,
                TransportEvent::Open {
                    phone: "628555".to_string(),
                },
            )
            .await;

        let registry2 = registry.clone();
        let device2 = device_id.clone();
        wait_until(move || {
            let registry = registry2.clone();
            let device = device2.clone();
            async move {
                registry
                    .get_device(&device)
                    .await
                    .unwrap()
                    .map(|s| s.status == DeviceStatus::Connected)
                    .unwrap_or(false)
            }
        })
        .await;

        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Connected {
                phone: "628555".to_string()
            }
        );

        let snapshot = registry.get_device(&device_id).await.unwrap().unwrap();
        assert_eq!(snapshot.phone_number.as_deref(), Some("628555"));
        assert!(snapshot.qr.is_none());

        let row = devices::find_device(&db, &device_id).await.unwrap().unwrap();
        assert_eq!(row.status, DeviceStatus::Connected);
        assert_eq!(row.phone_number.as_deref(), Some("628555"));
        assert!(row.connected_at.is_some());
    }

    #[tokio::test]
    async fn qr_events_update_snapshot_in_order() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        let mut events = registry.subscribe(&device_id).await.unwrap();

        transport
            .emit(&device_id, TransportEvent::Qr("qr-1".to_string()))
            .await;
        transport
            .emit(&device_id, TransportEvent::Qr("qr-2".to_string()))
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::QrUpdated("qr-1".to_string())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::QrUpdated("qr-2".to_string())
        );

        let snapshot = registry.get_device(&device_id).await.unwrap().unwrap();
        assert_eq!(snapshot.qr.as_deref(), Some("qr-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_code_requested_after_delay() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        registry
            .connect(
                &device_id,
                ConnectOptions {
                    use_pairing_code: true,
                    phone_number: Some("+62 812-0001".to_string()),
                },
            )
            .await
            .unwrap();

        let transport2 = transport.clone();
        wait_until(move || {
            let transport = transport2.clone();
            async move { !transport.pairing_requests().await.is_empty() }
        })
        .await;

        // Phone is normalized before the request.
        assert_eq!(
            transport.pairing_requests().await,
            vec![("dev-1".to_string(), "628120001".to_string())]
        );

        let snapshot = registry.get_device(&device_id).await.unwrap().unwrap();
        assert_eq!(snapshot.pairing_code.as_deref(), Some("MOCK-1234"));
    }

    #[tokio::test]
    async fn transient_close_triggers_supervised_reconnect() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        transport
            .emit(
                &device_id,
                TransportEvent::Closed {
                    reason: CloseReason::Transient("stream error".to_string()),
                },
            )
            .await;

        let transport2 = transport.clone();
        let device2 = device_id.clone();
        wait_until(move || {
            let transport = transport2.clone();
            let device = device2.clone();
            async move { transport.connect_count(&device).await == 2 }
        })
        .await;

        let snapshot = registry.get_device(&device_id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, DeviceStatus::Pairing);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_close_is_terminal() {
        let transport = Arc::new(MockTransport::new());
        let (registry, db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        transport
            .emit(
                &device_id,
                TransportEvent::CredentialsRotated(vec![1, 2, 3]),
            )
            .await;

        let db2 = db.clone();
        let device2 = device_id.clone();
        wait_until(move || {
            let db = db2.clone();
            let device = device2.clone();
            async move {
                devices::load_credentials(&db, &device)
                    .await
                    .unwrap()
                    .is_some()
            }
        })
        .await;

        transport
            .emit(
                &device_id,
                TransportEvent::Closed {
                    reason: CloseReason::LoggedOut,
                },
            )
            .await;

        let db2 = db.clone();
        let device2 = device_id.clone();
        wait_until(move || {
            let db = db2.clone();
            let device = device2.clone();
            async move {
                devices::load_credentials(&db, &device)
                    .await
                    .unwrap()
                    .is_none()
            }
        })
        .await;

        // Give any (incorrect) reconnect timer room to fire.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count(&device_id).await, 1);

        let row = devices::find_device(&db, &device_id).await.unwrap().unwrap();
        assert_eq!(row.status, DeviceStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        let mut events = registry.subscribe(&device_id).await.unwrap();
        transport
            .emit(
                &device_id,
                TransportEvent::Closed {
                    reason: CloseReason::Transient("stream error".to_string()),
                },
            )
            .await;

        // Wait for the close to land (it schedules the reconnect timer),
        // then disconnect before the timer fires.
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Disconnected {
                reason: "stream error".to_string()
            }
        );
        registry.disconnect(&device_id, false).await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.connect_count(&device_id).await, 1);
        let snapshot = registry.get_device(&device_id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, DeviceStatus::Disconnected);
    }

    #[tokio::test]
    async fn send_fast_fails_without_live_session() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _db, device_id) = setup(transport.clone()).await;

        let report = registry.send_message(&device_id, "628111", "hello").await;
        assert!(!report.success);
        assert!(report.error.unwrap().contains("device not connected"));
        assert_eq!(transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn send_normalizes_recipient_phone() {
        let transport = Arc::new(MockTransport::auto_open("628555"));
        let (registry, _db, device_id) = setup(transport.clone()).await;

        registry
            .connect(&device_id, ConnectOptions::default())
            .await
            .unwrap();
        let registry2 = registry.clone();
        let device2 = device_id.clone();
        wait_until(move || {
            let registry = registry2.clone();
            let device = device2.clone();
            async move {
                registry
                    .get_device(&device)
                    .await
                    .unwrap()
                    .map(|s| s.status == DeviceStatus::Connected)
                    .unwrap_or(false)
            }
        })
        .await;

        let report = registry
            .send_message(&device_id, "+62 812-3456-7890", "hello")
            .await;
        assert!(report.success);
        assert!(report.message_id.is_some());

        let sent = transport.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "6281234567890");
        assert_eq!(sent[0].text, "hello");
    }

    #[tokio::test]
    async fn restore_sessions_reconnects_credentialed_devices() {
        let transport = Arc::new(MockTransport::new());
        let db = memory_db().await;
        users::insert_user(&db, "user-1").await.unwrap();
        let with_creds = DeviceId::from("dev-creds");
        let without = DeviceId::from("dev-fresh");
        devices::insert_device(&db, &with_creds, "user-1").await.unwrap();
        devices::insert_device(&db, &without, "user-1").await.unwrap();
        devices::store_credentials(&db, &with_creds, vec![42])
            .await
            .unwrap();

        let registry =
            ConnectionRegistry::new(db.clone(), transport.clone(), SessionConfig::default());
        let restored = registry.restore_sessions().await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(transport.connect_count(&with_creds).await, 1);
        assert_eq!(transport.connect_count(&without).await, 0);
        assert_eq!(
            transport.connect_credentials(&with_creds).await,
            vec![Some(vec![42])]
        );
    }
}
