// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session lifecycle for the Wawa blast platform.
//!
//! The [`ConnectionRegistry`] owns every live transport session, keyed by
//! device id, and drives the per-device state machine:
//!
//! ```text
//! PAIRING --Open--> CONNECTED --Closed(transient)--> DISCONNECTED --reconnect--> PAIRING
//!                              --Closed(logout)----> removed (terminal)
//! ```
//!
//! Lifecycle changes surface as [`DeviceEvent`]s on a per-device broadcast
//! channel instead of callbacks, and reconnection is supervised: bounded
//! exponential backoff, with generation counters and cancellation tokens
//! keeping stale timers inert.

pub mod events;
pub mod loopback;
pub mod pairing;
pub mod reconnect;
pub mod registry;

pub use events::DeviceEvent;
pub use loopback::LoopbackTransport;
pub use registry::{ConnectOptions, ConnectionRegistry, DeviceSnapshot};
