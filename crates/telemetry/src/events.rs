//! Typed events and commands exchanged with the device link.

use serde::Serialize;

/// Connectivity as seen by the session layer.
///
/// Written only by the transport task; everything else observes it
/// through [`subscribe_connectivity`].
///
/// [`subscribe_connectivity`]: crate::ConnectionManager::subscribe_connectivity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// Device-reported link health. Forced to `false` while the transport is down.
    pub connected: bool,
    /// Whether the Socket.IO session with the telemetry source is open.
    pub link_up: bool,
}

/// Something that happened on the telemetry link, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// The WebSocket was (re)established.
    LinkUp,
    /// The WebSocket dropped; a reconnect attempt follows unless closed.
    LinkDown,
    /// The device-reported connectivity flag changed.
    Connectivity(bool),
    /// A `sensor-data` payload, unvalidated.
    Reading(serde_json::Value),
    /// Every reconnect attempt failed; the transport task has stopped.
    ReconnectFailed { attempts: u32 },
}

/// One-way, best-effort signal to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    StartTest,
    StopTest,
}

impl DeviceCommand {
    /// Event name used on the wire.
    pub fn event_name(self) -> &'static str {
        match self {
            DeviceCommand::StartTest => "start-test",
            DeviceCommand::StopTest => "stop-test",
        }
    }
}
