//! Socket.IO v4 frame codec.
//!
//! Each WebSocket text frame is one Engine.IO packet: a single type digit
//! followed by its payload. Engine.IO `message` packets (`4`) carry a
//! Socket.IO packet, again led by a type digit, so a device event arrives
//! as `42["sensor-data",{...}]`.
//!
//! | Frame              | Meaning                                   |
//! |--------------------|-------------------------------------------|
//! | `0{"sid":..}`      | Engine.IO open, with ping timing          |
//! | `1`                | Engine.IO close                           |
//! | `2` / `3`          | ping / pong                               |
//! | `40{"sid":..}`     | namespace connect acknowledged            |
//! | `41`               | namespace disconnect                      |
//! | `42[name, data]`   | event                                     |
//! | `44{"message":..}` | namespace connect refused                 |
//!
//! Only the default namespace is used; binary packets, acks and other
//! namespaces are reported as [`Packet::Ignored`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::events::DeviceCommand;

pub const EVENT_CONNECTION_STATUS: &str = "connection-status";
pub const EVENT_SENSOR_DATA: &str = "sensor-data";

/// Namespace connect request for the default namespace.
pub const CONNECT_FRAME: &str = "40";
/// Namespace disconnect for the default namespace.
pub const DISCONNECT_FRAME: &str = "41";
/// Reply to a server ping.
pub const PONG_FRAME: &str = "3";

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
}

impl OpenInfo {
    /// How long the link may stay silent before it is considered dead.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// A decoded device event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Device link health. A missing or non-boolean flag reads as `false`.
    ConnectionStatus { connected: bool },
    /// One telemetry sample; `None` when the event carried no payload.
    SensorData(Option<Value>),
    /// Any other event name. Callers log and ignore these.
    Unknown(String),
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    /// The default namespace accepted our connect.
    Connected,
    /// The server disconnected us from the default namespace.
    Disconnected,
    /// The server refused the namespace connect.
    ConnectError(String),
    Event(InboundMessage),
    /// Well-formed but of no interest (noop, upgrade, acks, binary, other namespaces).
    Ignored(String),
}

/// Why a text frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown packet type {0:?}")]
    UnknownType(char),

    #[error("Event payload is not a [name, ...] array")]
    MalformedEvent,

    #[error("Invalid packet JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one WebSocket text frame.
pub fn parse_frame(text: &str) -> Result<Packet, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let payload = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(payload)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => parse_socket_packet(payload),
        '5' | '6' => Ok(Packet::Ignored(text.to_string())),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn parse_socket_packet(packet: &str) -> Result<Packet, FrameError> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();

    // `/admin,` style prefixes address another namespace.
    if rest.starts_with('/') {
        return Ok(Packet::Ignored(packet.to_string()));
    }

    match kind {
        '0' => Ok(Packet::Connected),
        '1' => Ok(Packet::Disconnected),
        '2' => {
            // An ack id may sit between the type and the array.
            let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            parse_event(body).map(Packet::Event)
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| rest.to_string());
            Ok(Packet::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Packet::Ignored(packet.to_string())),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn parse_event(body: &str) -> Result<InboundMessage, FrameError> {
    let args: Vec<Value> = serde_json::from_str(body)?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(FrameError::MalformedEvent),
    };
    let data = args.next().unwrap_or(Value::Null);

    let message = match name.as_str() {
        EVENT_CONNECTION_STATUS => InboundMessage::ConnectionStatus {
            connected: data
                .get("connected")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        EVENT_SENSOR_DATA => match data {
            Value::Null => InboundMessage::SensorData(None),
            data => InboundMessage::SensorData(Some(data)),
        },
        _ => InboundMessage::Unknown(name),
    };

    Ok(message)
}

/// Encode a device command as a Socket.IO event frame without arguments.
pub fn encode_command(command: DeviceCommand) -> String {
    format!("42{}", Value::from(vec![command.event_name()]))
}
