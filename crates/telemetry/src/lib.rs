//! Live telemetry transport for the emission monitor.
//!
//! Provides the Socket.IO connection manager, the wire frame codec,
//! the bounded reconnect policy, and the typed events the session layer
//! consumes.

pub mod client;
pub mod events;
pub mod manager;
pub mod messages;
pub mod reconnect;

pub use events::{ConnectionState, DeviceCommand, TelemetryEvent};
pub use manager::{ConnectionManager, TelemetryConfig};
pub use reconnect::ReconnectPolicy;
