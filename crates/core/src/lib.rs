//! Domain logic for the emission monitor.
//!
//! Everything in this crate is pure: no sockets, no HTTP, no timers.
//! The transport lives in `emission-telemetry`, the session event loop in
//! `emission-session`, and the persistence client in `emission-report`.

pub mod aggregate;
pub mod buffer;
pub mod error;
pub mod metadata;
pub mod persistence;
pub mod reading;
pub mod session;
pub mod thresholds;
pub mod types;
