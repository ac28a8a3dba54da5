//! Test session orchestration.
//!
//! [`controller::SessionController`] is the synchronous state machine that
//! owns all session state; [`runtime::SessionRuntime`] drives it from a
//! single task, multiplexing transport events, the duration ticker and
//! operator commands.

pub mod controller;
pub mod device;
pub mod events;
pub mod runtime;

pub use controller::{SessionController, SessionSnapshot, StopSummary};
pub use device::DeviceLink;
pub use events::SessionEvent;
pub use runtime::{CommandError, SessionHandle, SessionRuntime};
