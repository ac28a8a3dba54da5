use emission_telemetry::{ConnectionManager, DeviceCommand};

/// One-way command path to the device.
///
/// Delivery is never acknowledged; implementations must not block.
pub trait DeviceLink: Send + Sync + 'static {
    fn send(&self, command: DeviceCommand);
}

impl DeviceLink for ConnectionManager {
    fn send(&self, command: DeviceCommand) {
        ConnectionManager::send(self, command);
    }
}

impl<T: DeviceLink + ?Sized> DeviceLink for std::sync::Arc<T> {
    fn send(&self, command: DeviceCommand) {
        (**self).send(command);
    }
}
