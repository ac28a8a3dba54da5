//! Telemetry connection manager.
//!
//! [`ConnectionManager`] owns the single persistent Socket.IO session with
//! the telemetry source. It spawns one task (connect -> process -> reconnect)
//! that publishes every transport event, in arrival order, on an
//! [`mpsc`] channel returned from [`ConnectionManager::connect`], and
//! maintains the shared [`ConnectionState`] through a [`watch`] channel.
//! That task is the only writer of the connectivity state.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{self, TelemetryLink};
use crate::events::{ConnectionState, DeviceCommand, TelemetryEvent};
use crate::messages::{
    encode_command, parse_frame, InboundMessage, Packet, DISCONNECT_FRAME, PONG_FRAME,
};
use crate::reconnect::{reconnect_loop, ReconnectOutcome, ReconnectPolicy};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How long [`ConnectionManager::close`] waits for the task to exit.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the telemetry source.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Socket.IO server URL, e.g. `http://localhost:3001`.
    pub url: String,
    pub reconnect: ReconnectPolicy,
    pub event_capacity: usize,
}

impl TelemetryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Handle to the telemetry transport task.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<DeviceCommand>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawn the transport task and start connecting to `config.url`.
    ///
    /// Returns the manager plus the receiver of all [`TelemetryEvent`]s.
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: TelemetryConfig) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            tracing::info!(url = %config.url, "Starting telemetry connection task");
            run_connection_loop(&config, command_rx, &event_tx, &state_tx, &task_cancel).await;
            tracing::info!(url = %config.url, "Telemetry connection task exited");
        });

        let manager = Self {
            commands: command_tx,
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        };

        (manager, event_rx)
    }

    /// Current connectivity snapshot.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe connectivity changes.
    pub fn subscribe_connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Best-effort signal to the device.
    ///
    /// Never blocks and never fails; commands issued while the link is
    /// down are dropped.
    pub fn send(&self, command: DeviceCommand) {
        if !self.state.borrow().link_up {
            tracing::debug!(command = command.event_name(), "Link down, dropping device command");
            return;
        }
        if self.commands.send(command).is_err() {
            tracing::debug!(
                command = command.event_name(),
                "Transport closed, dropping device command",
            );
        }
    }

    /// Release the link. Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            tracing::info!("Closing telemetry connection");
            if tokio::time::timeout(CLOSE_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Telemetry task did not exit in time");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Core connection loop: connect -> process messages -> reconnect.
///
/// Runs until cancelled or until the reconnect budget is exhausted.
async fn run_connection_loop(
    config: &TelemetryConfig,
    mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
    event_tx: &mpsc::Sender<TelemetryEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) {
    let mut first = true;

    loop {
        let link = if first {
            first = false;
            let initial = tokio::select! {
                _ = cancel.cancelled() => return,
                result = client::open(&config.url) => result,
            };
            match initial {
                Ok(link) => link,
                Err(e) => {
                    tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                    match retry(config, event_tx, cancel).await {
                        Some(link) => link,
                        None => return,
                    }
                }
            }
        } else {
            tracing::info!("Connection lost, entering reconnect loop");
            match retry(config, event_tx, cancel).await {
                Some(link) => link,
                None => return,
            }
        };

        // Anything queued while the link was down is stale.
        while let Ok(command) = commands.try_recv() {
            tracing::debug!(command = command.event_name(), "Dropping stale device command");
        }

        state_tx.send_modify(|state| state.link_up = true);
        emit(event_tx, TelemetryEvent::LinkUp).await;

        process_messages(link, &mut commands, event_tx, state_tx, cancel).await;

        let was_connected = state_tx.borrow().connected;
        state_tx.send_modify(|state| *state = ConnectionState::default());
        emit(event_tx, TelemetryEvent::LinkDown).await;
        if was_connected {
            emit(event_tx, TelemetryEvent::Connectivity(false)).await;
        }

        if cancel.is_cancelled() {
            return;
        }
    }
}

/// Run the reconnect policy; `None` means the task should stop.
async fn retry(
    config: &TelemetryConfig,
    event_tx: &mpsc::Sender<TelemetryEvent>,
    cancel: &CancellationToken,
) -> Option<TelemetryLink> {
    match reconnect_loop(&config.url, &config.reconnect, cancel).await {
        ReconnectOutcome::Connected(link) => Some(link),
        ReconnectOutcome::Exhausted { attempts } => {
            emit(event_tx, TelemetryEvent::ReconnectFailed { attempts }).await;
            None
        }
        ReconnectOutcome::Cancelled => None,
    }
}

/// What the receive loop should do after a text frame.
enum FrameAction {
    Continue,
    Reply(&'static str),
    Close,
}

/// Drive one Socket.IO session until it closes, errors, goes silent past
/// the server's ping window, or is cancelled.
async fn process_messages(
    link: TelemetryLink,
    commands: &mut mpsc::UnboundedReceiver<DeviceCommand>,
    event_tx: &mpsc::Sender<TelemetryEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) {
    let liveness = link.open.liveness_window();
    let (mut sink, mut stream) = link.stream.split();
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Text(DISCONNECT_FRAME.to_string())).await;
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(
                    window_ms = liveness.as_millis() as u64,
                    "No ping from telemetry source, dropping link",
                );
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    // Every manager handle is gone.
                    let _ = sink.send(Message::Text(DISCONNECT_FRAME.to_string())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                tracing::debug!(command = command.event_name(), "Sending device command");
                if let Err(e) = sink.send(Message::Text(encode_command(command))).await {
                    tracing::error!(error = %e, "Failed to send device command");
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        deadline = Instant::now() + liveness;
                        match handle_text_message(&text, event_tx, state_tx).await {
                            FrameAction::Continue => {}
                            FrameAction::Reply(frame) => {
                                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                                    tracing::error!(error = %e, "Failed to answer telemetry ping");
                                    break;
                                }
                            }
                            FrameAction::Close => break,
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // WebSocket-level keepalive, handled by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Telemetry source closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {
                        tracing::trace!("Ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Dispatch a single text frame.
async fn handle_text_message(
    text: &str,
    event_tx: &mpsc::Sender<TelemetryEvent>,
    state_tx: &watch::Sender<ConnectionState>,
) -> FrameAction {
    let message = match parse_frame(text) {
        Ok(Packet::Event(message)) => message,
        Ok(Packet::Ping) => return FrameAction::Reply(PONG_FRAME),
        Ok(Packet::Close) => {
            tracing::info!("Telemetry source closed the session");
            return FrameAction::Close;
        }
        Ok(Packet::Disconnected) => {
            tracing::info!("Telemetry source disconnected the namespace");
            return FrameAction::Close;
        }
        Ok(Packet::ConnectError(message)) => {
            tracing::warn!(%message, "Telemetry source refused the namespace");
            return FrameAction::Close;
        }
        Ok(other) => {
            tracing::trace!(?other, "Ignoring control packet");
            return FrameAction::Continue;
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse telemetry frame");
            return FrameAction::Continue;
        }
    };

    match message {
        InboundMessage::ConnectionStatus { connected } => {
            let changed = state_tx.send_if_modified(|state| {
                let changed = state.connected != connected;
                state.connected = connected;
                changed
            });
            if changed {
                tracing::info!(connected, "Device connectivity changed");
                emit(event_tx, TelemetryEvent::Connectivity(connected)).await;
            }
        }
        InboundMessage::SensorData(Some(data)) => {
            emit(event_tx, TelemetryEvent::Reading(data)).await;
        }
        InboundMessage::SensorData(None) => {
            tracing::debug!("Sensor event without payload");
        }
        InboundMessage::Unknown(event) => {
            tracing::debug!(event = %event, "Ignoring unknown telemetry event");
        }
    }
    FrameAction::Continue
}

async fn emit(event_tx: &mpsc::Sender<TelemetryEvent>, event: TelemetryEvent) {
    if event_tx.send(event).await.is_err() {
        tracing::trace!("No telemetry event receiver");
    }
}
