//! Single-task session event loop.
//!
//! [`SessionRuntime`] owns the [`SessionController`] and is the only code
//! that mutates it. One task multiplexes three event sources with
//! `tokio::select!`:
//!
//! * operator commands, sent through a cloneable [`SessionHandle`];
//! * transport events from the connection manager;
//! * duration-ticker firings, tagged with the epoch they belong to.
//!
//! Persistence calls run in spawned tasks so reading ingestion never
//! waits on the network.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use emission_core::error::SessionError;
use emission_core::metadata::TestMetadata;
use emission_core::persistence::{PersistenceError, SessionSink, SubmitReceipt};
use emission_core::reading;
use emission_core::session::FinalizedSession;
use emission_telemetry::{DeviceCommand, TelemetryEvent};

use crate::controller::{SessionController, SessionSnapshot, StopSummary};
use crate::device::DeviceLink;
use crate::events::SessionEvent;

/// Resolution of the duration ticker.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Failure of a command issued through [`SessionHandle`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The state machine refused the command.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session was finalized but the collaborator did not store it.
    /// The finalized session is handed back so the caller can retry.
    #[error("Failed to save session: {source}")]
    Persistence {
        source: PersistenceError,
        session: Box<FinalizedSession>,
    },

    /// The runtime task has exited.
    #[error("Session runtime is not running")]
    RuntimeStopped,
}

enum Command {
    Start(oneshot::Sender<Result<u64, SessionError>>),
    Stop(oneshot::Sender<Result<StopSummary, SessionError>>),
    Submit(TestMetadata, oneshot::Sender<Result<SubmitReceipt, CommandError>>),
    Cancel(oneshot::Sender<Result<(), SessionError>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Cloneable handle for issuing operator commands.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Start a session; returns its epoch.
    pub async fn start(&self) -> Result<u64, CommandError> {
        Ok(self.request(Command::Start).await??)
    }

    pub async fn stop(&self) -> Result<StopSummary, CommandError> {
        Ok(self.request(Command::Stop).await??)
    }

    /// Finalize the stopped session and wait for the collaborator to store it.
    pub async fn submit(&self, metadata: TestMetadata) -> Result<SubmitReceipt, CommandError> {
        self.request(|reply| Command::Submit(metadata, reply)).await?
    }

    pub async fn cancel(&self) -> Result<(), CommandError> {
        Ok(self.request(Command::Cancel).await??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, CommandError> {
        self.request(Command::Snapshot).await
    }

    /// Ask the runtime to exit after the current event.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CommandError::RuntimeStopped)?;
        rx.await.map_err(|_| CommandError::RuntimeStopped)
    }
}

/// Owns the controller and drives it from a single task.
pub struct SessionRuntime<S, D> {
    controller: SessionController,
    sink: Arc<S>,
    device: D,
    telemetry: mpsc::Receiver<TelemetryEvent>,
    commands: mpsc::Receiver<Command>,
    ticks_tx: mpsc::UnboundedSender<u64>,
    ticks_rx: mpsc::UnboundedReceiver<u64>,
    ticker: Option<CancellationToken>,
    tick_interval: Duration,
}

impl<S: SessionSink, D: DeviceLink> SessionRuntime<S, D> {
    pub fn new(
        controller: SessionController,
        sink: Arc<S>,
        device: D,
        telemetry: mpsc::Receiver<TelemetryEvent>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();

        let runtime = Self {
            controller,
            sink,
            device,
            telemetry,
            commands: command_rx,
            ticks_tx,
            ticks_rx,
            ticker: None,
            tick_interval: TICK_INTERVAL,
        };

        (runtime, SessionHandle { commands: command_tx })
    }

    /// Subscribe to observer events before the runtime is moved into its task.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.controller.subscribe()
    }

    /// Run until shut down or until every [`SessionHandle`] is dropped.
    pub async fn run(mut self) {
        let mut telemetry_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                event = self.telemetry.recv(), if telemetry_open => {
                    match event {
                        Some(event) => self.handle_telemetry(event),
                        None => {
                            tracing::info!("Telemetry channel closed");
                            telemetry_open = false;
                        }
                    }
                }
                Some(epoch) = self.ticks_rx.recv() => {
                    self.controller.on_tick(epoch);
                }
            }
        }

        self.cancel_ticker();
        tracing::info!("Session runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.controller.start();
                if let Ok(epoch) = result {
                    self.spawn_ticker(epoch);
                    self.device.send(DeviceCommand::StartTest);
                }
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let result = self.controller.stop();
                if !matches!(result, Err(SessionError::InvalidState { .. })) {
                    self.cancel_ticker();
                    self.device.send(DeviceCommand::StopTest);
                }
                let _ = reply.send(result);
            }
            Command::Submit(metadata, reply) => match self.controller.submit(metadata) {
                Ok(finalized) => self.spawn_persist(finalized, reply),
                Err(e) => {
                    let _ = reply.send(Err(e.into()));
                }
            },
            Command::Cancel(reply) => {
                let _ = reply.send(self.controller.cancel());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_telemetry(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Reading(raw) => match reading::validate(Some(&raw)) {
                Some(reading) => {
                    self.controller.record_reading(reading);
                }
                None => tracing::trace!("Dropping empty sensor payload"),
            },
            TelemetryEvent::Connectivity(_) | TelemetryEvent::LinkUp | TelemetryEvent::LinkDown => {
                self.controller.publish_connectivity();
            }
            TelemetryEvent::ReconnectFailed { attempts } => {
                tracing::error!(attempts, "Telemetry transport gave up reconnecting");
                self.controller.publish_connectivity();
                self.controller
                    .publish(SessionEvent::TransportGaveUp { attempts });
            }
        }
    }

    fn spawn_ticker(&mut self, epoch: u64) {
        self.cancel_ticker();

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let ticks = self.ticks_tx.clone();
        let period = self.tick_interval;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if ticks.send(epoch).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!(epoch, "Duration ticker exited");
        });

        self.ticker = Some(cancel);
    }

    fn cancel_ticker(&mut self) {
        if let Some(cancel) = self.ticker.take() {
            cancel.cancel();
        }
    }

    fn spawn_persist(
        &self,
        finalized: FinalizedSession,
        reply: oneshot::Sender<Result<SubmitReceipt, CommandError>>,
    ) {
        let sink = Arc::clone(&self.sink);
        let events = self.controller.event_sender();

        tokio::spawn(async move {
            let session_id = finalized.session_id;
            let outcome = match sink.submit(&finalized).await {
                Ok(receipt) => {
                    tracing::info!(session_id = %session_id, test_id = receipt.id, "Session saved");
                    let _ = events.send(SessionEvent::SessionSaved {
                        session_id,
                        receipt: receipt.clone(),
                    });
                    Ok(receipt)
                }
                Err(source) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %source,
                        "Failed to save session",
                    );
                    let _ = events.send(SessionEvent::SaveFailed {
                        session_id,
                        error: source.to_string(),
                    });
                    Err(CommandError::Persistence {
                        source,
                        session: Box::new(finalized),
                    })
                }
            };
            let _ = reply.send(outcome);
        });
    }
}
