//! Logs session events for the operator.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use emission_core::aggregate::format_duration;
use emission_session::SessionEvent;

/// Spawn a task that logs every event published on `events`.
pub fn spawn(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Observer lagged behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { state, epoch } => {
            tracing::info!(%state, epoch, "Session state changed");
        }
        SessionEvent::LiveReading {
            reading,
            severity_a,
            severity_b,
            recorded,
        } => {
            tracing::debug!(
                mq135 = reading.channel_a,
                mq7 = reading.channel_b,
                %severity_a,
                %severity_b,
                recorded,
                "Reading",
            );
        }
        SessionEvent::DurationTick { seconds, .. } => {
            tracing::debug!(elapsed = %format_duration(*seconds), "Session running");
        }
        SessionEvent::Connectivity { connected, link_up } => {
            if *connected {
                tracing::info!(link_up, "Device connected");
            } else {
                tracing::warn!(link_up, "Device disconnected");
            }
        }
        SessionEvent::TransportGaveUp { attempts } => {
            tracing::error!(attempts, "Telemetry link lost for good, restart the monitor to retry");
        }
        SessionEvent::SessionSaved {
            session_id,
            receipt,
        } => {
            tracing::info!(%session_id, test_id = receipt.id, "Test record stored");
        }
        SessionEvent::SaveFailed { session_id, error } => {
            tracing::error!(%session_id, %error, "Test record was not stored");
        }
    }
}
