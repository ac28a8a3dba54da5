//! Test session state machine.
//!
//! ```text
//! Idle --start--> Running --stop--> AwaitingMetadata --submit/cancel--> Idle
//!                    \--stop (no samples)--> Idle
//! ```
//!
//! [`SessionController`] is the session store: it owns the lifecycle
//! state, the full sample accumulation, the 30-entry display buffer and
//! the latest live reading, and publishes every change as a
//! [`SessionEvent`]. It never blocks and never touches I/O; the runtime
//! turns its results into device commands, ticker tasks and persistence
//! calls.
//!
//! Every successful `start` bumps the session epoch. Deferred work (the
//! duration ticker) carries the epoch it was started under and is
//! ignored once the epoch has moved on.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use uuid::Uuid;

use emission_core::aggregate::summarize;
use emission_core::buffer::RollingBuffer;
use emission_core::error::SessionError;
use emission_core::metadata::TestMetadata;
use emission_core::reading::{DisplaySample, SensorReading};
use emission_core::session::{FinalizedSession, SessionState};
use emission_core::thresholds::{Channel, Severity, ThresholdConfig};
use emission_core::types::Timestamp;
use emission_telemetry::ConnectionState;

use crate::events::SessionEvent;

/// Broadcast channel capacity for observer events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Returned by a successful [`SessionController::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopSummary {
    pub sample_count: usize,
    pub duration_seconds: u64,
}

/// Point-in-time view of the session store for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub epoch: u64,
    pub session_id: Option<Uuid>,
    pub started_at: Option<Timestamp>,
    pub duration_seconds: u64,
    /// Samples accumulated in the current session (not capped).
    pub recorded: usize,
    /// The most recent samples, oldest first.
    pub display: Vec<DisplaySample>,
    pub live: Option<SensorReading>,
    pub live_severity: Option<(Severity, Severity)>,
    pub connectivity: ConnectionState,
}

pub struct SessionController {
    thresholds: ThresholdConfig,
    connectivity: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,

    state: SessionState,
    epoch: u64,
    session_id: Option<Uuid>,
    started_at: Option<Timestamp>,
    started_instant: Option<Instant>,
    duration_seconds: u64,
    accumulation: Vec<DisplaySample>,
    display: RollingBuffer<DisplaySample>,
    live: Option<SensorReading>,
}

impl SessionController {
    /// `connectivity` is the read side of the transport's connection state.
    pub fn new(
        thresholds: ThresholdConfig,
        connectivity: watch::Receiver<ConnectionState>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            thresholds,
            connectivity,
            events,
            state: SessionState::Idle,
            epoch: 0,
            session_id: None,
            started_at: None,
            started_instant: None,
            duration_seconds: 0,
            accumulation: Vec::new(),
            display: RollingBuffer::default(),
            live: None,
        }
    }

    /// Subscribe to observer events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Sender side of the observer channel, for deferred publishers.
    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            epoch: self.epoch,
            session_id: self.session_id,
            started_at: self.started_at,
            duration_seconds: self.duration_seconds,
            recorded: self.accumulation.len(),
            display: self.display.snapshot(),
            live: self.live,
            live_severity: self.live.map(|r| self.severities(&r)),
            connectivity: *self.connectivity.borrow(),
        }
    }

    /// `Idle -> Running`. Requires device connectivity.
    ///
    /// Returns the new session epoch.
    pub fn start(&mut self) -> Result<u64, SessionError> {
        self.expect_state(SessionState::Idle, "start")?;

        if !self.connectivity.borrow().connected {
            tracing::warn!("Refusing to start session: device not connected");
            return Err(SessionError::NotConnected);
        }

        self.epoch += 1;
        let session_id = Uuid::now_v7();
        self.session_id = Some(session_id);
        self.started_at = Some(Utc::now());
        self.started_instant = Some(Instant::now());
        self.duration_seconds = 0;
        self.accumulation.clear();
        self.display.clear();

        tracing::info!(epoch = self.epoch, session_id = %session_id, "Session started");
        self.transition(SessionState::Running);
        Ok(self.epoch)
    }

    /// Accept a validated reading.
    ///
    /// The live value is always refreshed; the reading is recorded only
    /// while `Running`. Returns whether it was recorded.
    pub fn record_reading(&mut self, reading: SensorReading) -> bool {
        self.live = Some(reading);
        let recorded = self.state == SessionState::Running;

        if recorded {
            let sample = DisplaySample::from_reading(&reading);
            self.accumulation.push(sample.clone());
            self.display.append(sample);
        }

        let (severity_a, severity_b) = self.severities(&reading);
        self.publish(SessionEvent::LiveReading {
            reading,
            severity_a,
            severity_b,
            recorded,
        });
        recorded
    }

    /// Duration ticker firing for `epoch`.
    ///
    /// Returns the updated duration, or `None` when the tick belongs to a
    /// superseded session or the session is no longer running.
    pub fn on_tick(&mut self, epoch: u64) -> Option<u64> {
        if epoch != self.epoch || self.state != SessionState::Running {
            tracing::trace!(epoch, current = self.epoch, "Ignoring stale tick");
            return None;
        }

        self.duration_seconds = self.elapsed_seconds();
        self.publish(SessionEvent::DurationTick {
            epoch,
            seconds: self.duration_seconds,
        });
        Some(self.duration_seconds)
    }

    /// `Running -> AwaitingMetadata`, or straight back to `Idle` when
    /// nothing was recorded.
    ///
    /// Accepted samples are never discarded by a successful stop.
    pub fn stop(&mut self) -> Result<StopSummary, SessionError> {
        self.expect_state(SessionState::Running, "stop")?;

        self.duration_seconds = self.elapsed_seconds();
        self.started_instant = None;

        if self.accumulation.is_empty() {
            tracing::warn!(epoch = self.epoch, "Session stopped with no readings");
            self.reset();
            return Err(SessionError::EmptySession);
        }

        let summary = StopSummary {
            sample_count: self.accumulation.len(),
            duration_seconds: self.duration_seconds,
        };
        tracing::info!(
            epoch = self.epoch,
            samples = summary.sample_count,
            duration_seconds = summary.duration_seconds,
            "Session stopped",
        );
        self.transition(SessionState::AwaitingMetadata);
        Ok(summary)
    }

    /// `AwaitingMetadata -> Idle`, producing the finalized session.
    ///
    /// Missing metadata leaves the session awaiting metadata.
    pub fn submit(&mut self, metadata: TestMetadata) -> Result<FinalizedSession, SessionError> {
        self.expect_state(SessionState::AwaitingMetadata, "submit")?;
        metadata.validate()?;

        let aggregate = summarize(&self.accumulation, self.duration_seconds)?;
        let finalized = FinalizedSession {
            session_id: self.session_id.unwrap_or_else(Uuid::now_v7),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            metadata,
            samples: std::mem::take(&mut self.accumulation),
            aggregate,
        };

        tracing::info!(
            session_id = %finalized.session_id,
            samples = finalized.samples.len(),
            mean_a = aggregate.mean_a,
            mean_b = aggregate.mean_b,
            "Session finalized",
        );
        self.reset();
        Ok(finalized)
    }

    /// `AwaitingMetadata -> Idle`, discarding the session.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::AwaitingMetadata, "cancel")?;
        tracing::info!(epoch = self.epoch, "Session discarded");
        self.reset();
        Ok(())
    }

    /// Publish the current connectivity to observers.
    pub fn publish_connectivity(&self) {
        let state = *self.connectivity.borrow();
        self.publish(SessionEvent::Connectivity {
            connected: state.connected,
            link_up: state.link_up,
        });
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // Zero receivers is fine.
        let _ = self.events.send(event);
    }

    // ---- private helpers ----

    fn severities(&self, reading: &SensorReading) -> (Severity, Severity) {
        (
            self.thresholds.classify(reading.channel_a, Channel::A),
            self.thresholds.classify(reading.channel_b, Channel::B),
        )
    }

    fn elapsed_seconds(&self) -> u64 {
        self.started_instant
            .map(|start| start.elapsed().as_secs())
            .unwrap_or(self.duration_seconds)
    }

    fn expect_state(
        &self,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn reset(&mut self) {
        self.session_id = None;
        self.started_at = None;
        self.started_instant = None;
        self.duration_seconds = 0;
        self.accumulation.clear();
        self.display.clear();
        self.transition(SessionState::Idle);
    }

    fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.publish(SessionEvent::StateChanged {
            state,
            epoch: self.epoch,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn controller(connected: bool) -> (SessionController, watch::Sender<ConnectionState>) {
        let (tx, rx) = watch::channel(ConnectionState {
            connected,
            link_up: connected,
        });
        (SessionController::new(ThresholdConfig::default(), rx), tx)
    }

    fn reading(a: f64, b: f64) -> SensorReading {
        emission_core::reading::validate(Some(&json!({"mq135_ppm": a, "mq7_ppm": b}))).unwrap()
    }

    fn metadata() -> TestMetadata {
        TestMetadata {
            owner_name: "Budi".into(),
            vehicle_brand: "Honda".into(),
            vehicle_model: "Vario".into(),
            engine_cc: "125".into(),
            whatsapp_number: "0812".into(),
        }
    }

    #[test]
    fn start_requires_connectivity() {
        let (mut ctl, _tx) = controller(false);
        assert_eq!(ctl.start(), Err(SessionError::NotConnected));
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(ctl.epoch(), 0);
    }

    #[test]
    fn start_follows_live_connectivity() {
        let (mut ctl, tx) = controller(false);
        tx.send_modify(|s| s.connected = true);
        assert_eq!(ctl.start(), Ok(1));
        assert_eq!(ctl.state(), SessionState::Running);
    }

    #[test]
    fn readings_outside_session_only_refresh_live_value() {
        let (mut ctl, _tx) = controller(true);
        assert!(!ctl.record_reading(reading(10.0, 1.0)));

        let snap = ctl.snapshot();
        assert_eq!(snap.recorded, 0);
        assert!(snap.display.is_empty());
        assert_eq!(snap.live.unwrap().channel_a, 10.0);
        assert_eq!(snap.live_severity, Some((Severity::Normal, Severity::Normal)));
    }

    #[test]
    fn stop_without_samples_returns_to_idle() {
        let (mut ctl, _tx) = controller(true);
        ctl.start().unwrap();
        assert_eq!(ctl.stop(), Err(SessionError::EmptySession));
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(ctl.snapshot().duration_seconds, 0);
    }

    #[test]
    fn accumulation_is_uncapped_while_display_is_capped() {
        let (mut ctl, _tx) = controller(true);
        ctl.start().unwrap();
        for i in 0..45 {
            assert!(ctl.record_reading(reading(f64::from(i), 0.0)));
        }

        let snap = ctl.snapshot();
        assert_eq!(snap.recorded, 45);
        assert_eq!(snap.display.len(), 30);
        assert_eq!(snap.display.first().unwrap().channel_a, 15.0);

        ctl.stop().unwrap();
        let finalized = ctl.submit(metadata()).unwrap();
        assert_eq!(finalized.samples.len(), 45);
        assert_eq!(finalized.aggregate.mean_a, 22.0);
        assert_eq!(finalized.aggregate.max_a, 44.0);
    }

    #[test]
    fn full_lifecycle() {
        let (mut ctl, _tx) = controller(true);
        let mut events = ctl.subscribe();

        ctl.start().unwrap();
        ctl.record_reading(reading(10.0, 20.0));
        ctl.record_reading(reading(30.0, 40.0));
        ctl.record_reading(reading(20.0, 30.0));

        let summary = ctl.stop().unwrap();
        assert_eq!(summary.sample_count, 3);
        assert_eq!(ctl.state(), SessionState::AwaitingMetadata);

        // Readings after stop are not recorded.
        assert!(!ctl.record_reading(reading(999.0, 999.0)));

        let finalized = ctl.submit(metadata()).unwrap();
        assert_eq!(finalized.samples.len(), 3);
        assert_eq!(finalized.aggregate.mean_a, 20.0);
        assert_eq!(finalized.aggregate.max_b, 40.0);
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(ctl.snapshot().recorded, 0);
        assert!(ctl.snapshot().display.is_empty());

        assert_matches!(
            events.try_recv(),
            Ok(SessionEvent::StateChanged { state: SessionState::Running, epoch: 1 })
        );
    }

    #[test]
    fn submit_with_missing_fields_keeps_awaiting() {
        let (mut ctl, _tx) = controller(true);
        ctl.start().unwrap();
        ctl.record_reading(reading(1.0, 1.0));
        ctl.stop().unwrap();

        let incomplete = TestMetadata {
            engine_cc: " ".into(),
            ..metadata()
        };
        assert_eq!(
            ctl.submit(incomplete),
            Err(SessionError::MissingMetadata(vec!["cc_motor"]))
        );
        assert_eq!(ctl.state(), SessionState::AwaitingMetadata);
        assert_eq!(ctl.snapshot().recorded, 1);

        assert!(ctl.submit(metadata()).is_ok());
    }

    #[test]
    fn cancel_discards_session() {
        let (mut ctl, _tx) = controller(true);
        ctl.start().unwrap();
        ctl.record_reading(reading(1.0, 1.0));
        ctl.stop().unwrap();
        assert_eq!(ctl.snapshot().display.len(), 1);

        ctl.cancel().unwrap();
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(ctl.snapshot().recorded, 0);
        assert!(ctl.snapshot().display.is_empty());
    }

    #[test]
    fn commands_in_wrong_state_are_refused_without_mutation() {
        let (mut ctl, _tx) = controller(true);
        assert_matches!(
            ctl.stop(),
            Err(SessionError::InvalidState { action: "stop", state: SessionState::Idle })
        );
        assert_matches!(ctl.submit(metadata()), Err(SessionError::InvalidState { .. }));
        assert_matches!(ctl.cancel(), Err(SessionError::InvalidState { .. }));

        ctl.start().unwrap();
        assert_matches!(
            ctl.start(),
            Err(SessionError::InvalidState { action: "start", state: SessionState::Running })
        );
        assert_eq!(ctl.epoch(), 1);
    }

    #[test]
    fn stale_ticks_are_ignored() {
        let (mut ctl, _tx) = controller(true);
        let first = ctl.start().unwrap();
        ctl.record_reading(reading(1.0, 1.0));
        ctl.stop().unwrap();
        ctl.cancel().unwrap();

        let second = ctl.start().unwrap();
        assert_ne!(first, second);
        assert_eq!(ctl.on_tick(first), None);
        assert_eq!(ctl.on_tick(second), Some(0));
    }

    #[test]
    fn ticks_after_stop_are_ignored() {
        let (mut ctl, _tx) = controller(true);
        let epoch = ctl.start().unwrap();
        ctl.record_reading(reading(1.0, 1.0));
        ctl.stop().unwrap();
        assert_eq!(ctl.on_tick(epoch), None);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_is_wall_clock_elapsed() {
        let (mut ctl, _tx) = controller(true);
        let epoch = ctl.start().unwrap();

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(ctl.on_tick(epoch), Some(2));

        ctl.record_reading(reading(5.0, 5.0));
        tokio::time::advance(Duration::from_secs(2)).await;
        let summary = ctl.stop().unwrap();
        assert_eq!(summary.duration_seconds, 4);

        let finalized = ctl.submit(metadata()).unwrap();
        assert_eq!(finalized.duration_seconds(), 4);
    }

    #[test]
    fn live_reading_event_carries_severity() {
        let (mut ctl, _tx) = controller(true);
        let mut events = ctl.subscribe();
        ctl.record_reading(reading(650.0, 80.0));

        assert_matches!(
            events.try_recv(),
            Ok(SessionEvent::LiveReading {
                severity_a: Severity::Danger,
                severity_b: Severity::Caution,
                recorded: false,
                ..
            })
        );
    }
}
