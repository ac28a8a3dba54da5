//! Fixed-interval, bounded reconnection.
//!
//! After the link drops (or the first connect fails) the transport retries
//! up to [`ReconnectPolicy::max_attempts`] times, waiting
//! [`ReconnectPolicy::delay`] before each attempt, then gives up.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{self, TelemetryLink};

/// Tunable parameters for reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before each reconnect attempt.
    pub delay: Duration,
    /// Reconnect attempts made before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once
    /// the attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt <= self.max_attempts).then_some(self.delay)
    }
}

/// Result of a reconnect cycle.
pub enum ReconnectOutcome {
    Connected(TelemetryLink),
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Retry `url` under `policy` until connected, exhausted or cancelled.
pub async fn reconnect_loop(
    url: &str,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            let attempts = attempt - 1;
            tracing::error!(url = %url, attempts, "Giving up on telemetry reconnect");
            return ReconnectOutcome::Exhausted { attempts };
        };

        // Wait before the attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        tracing::info!(
            url = %url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to telemetry source",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(url = %url, "Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = client::open(url) => {
                match result {
                    Ok(link) => {
                        tracing::info!(url = %url, attempt, "Reconnected to telemetry source");
                        return ReconnectOutcome::Connected(link);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnect attempt {attempt} failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_device_link_settings() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn delay_is_fixed_until_budget_is_spent() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=5 {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(1)));
        }
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn zero_attempts_never_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), None);
    }

    #[tokio::test]
    async fn cancellation_token_stops_reconnect() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let policy = ReconnectPolicy::default();
        let outcome = reconnect_loop("http://127.0.0.1:9", &policy, &cancel).await;
        assert!(matches!(outcome, ReconnectOutcome::Cancelled));
    }

    #[tokio::test]
    async fn exhausted_after_max_attempts() {
        let cancel = CancellationToken::new();
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(5),
            max_attempts: 2,
        };

        // Bind then release a port so nothing is listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let outcome = reconnect_loop(&url, &policy, &cancel).await;
        assert!(matches!(outcome, ReconnectOutcome::Exhausted { attempts: 2 }));
    }
}
