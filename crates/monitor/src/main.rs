//! `emission-monitor` -- bench console for exhaust emission tests.
//!
//! Connects to the telemetry bridge over Socket.IO, runs timed test
//! sessions from operator commands on stdin and stores finished tests
//! through the records API.
//!
//! # Environment variables
//!
//! | Variable              | Required | Default                     | Description                |
//! |-----------------------|----------|-----------------------------|----------------------------|
//! | `TELEMETRY_URL`       | no       | `http://localhost:3001`     | Telemetry Socket.IO server |
//! | `API_BASE_URL`        | no       | `http://localhost:3001/api` | Records API base URL       |
//! | `RECONNECT_DELAY_MS`  | no       | `1000`                      | Wait before each reconnect |
//! | `RECONNECT_ATTEMPTS`  | no       | `5`                         | Reconnect budget           |
//! | `THRESHOLD_*`         | no       | see `MonitorConfig`         | Threshold overrides        |
//! | `RUST_LOG`            | no       | `emission_monitor=info,...` | Log filter                 |

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emission_monitor::{observer, Console, MonitorConfig};
use emission_report::ReportClient;
use emission_session::{SessionController, SessionRuntime};
use emission_telemetry::ConnectionManager;

const DEFAULT_LOG_FILTER: &str =
    "emission_monitor=info,emission_session=info,emission_telemetry=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        telemetry_url = %config.telemetry_url,
        api_base_url = %config.api_base_url,
        thresholds_version = config.thresholds.version,
        "Starting emission-monitor",
    );

    let (manager, telemetry_rx) = ConnectionManager::connect(config.telemetry());
    let manager = Arc::new(manager);
    let report = ReportClient::new(config.api_base_url.clone());

    let controller =
        SessionController::new(config.thresholds.clone(), manager.subscribe_connectivity());
    let (runtime, handle) = SessionRuntime::new(
        controller,
        Arc::new(report.clone()),
        Arc::clone(&manager),
        telemetry_rx,
    );
    let observer = observer::spawn(runtime.subscribe());
    let runtime_task = tokio::spawn(runtime.run());

    let mut console = Console::new(handle.clone(), report, config.thresholds.clone());
    tokio::select! {
        _ = console.run(spawn_stdin_reader()) => {
            tracing::info!("Console closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down");
        }
    }

    manager.close().await;
    handle.shutdown().await;
    if let Err(e) = runtime_task.await {
        tracing::error!(error = %e, "Session runtime task failed");
    }
    observer.abort();
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
