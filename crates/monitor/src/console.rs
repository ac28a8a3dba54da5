//! Line-oriented operator console.
//!
//! Each input line is one command. Session commands go through the
//! [`SessionHandle`]; history, PDF, delete and recommendation commands go
//! straight to the records API.

use std::path::PathBuf;

use tokio::sync::mpsc;

use emission_core::aggregate::format_duration;
use emission_core::metadata::TestMetadata;
use emission_core::session::FinalizedSession;
use emission_core::thresholds::{Channel, ThresholdConfig};
use emission_core::types::TestId;
use emission_report::ReportClient;
use emission_session::{CommandError, SessionHandle, SessionSnapshot};

pub const HELP: &str = "\
Commands:
  start                   begin a test session (device must be connected)
  stop                    end the running session
  submit <json>           save the stopped session; the object needs nama,
                          merk_motor, nama_motor, cc_motor and nomor_wa, e.g.
                          submit {\"nama\":\"Budi\",\"merk_motor\":\"Honda\",...}
  cancel                  discard the stopped session
  retry                   resend the last session that failed to save
  status                  show session state and the live reading
  history                 list stored tests
  pdf <id> <path>         download the PDF report of a test
  delete <id>             delete a stored test
  recommend <id>          show maintenance recommendations for a test
  help                    show this text
  quit                    exit";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Submit(TestMetadata),
    Cancel,
    Retry,
    Status,
    History,
    Pdf { id: TestId, path: PathBuf },
    Delete(TestId),
    Recommend(TestId),
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Unknown command {0:?}, type `help` for a list")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid test id {0:?}")]
    InvalidId(String),

    #[error("Invalid metadata JSON: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => ConsoleCommand::Start,
        "stop" => ConsoleCommand::Stop,
        "cancel" => ConsoleCommand::Cancel,
        "retry" => ConsoleCommand::Retry,
        "status" => ConsoleCommand::Status,
        "history" => ConsoleCommand::History,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "submit" => {
            if rest.is_empty() {
                return Err(ConsoleError::Usage("submit <json>"));
            }
            ConsoleCommand::Submit(serde_json::from_str(rest)?)
        }
        "pdf" => {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let (Some(id), Some(path)) = (parts.next().filter(|s| !s.is_empty()), parts.next())
            else {
                return Err(ConsoleError::Usage("pdf <id> <path>"));
            };
            let path = path.trim();
            if path.is_empty() {
                return Err(ConsoleError::Usage("pdf <id> <path>"));
            }
            ConsoleCommand::Pdf {
                id: parse_id(id)?,
                path: PathBuf::from(path),
            }
        }
        "delete" => ConsoleCommand::Delete(parse_id(required(rest, "delete <id>")?)?),
        "recommend" => ConsoleCommand::Recommend(parse_id(required(rest, "recommend <id>")?)?),
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, ConsoleError> {
    if rest.is_empty() {
        Err(ConsoleError::Usage(usage))
    } else {
        Ok(rest)
    }
}

fn parse_id(raw: &str) -> Result<TestId, ConsoleError> {
    raw.trim()
        .parse()
        .map_err(|_| ConsoleError::InvalidId(raw.to_string()))
}

/// Render a session snapshot as a short multi-line report.
pub fn render_status(snapshot: &SessionSnapshot) -> String {
    let mut out = format!(
        "state: {}  duration: {}  recorded: {}\ndevice: {}  link: {}",
        snapshot.state,
        format_duration(snapshot.duration_seconds),
        snapshot.recorded,
        if snapshot.connectivity.connected { "connected" } else { "disconnected" },
        if snapshot.connectivity.link_up { "up" } else { "down" },
    );

    match (snapshot.live, snapshot.live_severity) {
        (Some(live), Some((sev_a, sev_b))) => {
            out.push_str(&format!(
                "\n{}: {:.1} ppm ({})  {}: {:.1} ppm ({})",
                Channel::A.sensor_name(),
                live.channel_a,
                sev_a,
                Channel::B.sensor_name(),
                live.channel_b,
                sev_b,
            ));
        }
        _ => out.push_str("\nno live reading yet"),
    }
    out
}

/// Interactive front end over the session runtime and the records API.
pub struct Console {
    session: SessionHandle,
    report: ReportClient,
    thresholds: ThresholdConfig,
    /// Last finalized session the records API failed to store.
    pending: Option<FinalizedSession>,
}

impl Console {
    pub fn new(session: SessionHandle, report: ReportClient, thresholds: ThresholdConfig) -> Self {
        Self {
            session,
            report,
            thresholds,
            pending: None,
        }
    }

    /// Process lines until `quit` or until the input closes.
    pub async fn run(&mut self, mut lines: mpsc::UnboundedReceiver<String>) {
        println!("{HELP}");

        while let Some(line) = lines.recv().await {
            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(command)) => self.execute(command).await,
                Err(e) => println!("{e}"),
            }
        }
    }

    async fn execute(&mut self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Start => match self.session.start().await {
                Ok(epoch) => println!("Session {epoch} started"),
                Err(e) => println!("Cannot start: {e}"),
            },
            ConsoleCommand::Stop => match self.session.stop().await {
                Ok(summary) => println!(
                    "Stopped after {} with {} readings; submit metadata or cancel",
                    format_duration(summary.duration_seconds),
                    summary.sample_count,
                ),
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Submit(metadata) => match self.session.submit(metadata).await {
                Ok(receipt) => {
                    println!("Saved as test {}", receipt.id);
                    if let Some(rec) = receipt.recommendation {
                        println!("Recommendation: {rec}");
                    }
                }
                Err(CommandError::Persistence { source, session }) => {
                    println!("Save failed: {source}; type `retry` to resend");
                    self.pending = Some(*session);
                }
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Cancel => match self.session.cancel().await {
                Ok(()) => println!("Session discarded"),
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Retry => self.retry().await,
            ConsoleCommand::Status => match self.session.snapshot().await {
                Ok(snapshot) => println!("{}", render_status(&snapshot)),
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::History => self.history().await,
            ConsoleCommand::Pdf { id, path } => match self.report.fetch_pdf(id).await {
                Ok(bytes) => match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => println!("Wrote {} bytes to {}", bytes.len(), path.display()),
                    Err(e) => println!("Cannot write {}: {e}", path.display()),
                },
                Err(e) => println!("PDF download failed: {e}"),
            },
            ConsoleCommand::Delete(id) => match self.report.delete_test(id).await {
                Ok(()) => println!("Deleted test {id}"),
                Err(e) => println!("Delete failed: {e}"),
            },
            ConsoleCommand::Recommend(id) => match self.report.recommendations(id).await {
                Ok(rec) => println!(
                    "{}",
                    serde_json::to_string_pretty(&rec).unwrap_or_else(|_| rec.to_string())
                ),
                Err(e) => println!("Recommendation lookup failed: {e}"),
            },
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => {}
        }
    }

    async fn retry(&mut self) {
        let Some(session) = self.pending.take() else {
            println!("Nothing to retry");
            return;
        };

        match self.report.submit(&session).await {
            Ok(receipt) => {
                tracing::info!(
                    session_id = %session.session_id,
                    test_id = receipt.id,
                    "Session saved on retry",
                );
                println!("Saved as test {}", receipt.id);
            }
            Err(e) => {
                println!("Save failed again: {e}");
                self.pending = Some(session);
            }
        }
    }

    async fn history(&self) {
        let records = match self.report.list_tests().await {
            Ok(records) => records,
            Err(e) => {
                println!("Cannot load history: {e}");
                return;
            }
        };

        if records.is_empty() {
            println!("No stored tests");
            return;
        }

        for record in records {
            let sev_a = self.thresholds.classify(record.mean_a, Channel::A);
            let sev_b = self.thresholds.classify(record.mean_b, Channel::B);
            println!(
                "#{:<4} {:<16} {} {} ({} cc)  {} {:.1} ({})  {} {:.1} ({})  {}",
                record.id,
                record.metadata.owner_name,
                record.metadata.vehicle_brand,
                record.metadata.vehicle_model,
                record.metadata.engine_cc,
                Channel::A.sensor_name(),
                record.mean_a,
                sev_a,
                Channel::B.sensor_name(),
                record.mean_b,
                sev_b,
                format_duration(record.duration_seconds),
            );
        }
    }
}
