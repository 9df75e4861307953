//! Detection source and position feed abstraction.
//!
//! Detection sources decode wireless broadcasts into [`AircraftObservation`]s;
//! the position feed reports where the receiver is. Both push
//! [`SourceEvent`]s into a single queue drained by the telemetry pipeline, so
//! every mutation of shared state funnels through one consumer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aircraft::{AircraftObservation, ReceiverPosition};

/// Errors that can occur while driving a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source failed to start.
    #[error("failed to start {kind} source: {message}")]
    StartFailed {
        /// Which source failed.
        kind: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The source failed to stop.
    #[error("failed to stop {kind} source: {message}")]
    StopFailed {
        /// Which source failed.
        kind: String,
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Create a start failure.
    #[must_use]
    pub fn start(kind: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::StartFailed {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Create a stop failure.
    #[must_use]
    pub fn stop(kind: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::StopFailed {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// The closed set of detection technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Bluetooth Legacy/Long Range advertising.
    Bluetooth,
    /// Wi-Fi beacon frames.
    WifiBeacon,
    /// Wi-Fi Neighbor Awareness Networking.
    WifiNan,
}

impl SourceKind {
    /// All kinds, in status-summary order.
    pub const ALL: [SourceKind; 3] = [Self::Bluetooth, Self::WifiBeacon, Self::WifiNan];

    /// Short label used in the status summary.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bluetooth => "BLE",
            Self::WifiBeacon => "Wi-Fi",
            Self::WifiNan => "NAN",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bluetooth => write!(f, "bluetooth"),
            Self::WifiBeacon => write!(f, "wifi_beacon"),
            Self::WifiNan => write!(f, "wifi_nan"),
        }
    }
}

/// An event pushed by a source into the pipeline queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// First report for a transmitter.
    NewAircraft(AircraftObservation),
    /// Subsequent report for a known transmitter.
    UpdatedAircraft(AircraftObservation),
    /// Receiver position fix.
    Position(ReceiverPosition),
}

/// Sending half of the pipeline queue handed to sources on start.
pub type EventSink = mpsc::Sender<SourceEvent>;

/// A wireless detection source.
///
/// Implementors deliver decoded reports through the sink given to
/// [`start`](DetectionSource::start) until [`stop`](DetectionSource::stop).
#[async_trait::async_trait]
pub trait DetectionSource: Send + Sync {
    /// The technology this source decodes.
    fn kind(&self) -> SourceKind;

    /// Name for logging.
    fn name(&self) -> String {
        self.kind().to_string()
    }

    /// Whether the underlying radio is available and switched on.
    fn is_available(&self) -> bool;

    /// Whether the source is currently running.
    fn is_running(&self) -> bool;

    /// Start delivering events.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be started.
    async fn start(&mut self, sink: EventSink) -> Result<()>;

    /// Stop delivering events.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to stop cleanly.
    fn stop(&mut self) -> Result<()>;
}

/// A feed of receiver positions.
#[async_trait::async_trait]
pub trait PositionFeed: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Whether the feed is currently running.
    fn is_running(&self) -> bool;

    /// Start pushing [`SourceEvent::Position`] events.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed cannot be started.
    async fn start(&mut self, sink: EventSink) -> Result<()>;

    /// Stop pushing positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed fails to stop cleanly.
    fn stop(&mut self) -> Result<()>;
}

/// A cloneable stop flag shared between a source and its task.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a cleared signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the task to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the signal.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    /// Emit as a new-aircraft event rather than an update.
    #[serde(default)]
    new: bool,
    #[serde(flatten)]
    observation: AircraftObservation,
}

/// Replays previously captured observations from a JSON-lines file.
///
/// Each line is an [`AircraftObservation`] with an optional `"new": true`
/// flag. Lines are emitted at a fixed pace; `received_at` is restamped at
/// emission time. Malformed lines are skipped.
#[derive(Debug)]
pub struct ReplaySource {
    kind: SourceKind,
    path: PathBuf,
    pace: Duration,
    stop_signal: StopSignal,
    task: Option<JoinHandle<()>>,
}

impl ReplaySource {
    /// Create a replay source for `kind` reading `path`.
    #[must_use]
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>, pace: Duration) -> Self {
        Self {
            kind,
            path: path.into(),
            pace,
            stop_signal: StopSignal::new(),
            task: None,
        }
    }

    fn parse_line(kind: SourceKind, line: &str) -> Option<SourceEvent> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        match serde_json::from_str::<ReplayRecord>(line) {
            Ok(mut record) => {
                record.observation.received_at = Utc::now();
                Some(if record.new {
                    SourceEvent::NewAircraft(record.observation)
                } else {
                    SourceEvent::UpdatedAircraft(record.observation)
                })
            }
            Err(e) => {
                debug!(source = %kind, error = %e, "Skipping malformed replay line");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl DetectionSource for ReplaySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.path.is_file()
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }

    async fn start(&mut self, sink: EventSink) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::start(self.kind, format!("{}: {e}", self.path.display())))?;

        self.stop_signal.reset();
        let stop_signal = self.stop_signal.clone();
        let kind = self.kind;
        let pace = self.pace;

        self.task = Some(tokio::spawn(async move {
            let mut sent = 0_u64;
            for line in text.lines() {
                if stop_signal.should_stop() {
                    break;
                }
                let Some(event) = ReplaySource::parse_line(kind, line) else {
                    continue;
                };
                if sink.send(event).await.is_err() {
                    break;
                }
                sent += 1;
                tokio::time::sleep(pace).await;
            }
            debug!(source = %kind, sent, "Replay finished");
        }));

        info!(source = %self.kind, path = %self.path.display(), "Replay source started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_signal.stop();
        if let Some(task) = self.task.take() {
            task.abort();
            info!(source = %self.kind, "Replay source stopped");
        }
        Ok(())
    }
}

/// Position feed reporting one fixed receiver position.
#[derive(Debug)]
pub struct FixedPositionFeed {
    position: ReceiverPosition,
    running: bool,
}

impl FixedPositionFeed {
    /// Create a feed that reports `position` once on start.
    #[must_use]
    pub fn new(position: ReceiverPosition) -> Self {
        Self {
            position,
            running: false,
        }
    }
}

#[async_trait::async_trait]
impl PositionFeed for FixedPositionFeed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn start(&mut self, sink: EventSink) -> Result<()> {
        if self.running {
            return Ok(());
        }
        let mut fix = self.position;
        fix.timestamp = Utc::now();
        sink.send(SourceEvent::Position(fix))
            .await
            .map_err(|_| SourceError::start(self.name(), "event queue closed"))?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            warn!("Fixed position feed stopped while not running");
        }
        self.running = false;
        Ok(())
    }
}
