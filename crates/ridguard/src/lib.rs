//! `ridguard` - Remote ID proximity guard
//!
//! This library provides the core of a drone Remote ID monitor: it merges
//! reports from wireless detection sources, decides when an aircraft close
//! to the receiver should raise an alert, keeps an anonymized audit trail,
//! and projects tracked aircraft onto a radar display.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aircraft;
pub mod alert;
pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod geo;
pub mod logging;
pub mod pipeline;
pub mod privacy;
pub mod radar;
pub mod settings;
pub mod source;
pub mod storage;

pub use aircraft::{AircraftObservation, AircraftState, ReceiverPosition};
pub use alert::{AlertActuator, AlertEngine, Decision, SuppressReason};
pub use audit::{AuditLog, LogEntry};
pub use config::Config;
pub use display::{DisplayFrame, DisplayTicker};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use pipeline::{StatusSummary, TelemetryPipeline, TelemetrySnapshot};
pub use settings::Settings;
pub use source::{DetectionSource, SourceKind};
pub use storage::{PreferenceBackend, SqlitePreferences};
