//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::source::SourceKind;

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Replay file of Bluetooth reports (overrides configuration)
    #[arg(long, value_name = "FILE")]
    pub bluetooth: Option<PathBuf>,

    /// Replay file of Wi-Fi beacon reports (overrides configuration)
    #[arg(long, value_name = "FILE")]
    pub wifi_beacon: Option<PathBuf>,

    /// Replay file of Wi-Fi NAN reports (overrides configuration)
    #[arg(long, value_name = "FILE")]
    pub wifi_nan: Option<PathBuf>,

    /// Receiver latitude in degrees
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Receiver longitude in degrees
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Receiver altitude in meters
    #[arg(long, requires = "lat", default_value = "0", allow_hyphen_values = true)]
    pub alt: f64,

    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Don't ring the terminal bell on alerts
    #[arg(long)]
    pub no_bell: bool,

    /// Print each display frame as a JSON line
    #[arg(short, long)]
    pub json: bool,
}

impl ScanCommand {
    /// Replay files given on the command line.
    #[must_use]
    pub fn replay_overrides(&self) -> Vec<(SourceKind, PathBuf)> {
        [
            (SourceKind::Bluetooth, &self.bluetooth),
            (SourceKind::WifiBeacon, &self.wifi_beacon),
            (SourceKind::WifiNan, &self.wifi_nan),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.clone().map(|p| (kind, p)))
        .collect()
    }
}

/// Silence command arguments.
#[derive(Debug, Args)]
pub struct SilenceCommand {
    /// Minutes to silence alerts for (defaults to the configured value)
    #[arg(short, long, conflicts_with = "clear")]
    pub minutes: Option<i64>,

    /// End an active silence window
    #[arg(long)]
    pub clear: bool,
}

/// Ignore list commands.
#[derive(Debug, Subcommand)]
pub enum IgnoreCommand {
    /// Permanently ignore an identity
    Add {
        /// The identity to ignore
        id: String,
    },

    /// Remove an identity from the permanent list
    Remove {
        /// The identity to remove
        id: String,
    },

    /// Ignore an identity for a limited time
    Temp {
        /// The identity to ignore
        id: String,

        /// Minutes to ignore for (defaults to the configured value)
        #[arg(short, long)]
        minutes: Option<i64>,
    },

    /// List permanently ignored identities
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Alert option commands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show every option
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Set an option
    Set {
        /// Option name (e.g. radius_m)
        key: String,

        /// New value
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Hash command arguments.
#[derive(Debug, Args)]
pub struct HashCommand {
    /// The identity to anonymize
    pub id: String,
}

/// Logs command arguments.
#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}
