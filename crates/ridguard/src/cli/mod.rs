//! Command-line interface for ridguard.
//!
//! This module provides the CLI structure and command handlers for the
//! `ridguard` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, HashCommand, IgnoreCommand, LogsCommand, ScanCommand, SettingsCommand,
    SilenceCommand,
};

/// ridguard - Remote ID proximity guard
///
/// Watches drone Remote ID broadcasts, alerts when an aircraft comes within
/// the configured radius, and keeps an anonymized audit trail.
#[derive(Debug, Parser)]
#[command(name = "ridguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scanning session
    Scan(ScanCommand),

    /// Silence all alerts for a while
    Silence(SilenceCommand),

    /// Manage ignored identities
    #[command(subcommand)]
    Ignore(IgnoreCommand),

    /// View or modify alert options
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print the anonymized form of an identity
    Hash(HashCommand),

    /// List audit log files
    Logs(LogsCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Logs(LogsCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "ridguard");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_with_position() {
        let args = vec![
            "ridguard", "scan", "--bluetooth", "ble.jsonl", "--lat", "47.5", "--lon", "-122.3",
            "--alt", "12", "-d", "30",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Scan(scan) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(scan.bluetooth, Some(PathBuf::from("ble.jsonl")));
        assert_eq!(scan.lon, Some(-122.3));
        assert_eq!(scan.alt, 12.0);
        assert_eq!(scan.duration, Some(30));
    }

    #[test]
    fn test_parse_scan_lat_requires_lon() {
        let args = vec!["ridguard", "scan", "--lat", "47.5"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_parse_silence() {
        let cli = Cli::try_parse_from(vec!["ridguard", "silence", "-m", "10"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Silence(SilenceCommand {
                minutes: Some(10),
                clear: false
            })
        ));
        assert!(Cli::try_parse_from(vec!["ridguard", "silence", "-m", "5", "--clear"]).is_err());
    }

    #[test]
    fn test_parse_ignore_temp() {
        let cli = Cli::try_parse_from(vec!["ridguard", "ignore", "temp", "DRONE-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Ignore(IgnoreCommand::Temp { minutes: None, .. })
        ));
    }

    #[test]
    fn test_parse_settings_set_negative() {
        let args = vec!["ridguard", "settings", "set", "altitude_min_m", "-80"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Settings(SettingsCommand::Set { key, value }) = cli.command else {
            panic!("expected settings set");
        };
        assert_eq!(key, "altitude_min_m");
        assert_eq!(value, "-80");
    }

    #[test]
    fn test_parse_hash() {
        let cli = Cli::try_parse_from(vec!["ridguard", "hash", "ABC123"]).unwrap();
        assert!(matches!(cli.command, Command::Hash(HashCommand { ref id }) if id == "ABC123"));
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["ridguard", "-c", "/custom/config.toml", "logs"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(vec!["ridguard", "-vv", "logs"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(vec!["ridguard", "-q", "logs"]).unwrap();
        assert!(cli.quiet);
    }
}
