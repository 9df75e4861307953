//! `ridguard` - CLI for the Remote ID proximity guard
//!
//! This binary runs scanning sessions against replayed detection sources and
//! manages the persisted alert options, ignore lists and audit files.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use tracing::info;

use ridguard::alert::{AlertActuator, AlertRequest, TracingActuator};
use ridguard::cli::{
    Cli, Command, ConfigCommand, IgnoreCommand, LogsCommand, ScanCommand, SettingsCommand,
    SilenceCommand,
};
use ridguard::display::{AlwaysOnline, DisplayFrame, DisplayTicker};
use ridguard::privacy::hash_id;
use ridguard::source::{FixedPositionFeed, ReplaySource};
use ridguard::{
    init_logging, AlertEngine, AuditLog, Config, ReceiverPosition, Settings, SqlitePreferences,
    TelemetryPipeline,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Rings the terminal bell and prints a one-line alert.
#[derive(Debug, Default)]
struct BellActuator;

impl AlertActuator for BellActuator {
    fn actuate(&self, request: &AlertRequest) {
        eprintln!(
            "\x07[{}] Drone nearby: {} at {:.0} m",
            request.fired_at.with_timezone(&Local).format("%H:%M:%S"),
            request.hashed_id,
            request.distance_m
        );
        TracingActuator.actuate(request);
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Scan(scan_cmd) => handle_scan(&config, &scan_cmd).await,
        Command::Silence(silence_cmd) => handle_silence(&config, &silence_cmd),
        Command::Ignore(ignore_cmd) => handle_ignore(&config, ignore_cmd),
        Command::Settings(settings_cmd) => handle_settings(&config, settings_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Hash(hash_cmd) => {
            println!("{}", hash_id(Some(&hash_cmd.id)));
            Ok(())
        }
        Command::Logs(logs_cmd) => handle_logs(&config, &logs_cmd),
    }
}

fn open_settings(config: &Config) -> Result<Settings, ridguard::Error> {
    let prefs = SqlitePreferences::open(config.preferences_path())?;
    Ok(Settings::new(Arc::new(prefs)))
}

fn replay_files(config: &Config, cmd: &ScanCommand) -> Vec<(ridguard::SourceKind, PathBuf)> {
    let mut files = config.sources.replay_files();
    for (kind, path) in cmd.replay_overrides() {
        files.retain(|(k, _)| *k != kind);
        files.push((kind, path));
    }
    files.sort_by_key(|(kind, _)| *kind);
    files
}

async fn handle_scan(config: &Config, cmd: &ScanCommand) -> CliResult {
    let files = replay_files(config, cmd);
    if files.is_empty() {
        return Err("no detection sources: pass --bluetooth/--wifi-beacon/--wifi-nan \
                    or set [sources] in the configuration"
            .into());
    }

    let settings = open_settings(config)?;
    let removed = settings.prune_expired_ignores(chrono::Utc::now())?;
    if removed > 0 {
        info!(removed, "Pruned expired temporary ignores");
    }

    let actuator: Arc<dyn AlertActuator> = if cmd.no_bell {
        Arc::new(TracingActuator)
    } else {
        Arc::new(BellActuator)
    };
    let mut pipeline = TelemetryPipeline::new(
        settings.clone(),
        AlertEngine::new(settings.clone()),
        AuditLog::new(config.log_dir(), config.storage.log_prefix.clone(), settings),
        actuator,
    )
    .with_queue_capacity(config.scan.queue_capacity);

    for (kind, path) in files {
        pipeline = pipeline.with_source(Box::new(ReplaySource::new(
            kind,
            path,
            config.replay_pace(),
        )));
    }
    if let (Some(lat), Some(lon)) = (cmd.lat, cmd.lon) {
        pipeline = pipeline.with_position_feed(Box::new(FixedPositionFeed::new(
            ReceiverPosition::new(lat, lon, cmd.alt),
        )));
    }

    let pipeline = Arc::new(pipeline);
    pipeline.start().await;
    let ticker = DisplayTicker::spawn(
        Arc::clone(&pipeline),
        Arc::new(AlwaysOnline),
        config.tick_interval(),
        config.scan.radar_disc_radius,
    );
    let mut frames = ticker.subscribe();

    let deadline = async {
        match cmd.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = &mut deadline => break,
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    print_frame(&frame, cmd.json)?;
                }
            }
        }
    }

    ticker.cancel();
    pipeline.stop().await;
    Ok(())
}

fn print_frame(frame: &DisplayFrame, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string(frame)?);
        return Ok(());
    }
    let nearest = frame
        .snapshot
        .aircraft
        .iter()
        .filter_map(ridguard::AircraftState::distance_m)
        .filter(|d| *d > 0.0)
        .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))));
    let last_scan = frame
        .status
        .seconds_since_last_scan
        .map_or_else(|| "-".to_string(), |s| format!("{s}s ago"));
    println!(
        "[{}] {} | {} aircraft | nearest {} | last scan {}",
        frame.snapshot.taken_at.with_timezone(&Local).format("%H:%M:%S"),
        frame.status,
        frame.snapshot.aircraft.len(),
        nearest.map_or_else(|| "-".to_string(), |d| format!("{d:.1} m")),
        last_scan
    );
    Ok(())
}

fn handle_silence(config: &Config, cmd: &SilenceCommand) -> CliResult {
    let settings = open_settings(config)?;
    if cmd.clear {
        settings.clear_silence()?;
        println!("Alerts are no longer silenced.");
    } else {
        let minutes = cmd.minutes.unwrap_or(config.alert.silence_minutes);
        let until = settings.set_silence_for_minutes(minutes)?;
        println!(
            "Alerts silenced until {}.",
            until.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn handle_ignore(config: &Config, cmd: IgnoreCommand) -> CliResult {
    let settings = open_settings(config)?;
    match cmd {
        IgnoreCommand::Add { id } => {
            let mut list = settings.manual_ignore_ids();
            if list.add(&id) {
                settings.set_ignore_list(&list)?;
                println!("Ignoring {id}.");
            } else {
                println!("{id} is already ignored.");
            }
        }
        IgnoreCommand::Remove { id } => {
            let mut list = settings.manual_ignore_ids();
            if list.remove(&id) {
                settings.set_ignore_list(&list)?;
                println!("No longer ignoring {id}.");
            } else {
                println!("{id} was not on the ignore list.");
            }
        }
        IgnoreCommand::Temp { id, minutes } => {
            let minutes = minutes.unwrap_or(config.alert.temp_ignore_minutes);
            let until = settings.ignore_temporarily(&id, minutes)?;
            println!(
                "Ignoring {} until {}.",
                hash_id(Some(&id)),
                until.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        IgnoreCommand::List { json } => {
            let list = settings.manual_ignore_ids();
            if json {
                println!("{}", serde_json::to_string_pretty(list.entries())?);
            } else if list.is_empty() {
                println!("No ignored identities.");
            } else {
                for entry in list.entries() {
                    println!("{entry}");
                }
            }
        }
    }
    Ok(())
}

fn handle_settings(config: &Config, cmd: SettingsCommand) -> CliResult {
    let settings = open_settings(config)?;
    match cmd {
        SettingsCommand::Show { json } => {
            let snapshot = settings.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("Alert Settings");
                println!("==============");
                println!("  Radius (m):         {}", snapshot.radius_m);
                println!(
                    "  Altitude window:    {} [{}, {}] m",
                    if snapshot.altitude_window_enabled { "on" } else { "off" },
                    snapshot.altitude_min_m,
                    snapshot.altitude_max_m
                );
                println!("  Cooldown (s):       {}", snapshot.cooldown_s);
                println!("  Log retention (h):  {}", snapshot.log_retention_hours);
                println!("  Map overlay:        {}", snapshot.map_enabled);
                let silenced = settings.is_silenced_at(chrono::Utc::now());
                println!("  Silenced:           {silenced}");
                println!("  Ignored:            {}", snapshot.ignore_ids.len());
                println!("  Temporary ignores:  {}", snapshot.temporary_ignores);
            }
        }
        SettingsCommand::Set { key, value } => {
            settings.set_option(&key, &value)?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Preferences:        {}", config.preferences_path().display());
                println!("  Log directory:      {}", config.log_dir().display());
                println!("  Log prefix:         {}", config.storage.log_prefix);
                println!();
                println!("[Scan]");
                println!("  Tick (ms):          {}", config.scan.tick_interval_ms);
                println!("  Replay pace (ms):   {}", config.scan.replay_pace_ms);
                println!("  Queue capacity:     {}", config.scan.queue_capacity);
                println!();
                println!("[Alert]");
                println!("  Silence (min):      {}", config.alert.silence_minutes);
                println!("  Temp ignore (min):  {}", config.alert.temp_ignore_minutes);
                println!();
                println!("[Sources]");
                for (kind, path) in config.sources.replay_files() {
                    println!("  {:<19} {}", format!("{}:", kind.label()), path.display());
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn handle_logs(config: &Config, cmd: &LogsCommand) -> CliResult {
    let audit = AuditLog::new(
        config.log_dir(),
        config.storage.log_prefix.clone(),
        Settings::in_memory(),
    );
    let files = audit.files()?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else if files.is_empty() {
        println!("No audit files in {}", audit.dir().display());
    } else {
        for file in files {
            let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            println!("{:>10}  {}", size, file.display());
        }
    }
    Ok(())
}
