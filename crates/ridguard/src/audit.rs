//! Privacy-preserving audit trail of observations.
//!
//! Each observation becomes one CSV row in a per-day file named
//! `<prefix>_<YYYY-MM-DD>.csv` (receiver local date). Identities are stored
//! only as [`hash_id`] digests. The log is advisory: every I/O failure is
//! reported through `tracing` and otherwise ignored.
//!
//! Retention runs on the write path. Before each append, files matching the
//! prefix whose modification time is older than `log_retention_hours` are
//! deleted.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::privacy::hash_id;
use crate::settings::Settings;
use crate::storage::lock;

/// Header row written at the top of every file.
pub const HEADER: &str = "timestamp,hashed_id,distance_m,alt_diff_m,speed_mps,heading_deg,last_seen_ms";

/// Default file name prefix.
pub const DEFAULT_PREFIX: &str = "ridguard";

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the observation was processed.
    pub timestamp: DateTime<Utc>,
    /// Anonymized identity.
    pub hashed_id: String,
    /// Distance from the receiver in meters.
    pub distance_m: Option<f64>,
    /// Altitude difference in meters.
    pub altitude_diff_m: Option<f64>,
    /// Horizontal speed in meters per second.
    pub speed_mps: Option<f64>,
    /// Heading in degrees.
    pub heading_deg: Option<f64>,
    /// Transmitter last-seen time, epoch milliseconds.
    pub last_seen_ms: i64,
}

impl LogEntry {
    /// Start an entry for `identity`, hashing it immediately.
    #[must_use]
    pub fn new(identity: Option<&str>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            hashed_id: hash_id(identity),
            distance_m: None,
            altitude_diff_m: None,
            speed_mps: None,
            heading_deg: None,
            last_seen_ms: 0,
        }
    }

    /// Render as a CSV row without the trailing newline.
    #[must_use]
    pub fn format_row(&self) -> String {
        let mut row = format!(
            "{},{},{:.1},",
            self.timestamp.timestamp_millis(),
            self.hashed_id,
            self.distance_m.unwrap_or(0.0)
        );
        if let Some(diff) = self.altitude_diff_m {
            let _ = write!(row, "{diff:.1}");
        }
        row.push(',');
        if let Some(speed) = self.speed_mps {
            let _ = write!(row, "{speed:.1}");
        }
        row.push(',');
        if let Some(heading) = self.heading_deg {
            let _ = write!(row, "{heading:.0}");
        }
        let _ = write!(row, ",{}", self.last_seen_ms);
        row
    }
}

/// Append-only daily CSV files with opportunistic retention cleanup.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    prefix: String,
    settings: Settings,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Create a log writing into `dir`. Nothing touches the disk until the
    /// first [`record`](Self::record).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, settings: Settings) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            settings,
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the log files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file an entry written at `timestamp` lands in.
    #[must_use]
    pub fn file_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let date = timestamp.with_timezone(&Local).format("%Y-%m-%d");
        self.dir.join(format!("{}_{date}.csv", self.prefix))
    }

    /// Append an entry, swallowing any failure.
    pub fn record(&self, entry: &LogEntry) {
        if let Err(e) = self.try_record(entry) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }

    /// Append an entry, reporting failures to the caller.
    ///
    /// Retention cleanup failures never fail the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the row cannot
    /// be appended.
    pub fn try_record(&self, entry: &LogEntry) -> Result<()> {
        let _guard = lock(&self.write_lock);

        fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })?;

        if let Err(e) = self.cleanup_at(SystemTime::now()) {
            debug!(error = %e, "Audit retention cleanup failed");
        }

        let path = self.file_for(entry.timestamp);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut buf = String::new();
        if file.metadata()?.len() == 0 {
            buf.push_str(HEADER);
            buf.push('\n');
        }
        buf.push_str(&entry.format_row());
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    fn retention(&self) -> Duration {
        let hours = u64::try_from(self.settings.log_retention_hours()).unwrap_or(0);
        Duration::from_secs(hours.saturating_mul(60 * 60))
    }

    fn is_log_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with('_') && rest.ends_with(".csv"))
    }

    /// Delete log files whose modification time is older than the retention
    /// window at `now`. Per-file failures are skipped.
    ///
    /// Returns the number of files deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn cleanup_at(&self, now: SystemTime) -> Result<usize> {
        let retention = self.retention();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !self.is_log_file(&path) {
                continue;
            }
            let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > retention {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => debug!(path = %path.display(), error = %e, "Failed to delete old log"),
                }
            }
        }
        if removed > 0 {
            info!("Deleted {} expired audit files", removed);
        }
        Ok(removed)
    }

    /// Current log files, sorted by name (and therefore by date).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| self.is_log_file(p))
            .collect();
        files.sort();
        Ok(files)
    }
}
