//! Typed access to user-configurable options.
//!
//! Every getter is infallible: a missing or malformed stored value falls back
//! to the documented default. Integer options are read from a text
//! representation first and from a numeric one second; both encodings exist
//! in stores written by older releases and neither is treated as canonical.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::privacy::{hash_id, IgnoreList};
use crate::storage::{MemoryPreferences, PrefValue, PreferenceBackend};

/// Recognized option keys.
pub mod keys {
    /// Alert radius in meters.
    pub const RADIUS_M: &str = "radius_m";
    /// Whether the altitude window applies.
    pub const ALTITUDE_WINDOW_ENABLED: &str = "altitude_window_enabled";
    /// Lower altitude-difference bound in meters.
    pub const ALTITUDE_MIN_M: &str = "altitude_min_m";
    /// Upper altitude-difference bound in meters.
    pub const ALTITUDE_MAX_M: &str = "altitude_max_m";
    /// Per-identity alert cooldown in seconds.
    pub const COOLDOWN_S: &str = "cooldown_s";
    /// Audit log retention in hours.
    pub const LOG_RETENTION_HOURS: &str = "log_retention_hours";
    /// Whether the map overlay is enabled.
    pub const MAP_ENABLED: &str = "map_enabled";
    /// Global silence expiry, epoch milliseconds.
    pub const SILENCE_UNTIL: &str = "silence_until";
    /// Comma/newline-delimited permanent ignore list.
    pub const IGNORE_IDS: &str = "ignore_ids";
    /// Prefix of temporary-ignore expiry keys, followed by the hashed identity.
    pub const IGNORE_UNTIL_PREFIX: &str = "ignore_until_";
}

/// Default alert radius in meters.
pub const DEFAULT_RADIUS_M: i64 = 200;
/// Default lower altitude-difference bound in meters.
pub const DEFAULT_ALTITUDE_MIN_M: i64 = -50;
/// Default upper altitude-difference bound in meters.
pub const DEFAULT_ALTITUDE_MAX_M: i64 = 150;
/// Default cooldown in seconds.
pub const DEFAULT_COOLDOWN_S: i64 = 30;
/// Default audit log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: i64 = 48;
/// Largest cooldown accepted by [`Settings::set_option`] (one year).
pub const MAX_COOLDOWN_S: i64 = 365 * 24 * 60 * 60;
/// Largest retention accepted by [`Settings::set_option`] (ten years).
pub const MAX_LOG_RETENTION_HOURS: i64 = 10 * 365 * 24;

/// Logical type of a recognized option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Integer, stored as number or text.
    Int,
    /// Boolean.
    Bool,
    /// Epoch milliseconds.
    Timestamp,
    /// Delimited identity list.
    List,
}

/// Every recognized option with its kind.
pub const OPTIONS: &[(&str, OptionKind)] = &[
    (keys::RADIUS_M, OptionKind::Int),
    (keys::ALTITUDE_WINDOW_ENABLED, OptionKind::Bool),
    (keys::ALTITUDE_MIN_M, OptionKind::Int),
    (keys::ALTITUDE_MAX_M, OptionKind::Int),
    (keys::COOLDOWN_S, OptionKind::Int),
    (keys::LOG_RETENTION_HOURS, OptionKind::Int),
    (keys::MAP_ENABLED, OptionKind::Bool),
    (keys::SILENCE_UNTIL, OptionKind::Timestamp),
    (keys::IGNORE_IDS, OptionKind::List),
];

/// Point-in-time copy of every option, for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    /// Alert radius in meters.
    pub radius_m: i64,
    /// Whether the altitude window applies.
    pub altitude_window_enabled: bool,
    /// Lower altitude-difference bound.
    pub altitude_min_m: i64,
    /// Upper altitude-difference bound.
    pub altitude_max_m: i64,
    /// Cooldown in seconds.
    pub cooldown_s: i64,
    /// Audit retention in hours.
    pub log_retention_hours: i64,
    /// Map overlay flag.
    pub map_enabled: bool,
    /// Silence expiry, epoch ms.
    pub silence_until: i64,
    /// Permanent ignore list entries.
    pub ignore_ids: Vec<String>,
    /// Number of stored temporary ignores (expired ones included).
    pub temporary_ignores: usize,
}

/// Typed settings over a preference backend.
#[derive(Debug, Clone)]
pub struct Settings {
    backend: Arc<dyn PreferenceBackend>,
}

impl Settings {
    /// Wrap a preference backend.
    #[must_use]
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        Self { backend }
    }

    /// Settings over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferences::new()))
    }

    fn int(&self, key: &str, default: i64) -> i64 {
        match self.backend.get(key) {
            Some(PrefValue::Text(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                debug!(key, raw = %raw, "Unparseable integer option, using default");
                default
            }),
            Some(PrefValue::Int(value)) => value,
            Some(PrefValue::Bool(_)) | None => default,
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.backend.get(key) {
            Some(PrefValue::Bool(value)) => value,
            Some(PrefValue::Int(value)) => value != 0,
            Some(PrefValue::Text(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => default,
            },
            None => default,
        }
    }

    fn text(&self, key: &str) -> String {
        match self.backend.get(key) {
            Some(PrefValue::Text(raw)) => raw,
            _ => String::new(),
        }
    }

    /// Alert radius in meters.
    #[must_use]
    pub fn radius_m(&self) -> i64 {
        self.int(keys::RADIUS_M, DEFAULT_RADIUS_M)
    }

    /// Whether the altitude window applies.
    #[must_use]
    pub fn altitude_window_enabled(&self) -> bool {
        self.bool(keys::ALTITUDE_WINDOW_ENABLED, false)
    }

    /// Lower altitude-difference bound in meters.
    #[must_use]
    pub fn altitude_min_m(&self) -> i64 {
        self.int(keys::ALTITUDE_MIN_M, DEFAULT_ALTITUDE_MIN_M)
    }

    /// Upper altitude-difference bound in meters.
    #[must_use]
    pub fn altitude_max_m(&self) -> i64 {
        self.int(keys::ALTITUDE_MAX_M, DEFAULT_ALTITUDE_MAX_M)
    }

    /// Per-identity cooldown in seconds.
    #[must_use]
    pub fn cooldown_s(&self) -> i64 {
        self.int(keys::COOLDOWN_S, DEFAULT_COOLDOWN_S)
    }

    /// Audit log retention in hours.
    #[must_use]
    pub fn log_retention_hours(&self) -> i64 {
        self.int(keys::LOG_RETENTION_HOURS, DEFAULT_LOG_RETENTION_HOURS)
    }

    /// Whether the map overlay is enabled.
    #[must_use]
    pub fn map_enabled(&self) -> bool {
        self.bool(keys::MAP_ENABLED, false)
    }

    /// Silence expiry in epoch milliseconds, 0 when never set.
    #[must_use]
    pub fn silence_until_ms(&self) -> i64 {
        self.int(keys::SILENCE_UNTIL, 0)
    }

    /// Whether alerts are silenced at `now`.
    #[must_use]
    pub fn is_silenced_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() < self.silence_until_ms()
    }

    /// Silence all alerts for `minutes` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the expiry cannot be persisted.
    pub fn set_silence_for_minutes(&self, minutes: i64) -> Result<DateTime<Utc>> {
        self.set_silence_for_minutes_at(Utc::now(), minutes)
    }

    /// Silence all alerts for `minutes` from `now`; returns the expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if `minutes` puts the expiry out of range or the
    /// expiry cannot be persisted.
    pub fn set_silence_for_minutes_at(
        &self,
        now: DateTime<Utc>,
        minutes: i64,
    ) -> Result<DateTime<Utc>> {
        let until = expiry_after(now, minutes)?;
        self.backend
            .set(keys::SILENCE_UNTIL, PrefValue::Int(until.timestamp_millis()))?;
        info!(until = %until, "Alerts silenced");
        Ok(until)
    }

    /// End any active silence window.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn clear_silence(&self) -> Result<()> {
        self.backend.set(keys::SILENCE_UNTIL, PrefValue::Int(0))
    }

    /// Raw stored ignore list.
    #[must_use]
    pub fn ignore_ids_raw(&self) -> String {
        self.text(keys::IGNORE_IDS)
    }

    /// Parsed permanent ignore list.
    #[must_use]
    pub fn manual_ignore_ids(&self) -> IgnoreList {
        IgnoreList::parse(&self.ignore_ids_raw())
    }

    /// Whether `id` is on the permanent ignore list (case-insensitive).
    #[must_use]
    pub fn is_manually_ignored(&self, id: &str) -> bool {
        self.manual_ignore_ids().contains(id)
    }

    /// Replace the permanent ignore list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn set_ignore_list(&self, list: &IgnoreList) -> Result<()> {
        self.backend
            .set(keys::IGNORE_IDS, PrefValue::Text(list.to_raw()))
    }

    fn ignore_until_key(id: &str) -> String {
        format!("{}{}", keys::IGNORE_UNTIL_PREFIX, hash_id(Some(id)))
    }

    /// Suppress alerts for `id` for `minutes` from now.
    ///
    /// The expiry is stored under the hashed identity only.
    ///
    /// # Errors
    ///
    /// Returns an error if the expiry cannot be persisted.
    pub fn ignore_temporarily(&self, id: &str, minutes: i64) -> Result<DateTime<Utc>> {
        self.ignore_temporarily_at(id, Utc::now(), minutes)
    }

    /// Suppress alerts for `id` for `minutes` from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if `minutes` puts the expiry out of range or the
    /// expiry cannot be persisted.
    pub fn ignore_temporarily_at(
        &self,
        id: &str,
        now: DateTime<Utc>,
        minutes: i64,
    ) -> Result<DateTime<Utc>> {
        let until = expiry_after(now, minutes)?;
        self.backend.set(
            &Self::ignore_until_key(id),
            PrefValue::Int(until.timestamp_millis()),
        )?;
        Ok(until)
    }

    /// Whether `id` is temporarily ignored at `now`.
    #[must_use]
    pub fn is_temporarily_ignored_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.int(&Self::ignore_until_key(id), 0) > now.timestamp_millis()
    }

    /// Drop temporary-ignore entries that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal cannot be persisted.
    pub fn prune_expired_ignores(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for key in self.backend.keys_with_prefix(keys::IGNORE_UNTIL_PREFIX) {
            if self.int(&key, 0) <= now.timestamp_millis() && self.backend.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Set a recognized option from its textual form.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or values that don't match the
    /// option's type.
    pub fn set_option(&self, key: &str, raw: &str) -> Result<()> {
        let (_, kind) = OPTIONS
            .iter()
            .find(|(k, _)| *k == key)
            .ok_or_else(|| Error::unknown_setting(key))?;
        let invalid = || Error::ConfigValidation {
            message: format!("invalid value for {key}: {raw}"),
        };
        let value = match kind {
            OptionKind::Int | OptionKind::Timestamp => {
                let value: i64 = raw.trim().parse().map_err(|_| invalid())?;
                if !int_range(key).contains(&value) {
                    return Err(invalid());
                }
                PrefValue::Int(value)
            }
            OptionKind::Bool => PrefValue::Bool(raw.trim().parse().map_err(|_| invalid())?),
            OptionKind::List => PrefValue::Text(IgnoreList::parse(raw).to_raw()),
        };
        self.backend.set(key, value)
    }

    /// Copy of every option.
    #[must_use]
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            radius_m: self.radius_m(),
            altitude_window_enabled: self.altitude_window_enabled(),
            altitude_min_m: self.altitude_min_m(),
            altitude_max_m: self.altitude_max_m(),
            cooldown_s: self.cooldown_s(),
            log_retention_hours: self.log_retention_hours(),
            map_enabled: self.map_enabled(),
            silence_until: self.silence_until_ms(),
            ignore_ids: self.manual_ignore_ids().entries().to_vec(),
            temporary_ignores: self
                .backend
                .keys_with_prefix(keys::IGNORE_UNTIL_PREFIX)
                .len(),
        }
    }
}

/// Accepted range for an integer option set from text.
fn int_range(key: &str) -> RangeInclusive<i64> {
    match key {
        keys::COOLDOWN_S => 0..=MAX_COOLDOWN_S,
        keys::LOG_RETENTION_HOURS => 0..=MAX_LOG_RETENTION_HOURS,
        keys::RADIUS_M | keys::SILENCE_UNTIL => 0..=i64::MAX,
        _ => i64::MIN..=i64::MAX,
    }
}

fn expiry_after(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    Duration::try_minutes(minutes)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| Error::ConfigValidation {
            message: format!("{minutes} minutes is out of range"),
        })
}
