//! Core aircraft types for ridguard.
//!
//! This module defines the decoded reports delivered by detection sources,
//! the accumulated per-aircraft state tracked during a scanning session, and
//! the receiver position pushed by the position feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceKind;

/// Altitude sentinel used by Remote ID decoders for "unknown".
pub const INVALID_ALTITUDE: f64 = -1000.0;

fn invalid_altitude() -> f64 {
    INVALID_ALTITUDE
}

/// Map a raw altitude to `None` when it carries the sentinel.
#[must_use]
pub fn known_altitude(raw: f64) -> Option<f64> {
    if !raw.is_finite() || (raw - INVALID_ALTITUDE).abs() < f64::EPSILON {
        None
    } else {
        Some(raw)
    }
}

/// Link-layer metadata attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Address the broadcast was received from.
    pub mac_address: String,

    /// When the transmitter was last heard, epoch milliseconds.
    #[serde(default)]
    pub last_seen_ms: i64,

    /// Received signal strength, if the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

/// Position and motion part of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    /// Latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Geodetic altitude in meters, [`INVALID_ALTITUDE`] when unknown.
    #[serde(default = "invalid_altitude")]
    pub altitude_geodetic: f64,

    /// Pressure altitude in meters, [`INVALID_ALTITUDE`] when unknown.
    #[serde(default = "invalid_altitude")]
    pub altitude_pressure: f64,

    /// Horizontal distance from the receiver in meters.
    #[serde(default)]
    pub distance_m: Option<f64>,

    /// Horizontal speed in meters per second.
    #[serde(default)]
    pub speed_horizontal: Option<f64>,

    /// Track direction in degrees clockwise from north.
    #[serde(default)]
    pub direction: Option<f64>,
}

impl Default for LocationReport {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            altitude_geodetic: INVALID_ALTITUDE,
            altitude_pressure: INVALID_ALTITUDE,
            distance_m: None,
            speed_horizontal: None,
            direction: None,
        }
    }
}

impl LocationReport {
    /// Best available altitude: geodetic, else pressure.
    #[must_use]
    pub fn altitude(&self) -> Option<f64> {
        known_altitude(self.altitude_geodetic).or_else(|| known_altitude(self.altitude_pressure))
    }

    /// Latitude/longitude pair when both are present.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// One decoded report from a detection source.
///
/// Remote ID transmitters send Basic ID and Location as separate messages,
/// so a single observation usually carries only some of these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftObservation {
    /// Which detection technology produced this report.
    pub source: SourceKind,

    /// Raw hardware address of the transmitter; doubles as the session key.
    pub hardware_address: String,

    /// UAS ID from the first Basic ID slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification1: Option<String>,

    /// UAS ID from the second Basic ID slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification2: Option<String>,

    /// Link-layer metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionInfo>,

    /// Position and motion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationReport>,

    /// When the report reached the core.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl AircraftObservation {
    /// Create an observation carrying nothing but its hardware address.
    #[must_use]
    pub fn new(source: SourceKind, hardware_address: impl Into<String>) -> Self {
        Self {
            source,
            hardware_address: hardware_address.into(),
            identification1: None,
            identification2: None,
            connection: None,
            location: None,
            received_at: Utc::now(),
        }
    }

    /// Set the first Basic ID slot.
    #[must_use]
    pub fn with_identification1(mut self, id: impl Into<String>) -> Self {
        self.identification1 = Some(id.into());
        self
    }

    /// Set the second Basic ID slot.
    #[must_use]
    pub fn with_identification2(mut self, id: impl Into<String>) -> Self {
        self.identification2 = Some(id.into());
        self
    }

    /// Attach connection metadata.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Attach a location report.
    #[must_use]
    pub fn with_location(mut self, location: LocationReport) -> Self {
        self.location = Some(location);
        self
    }

    /// The session key used to track this transmitter.
    #[must_use]
    pub fn session_key(&self) -> &str {
        &self.hardware_address
    }

    /// Resolve the user-facing identity of this report.
    ///
    /// Order: first Basic ID, second Basic ID, connection address, hardware
    /// address. Empty candidates are skipped, so the result is never an
    /// empty string.
    #[must_use]
    pub fn primary_id(&self) -> Option<String> {
        resolve_identity(&[
            self.identification1.as_deref(),
            self.identification2.as_deref(),
            self.connection.as_ref().map(|c| c.mac_address.as_str()),
            Some(self.hardware_address.as_str()),
        ])
    }
}

/// Pick the first non-empty candidate.
fn resolve_identity(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// Accumulated state of one aircraft within a scanning session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftState {
    /// Session key (hardware address).
    pub session_key: String,

    /// Source that most recently reported this aircraft.
    pub source: SourceKind,

    /// Last reported first Basic ID slot.
    pub identification1: Option<String>,

    /// Last reported second Basic ID slot.
    pub identification2: Option<String>,

    /// Last reported connection metadata.
    pub connection: Option<ConnectionInfo>,

    /// Last reported location.
    pub location: Option<LocationReport>,

    /// Last non-empty UAS ID ever seen for this key.
    pub shadow_id: Option<String>,

    /// Resolved identity, refreshed after every merge.
    pub identity: Option<String>,

    /// When the first report for this key arrived.
    pub first_seen: DateTime<Utc>,

    /// When the latest report for this key arrived.
    pub last_seen: DateTime<Utc>,

    /// Number of reports merged into this state.
    pub report_count: u64,
}

impl AircraftState {
    /// Start tracking from a first observation.
    #[must_use]
    pub fn from_observation(obs: &AircraftObservation) -> Self {
        let mut state = Self {
            session_key: obs.session_key().to_string(),
            source: obs.source,
            identification1: obs.identification1.clone(),
            identification2: obs.identification2.clone(),
            connection: obs.connection.clone(),
            location: obs.location.clone(),
            shadow_id: None,
            identity: None,
            first_seen: obs.received_at,
            last_seen: obs.received_at,
            report_count: 1,
        };
        state.refresh_derived();
        state
    }

    /// Merge a newer observation: present fields replace, absent ones keep
    /// their previous values.
    pub fn merge(&mut self, obs: &AircraftObservation) {
        self.source = obs.source;
        if obs.identification1.is_some() {
            self.identification1.clone_from(&obs.identification1);
        }
        if obs.identification2.is_some() {
            self.identification2.clone_from(&obs.identification2);
        }
        if obs.connection.is_some() {
            self.connection.clone_from(&obs.connection);
        }
        if obs.location.is_some() {
            self.location.clone_from(&obs.location);
        }
        if obs.received_at > self.last_seen {
            self.last_seen = obs.received_at;
        }
        self.report_count += 1;
        self.refresh_derived();
    }

    /// Recompute the shadow and resolved identity.
    ///
    /// The shadow id stands in for the Basic ID slots when they go blank, and
    /// is preferred over link-layer addresses.
    pub fn refresh_derived(&mut self) {
        if let Some(id) = resolve_identity(&[
            self.identification1.as_deref(),
            self.identification2.as_deref(),
        ]) {
            self.shadow_id = Some(id);
        }
        self.identity = resolve_identity(&[
            self.identification1.as_deref(),
            self.identification2.as_deref(),
            self.shadow_id.as_deref(),
            self.connection.as_ref().map(|c| c.mac_address.as_str()),
            Some(self.session_key.as_str()),
        ]);
    }

    /// Reported distance from the receiver, if any.
    #[must_use]
    pub fn distance_m(&self) -> Option<f64> {
        self.location.as_ref().and_then(|l| l.distance_m)
    }

    /// Reported coordinates, if any.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.location.as_ref().and_then(LocationReport::coordinates)
    }

    /// Link-layer last-seen time, 0 when unknown.
    #[must_use]
    pub fn last_seen_ms(&self) -> i64 {
        self.connection.as_ref().map_or(0, |c| c.last_seen_ms)
    }
}

/// Position of the receiver, pushed by the position feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverPosition {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl ReceiverPosition {
    /// Create a position fixed now.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(mac: &str) -> ConnectionInfo {
        ConnectionInfo {
            mac_address: mac.to_string(),
            last_seen_ms: 1_700_000_000_000,
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_primary_id_prefers_first_slot() {
        let obs = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_identification1("ID-ONE")
            .with_identification2("ID-TWO");
        assert_eq!(obs.primary_id().as_deref(), Some("ID-ONE"));
    }

    #[test]
    fn test_primary_id_uses_second_slot_before_address() {
        let obs = AircraftObservation::new(SourceKind::WifiBeacon, "AA:BB")
            .with_identification2("ID-TWO")
            .with_connection(connection("11:22"));
        assert_eq!(obs.primary_id().as_deref(), Some("ID-TWO"));
    }

    #[test]
    fn test_primary_id_skips_empty_slots() {
        let obs = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_identification1("")
            .with_connection(connection("11:22"));
        assert_eq!(obs.primary_id().as_deref(), Some("11:22"));
    }

    #[test]
    fn test_primary_id_falls_back_to_hardware_address() {
        let obs = AircraftObservation::new(SourceKind::WifiNan, "AA:BB");
        assert_eq!(obs.primary_id().as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_primary_id_never_empty() {
        let obs = AircraftObservation::new(SourceKind::WifiNan, "");
        assert_eq!(obs.primary_id(), None);
    }

    #[test]
    fn test_known_altitude() {
        assert_eq!(known_altitude(INVALID_ALTITUDE), None);
        assert_eq!(known_altitude(f64::NAN), None);
        assert_eq!(known_altitude(120.5), Some(120.5));
    }

    #[test]
    fn test_location_altitude_falls_back_to_pressure() {
        let loc = LocationReport {
            altitude_pressure: 80.0,
            ..LocationReport::default()
        };
        assert_eq!(loc.altitude(), Some(80.0));

        let loc = LocationReport {
            altitude_geodetic: 95.0,
            altitude_pressure: 80.0,
            ..LocationReport::default()
        };
        assert_eq!(loc.altitude(), Some(95.0));

        assert_eq!(LocationReport::default().altitude(), None);
    }

    #[test]
    fn test_merge_keeps_identity_across_location_only_reports() {
        let first = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_identification1("DRONE-1");
        let mut state = AircraftState::from_observation(&first);

        let location_only = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_location(LocationReport {
                distance_m: Some(42.0),
                ..LocationReport::default()
            });
        state.merge(&location_only);

        assert_eq!(state.identity.as_deref(), Some("DRONE-1"));
        assert_eq!(state.distance_m(), Some(42.0));
        assert_eq!(state.report_count, 2);
    }

    #[test]
    fn test_shadow_id_survives_blank_basic_id() {
        let first = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_identification1("DRONE-1");
        let mut state = AircraftState::from_observation(&first);

        let blank = AircraftObservation::new(SourceKind::Bluetooth, "AA:BB")
            .with_identification1("")
            .with_connection(connection("11:22"));
        state.merge(&blank);

        assert_eq!(state.shadow_id.as_deref(), Some("DRONE-1"));
        assert_eq!(state.identity.as_deref(), Some("DRONE-1"));
    }

    #[test]
    fn test_last_seen_ms_defaults_to_zero() {
        let state =
            AircraftState::from_observation(&AircraftObservation::new(SourceKind::WifiNan, "x"));
        assert_eq!(state.last_seen_ms(), 0);
    }

    #[test]
    fn test_observation_deserialize_minimal() {
        let json = r#"{"source":"bluetooth","hardware_address":"AA:BB","location":{"distance_m":50.0}}"#;
        let obs: AircraftObservation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.source, SourceKind::Bluetooth);
        let loc = obs.location.unwrap();
        assert_eq!(loc.distance_m, Some(50.0));
        assert_eq!(loc.altitude_geodetic, INVALID_ALTITUDE);
    }
}
