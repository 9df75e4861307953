//! Telemetry ingest pipeline.
//!
//! The pipeline owns the live aircraft map for one scanning session. Sources
//! push events into a bounded queue; a single ingest task drains it and
//! routes each report through [`TelemetryPipeline::on_report`], which merges
//! the report, asks the alert engine for a decision, writes the audit row and
//! hands fired alerts to the actuator.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ridguard::alert::{AlertEngine, TracingActuator};
//! use ridguard::audit::AuditLog;
//! use ridguard::pipeline::TelemetryPipeline;
//! use ridguard::settings::Settings;
//!
//! let settings = Settings::in_memory();
//! let dir = std::env::temp_dir().join("ridguard-doc");
//! let pipeline = TelemetryPipeline::new(
//!     settings.clone(),
//!     AlertEngine::new(settings.clone()),
//!     AuditLog::new(dir, "ridguard", settings),
//!     Arc::new(TracingActuator),
//! );
//! assert!(!pipeline.is_scanning());
//! assert!(pipeline.snapshot().aircraft.is_empty());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aircraft::{AircraftObservation, AircraftState, ReceiverPosition};
use crate::alert::{AlertActuator, AlertEngine, Decision};
use crate::audit::{AuditLog, LogEntry};
use crate::geo::haversine_m;
use crate::settings::Settings;
use crate::source::{DetectionSource, PositionFeed, SourceEvent, SourceKind};
use crate::storage::lock;

/// Default capacity of the source event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Not scanning; initial and terminal state of a session.
    Idle,
    /// Every source has been asked to start.
    Active,
}

/// Owned copy of the pipeline state for display consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Tracked aircraft sorted by session key.
    pub aircraft: Vec<AircraftState>,
    /// Last known receiver position.
    pub receiver: Option<ReceiverPosition>,
    /// When the copy was taken.
    pub taken_at: DateTime<Utc>,
}

/// Detector availability and scanning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// Bluetooth detection available.
    pub bluetooth: bool,
    /// Wi-Fi beacon detection available.
    pub wifi_beacon: bool,
    /// Wi-Fi NAN detection available.
    pub wifi_nan: bool,
    /// Whether the pipeline is active.
    pub scanning: bool,
    /// Seconds since the last scan activity, if any happened.
    pub seconds_since_last_scan: Option<i64>,
}

impl StatusSummary {
    /// Availability flag for `kind`.
    #[must_use]
    pub fn is_available(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Bluetooth => self.bluetooth,
            SourceKind::WifiBeacon => self.wifi_beacon,
            SourceKind::WifiNan => self.wifi_nan,
        }
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in SourceKind::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" · ")?;
            }
            let state = if self.is_available(*kind) { "on" } else { "off" };
            write!(f, "{} {state}", kind.label())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Availability {
    bluetooth: AtomicBool,
    wifi_beacon: AtomicBool,
    wifi_nan: AtomicBool,
}

impl Availability {
    fn update(&self, sources: &[Box<dyn DetectionSource>]) {
        let available = |kind| sources.iter().any(|s| s.kind() == kind && s.is_available());
        self.bluetooth
            .store(available(SourceKind::Bluetooth), Ordering::SeqCst);
        self.wifi_beacon
            .store(available(SourceKind::WifiBeacon), Ordering::SeqCst);
        self.wifi_nan
            .store(available(SourceKind::WifiNan), Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Lifecycle {
    sources: Vec<Box<dyn DetectionSource>>,
    position_feed: Option<Box<dyn PositionFeed>>,
    ingest: Option<JoinHandle<()>>,
}

/// The session's telemetry state and the lifecycle of its sources.
pub struct TelemetryPipeline {
    settings: Settings,
    engine: AlertEngine,
    audit: AuditLog,
    actuator: Arc<dyn AlertActuator>,
    aircraft: Mutex<HashMap<String, AircraftState>>,
    receiver: RwLock<Option<ReceiverPosition>>,
    last_activity_ms: AtomicI64,
    scanning: AtomicBool,
    availability: Availability,
    queue_capacity: usize,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl fmt::Debug for TelemetryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPipeline")
            .field("scanning", &self.is_scanning())
            .field("aircraft", &lock(&self.aircraft).len())
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl TelemetryPipeline {
    /// Create an idle pipeline with no sources.
    #[must_use]
    pub fn new(
        settings: Settings,
        engine: AlertEngine,
        audit: AuditLog,
        actuator: Arc<dyn AlertActuator>,
    ) -> Self {
        Self {
            settings,
            engine,
            audit,
            actuator,
            aircraft: Mutex::new(HashMap::new()),
            receiver: RwLock::new(None),
            last_activity_ms: AtomicI64::new(0),
            scanning: AtomicBool::new(false),
            availability: Availability::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
        }
    }

    /// Register a detection source.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn DetectionSource>) -> Self {
        let lifecycle = self.lifecycle.get_mut();
        lifecycle.sources.push(source);
        self.availability.update(&lifecycle.sources);
        self
    }

    /// Register the receiver position feed.
    #[must_use]
    pub fn with_position_feed(mut self, feed: Box<dyn PositionFeed>) -> Self {
        self.lifecycle.get_mut().position_feed = Some(feed);
        self
    }

    /// Set the event queue capacity (minimum 1).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Settings shared with the engine and the audit log.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The alert engine.
    #[must_use]
    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Whether the pipeline is active.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        if self.is_scanning() {
            ScanState::Active
        } else {
            ScanState::Idle
        }
    }

    fn receiver(&self) -> Option<ReceiverPosition> {
        *self.receiver.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the receiver position.
    pub fn set_receiver_position(&self, position: ReceiverPosition) {
        debug!(
            lat = position.latitude,
            lon = position.longitude,
            alt = position.altitude,
            "Receiver position updated"
        );
        *self.receiver.write().unwrap_or_else(PoisonError::into_inner) = Some(position);
    }

    /// First report for a transmitter.
    pub fn on_new_aircraft(&self, observation: AircraftObservation) -> Decision {
        self.on_report(observation)
    }

    /// Subsequent report for a known transmitter.
    pub fn on_updated_aircraft(&self, observation: AircraftObservation) -> Decision {
        self.on_report(observation)
    }

    /// Process one report at the current time.
    pub fn on_report(&self, observation: AircraftObservation) -> Decision {
        self.on_report_at(Utc::now(), observation)
    }

    /// Merge a report, decide, log and actuate.
    ///
    /// The aircraft map lock is released before the engine, the log and the
    /// actuator run.
    pub fn on_report_at(&self, now: DateTime<Utc>, observation: AircraftObservation) -> Decision {
        let receiver = self.receiver();

        let (identity, location, last_seen_ms) = {
            let mut aircraft = lock(&self.aircraft);
            let state = aircraft
                .entry(observation.session_key().to_string())
                .and_modify(|state| state.merge(&observation))
                .or_insert_with(|| AircraftState::from_observation(&observation));
            fill_distance(state, receiver.as_ref());
            (
                state.identity.clone(),
                state.location.clone().unwrap_or_default(),
                state.last_seen_ms(),
            )
        };

        let altitude_diff = altitude_diff(location.altitude(), receiver.as_ref());
        let decision =
            self.engine
                .evaluate_at(now, identity.as_deref(), altitude_diff, location.distance_m);

        let mut entry = LogEntry::new(identity.as_deref(), now);
        entry.distance_m = location.distance_m;
        entry.altitude_diff_m = altitude_diff;
        entry.speed_mps = location.speed_horizontal;
        entry.heading_deg = location.direction;
        entry.last_seen_ms = last_seen_ms;
        self.audit.record(&entry);

        if let (Decision::Fire, Some(id)) = (decision, identity.as_deref()) {
            let request = AlertEngine::request(
                id,
                location.distance_m.unwrap_or_default(),
                altitude_diff,
                now,
            );
            self.actuator.actuate(&request);
        }

        self.last_activity_ms
            .store(now.timestamp_millis(), Ordering::SeqCst);
        decision
    }

    /// Owned copy of the aircraft map and receiver position.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mut aircraft: Vec<AircraftState> = lock(&self.aircraft).values().cloned().collect();
        aircraft.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        TelemetrySnapshot {
            aircraft,
            receiver: self.receiver(),
            taken_at: Utc::now(),
        }
    }

    /// Recompute shadow identities and fallback distances for every
    /// tracked aircraft.
    pub fn refresh_derived(&self) {
        let receiver = self.receiver();
        for state in lock(&self.aircraft).values_mut() {
            state.refresh_derived();
            fill_distance(state, receiver.as_ref());
        }
    }

    /// Detector availability and scanning state at the current time.
    #[must_use]
    pub fn status_summary(&self) -> StatusSummary {
        self.status_summary_at(Utc::now())
    }

    /// Detector availability and scanning state at `now`.
    #[must_use]
    pub fn status_summary_at(&self, now: DateTime<Utc>) -> StatusSummary {
        let last = self.last_activity_ms.load(Ordering::SeqCst);
        StatusSummary {
            bluetooth: self.availability.bluetooth.load(Ordering::SeqCst),
            wifi_beacon: self.availability.wifi_beacon.load(Ordering::SeqCst),
            wifi_nan: self.availability.wifi_nan.load(Ordering::SeqCst),
            scanning: self.is_scanning(),
            seconds_since_last_scan: (last > 0)
                .then(|| ((now.timestamp_millis() - last) / 1000).max(0)),
        }
    }

    /// Start the ingest task, every source and the position feed.
    ///
    /// Does nothing when already active. A source that fails to start is
    /// logged and skipped.
    pub async fn start(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.is_scanning() {
            debug!("Pipeline already active");
            return;
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        lifecycle.ingest = Some(tokio::spawn(ingest(Arc::clone(self), rx)));

        for source in &mut lifecycle.sources {
            if !source.is_available() {
                warn!(source = %source.name(), "Source reports unavailable, starting anyway");
            }
            if let Err(e) = source.start(tx.clone()).await {
                warn!(source = %source.name(), error = %e, "Failed to start source");
            }
        }
        if let Some(feed) = lifecycle.position_feed.as_mut() {
            if let Err(e) = feed.start(tx.clone()).await {
                warn!(feed = feed.name(), error = %e, "Failed to start position feed");
            }
        }
        self.availability.update(&lifecycle.sources);

        self.scanning.store(true, Ordering::SeqCst);
        info!(sources = lifecycle.sources.len(), "Scanning started");
    }

    /// Stop every source, the position feed and the ingest task, then clear
    /// the session's aircraft.
    ///
    /// Does nothing when already idle. Each source is stopped independently.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !self.is_scanning() && lifecycle.ingest.is_none() {
            debug!("Pipeline already idle");
            return;
        }

        for source in &mut lifecycle.sources {
            if let Err(e) = source.stop() {
                warn!(source = %source.name(), error = %e, "Failed to stop source");
            }
        }
        if let Some(feed) = lifecycle.position_feed.as_mut() {
            if let Err(e) = feed.stop() {
                warn!(feed = feed.name(), error = %e, "Failed to stop position feed");
            }
        }
        if let Some(task) = lifecycle.ingest.take() {
            task.abort();
        }
        self.availability.update(&lifecycle.sources);

        let cleared = {
            let mut aircraft = lock(&self.aircraft);
            let n = aircraft.len();
            aircraft.clear();
            n
        };
        self.scanning.store(false, Ordering::SeqCst);
        info!(cleared, "Scanning stopped");
    }
}

async fn ingest(pipeline: Arc<TelemetryPipeline>, mut rx: mpsc::Receiver<SourceEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SourceEvent::NewAircraft(observation) => {
                pipeline.on_new_aircraft(observation);
            }
            SourceEvent::UpdatedAircraft(observation) => {
                pipeline.on_updated_aircraft(observation);
            }
            SourceEvent::Position(position) => pipeline.set_receiver_position(position),
        }
    }
    debug!("Event queue closed");
}

/// Fill a missing distance from coordinates when the receiver is known.
fn fill_distance(state: &mut AircraftState, receiver: Option<&ReceiverPosition>) {
    let (Some(rx), Some((lat, lon))) = (receiver, state.coordinates()) else {
        return;
    };
    if let Some(location) = state.location.as_mut() {
        if location.distance_m.is_none() {
            location.distance_m = Some(haversine_m(rx.latitude, rx.longitude, lat, lon));
        }
    }
}

/// Aircraft altitude minus receiver altitude, when both are known.
#[must_use]
pub fn altitude_diff(altitude: Option<f64>, receiver: Option<&ReceiverPosition>) -> Option<f64> {
    Some(altitude? - receiver?.altitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::{ConnectionInfo, LocationReport, INVALID_ALTITUDE};
    use crate::alert::{AlertRequest, SuppressReason};
    use crate::source::{EventSink, FixedPositionFeed, SourceError};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingActuator {
        requests: Mutex<Vec<AlertRequest>>,
    }

    impl AlertActuator for RecordingActuator {
        fn actuate(&self, request: &AlertRequest) {
            lock(&self.requests).push(request.clone());
        }
    }

    #[derive(Debug, Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    struct MockSource {
        kind: SourceKind,
        running: bool,
        fail_stop: bool,
        counters: Arc<Counters>,
        sink: Option<EventSink>,
    }

    impl MockSource {
        fn new(kind: SourceKind, counters: Arc<Counters>) -> Self {
            Self {
                kind,
                running: false,
                fail_stop: false,
                counters,
                sink: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl DetectionSource for MockSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            true
        }

        fn is_running(&self) -> bool {
            self.running
        }

        async fn start(&mut self, sink: EventSink) -> crate::source::Result<()> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            self.sink = Some(sink);
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) -> crate::source::Result<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            self.running = false;
            self.sink = None;
            if self.fail_stop {
                return Err(SourceError::stop(self.kind, "radio busy"));
            }
            Ok(())
        }
    }

    fn create_test_pipeline(dir: &std::path::Path) -> (TelemetryPipeline, Arc<RecordingActuator>) {
        let settings = Settings::in_memory();
        let actuator = Arc::new(RecordingActuator::default());
        let pipeline = TelemetryPipeline::new(
            settings.clone(),
            AlertEngine::new(settings.clone()),
            AuditLog::new(dir, "ridguard", settings),
            Arc::clone(&actuator) as Arc<dyn AlertActuator>,
        );
        (pipeline, actuator)
    }

    fn located(key: &str, id: &str, distance: f64, altitude: f64) -> AircraftObservation {
        AircraftObservation::new(SourceKind::Bluetooth, key)
            .with_identification1(id)
            .with_location(LocationReport {
                distance_m: Some(distance),
                altitude_geodetic: altitude,
                ..LocationReport::default()
            })
    }

    #[test]
    fn test_end_to_end_fire_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, actuator) = create_test_pipeline(dir.path());
        pipeline.set_receiver_position(ReceiverPosition::new(0.0, 0.0, 100.0));

        let now = Utc::now();
        let decision = pipeline.on_report_at(now, located("AA:01", "DRONE-1", 50.0, 110.0));
        assert_eq!(decision, Decision::Fire);

        let requests = lock(&actuator.requests);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].altitude_diff_m, Some(10.0));

        let content = std::fs::read_to_string(pipeline.audit().file_for(now)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[2], "50.0");
        assert_eq!(fields[3], "10.0");
    }

    #[test]
    fn test_suppressed_report_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, actuator) = create_test_pipeline(dir.path());
        let now = Utc::now();
        let decision = pipeline.on_report_at(now, located("AA:02", "FAR", 5_000.0, 0.0));
        assert_eq!(decision, Decision::Suppress(SuppressReason::OutOfRadius));
        assert!(lock(&actuator.requests).is_empty());
        let content = std::fs::read_to_string(pipeline.audit().file_for(now)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_altitude_diff_unknown_without_receiver() {
        assert_eq!(altitude_diff(Some(120.0), None), None);
        let rx = ReceiverPosition::new(0.0, 0.0, 20.0);
        assert_eq!(altitude_diff(None, Some(&rx)), None);
        assert_eq!(altitude_diff(Some(120.0), Some(&rx)), Some(100.0));
    }

    #[test]
    fn test_pressure_altitude_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, actuator) = create_test_pipeline(dir.path());
        pipeline.set_receiver_position(ReceiverPosition::new(0.0, 0.0, 10.0));
        let obs = AircraftObservation::new(SourceKind::WifiBeacon, "AA:03")
            .with_identification1("P")
            .with_location(LocationReport {
                distance_m: Some(20.0),
                altitude_geodetic: INVALID_ALTITUDE,
                altitude_pressure: 40.0,
                ..LocationReport::default()
            });
        assert!(pipeline.on_report(obs).is_fire());
        assert_eq!(lock(&actuator.requests)[0].altitude_diff_m, Some(30.0));
    }

    #[test]
    fn test_merge_keeps_identity_across_location_reports() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        pipeline.on_new_aircraft(
            AircraftObservation::new(SourceKind::Bluetooth, "AA:04").with_identification1("ID-4"),
        );
        pipeline.on_updated_aircraft(located("AA:04", "", 30.0, 0.0));

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.aircraft.len(), 1);
        let state = &snapshot.aircraft[0];
        assert_eq!(state.identity.as_deref(), Some("ID-4"));
        assert_eq!(state.report_count, 2);
        assert_eq!(state.distance_m(), Some(30.0));
    }

    #[test]
    fn test_distance_fallback_from_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        pipeline.set_receiver_position(ReceiverPosition::new(0.0, 0.0, 0.0));
        let obs = AircraftObservation::new(SourceKind::Bluetooth, "AA:05")
            .with_identification1("GEO")
            .with_location(LocationReport {
                latitude: Some(0.001),
                longitude: Some(0.0),
                ..LocationReport::default()
            });
        assert!(pipeline.on_report(obs).is_fire());
        let distance = pipeline.snapshot().aircraft[0].distance_m().unwrap();
        assert!((distance - 111.19).abs() < 0.1, "got {distance}");
    }

    #[test]
    fn test_snapshot_is_sorted_copy() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        pipeline.on_report(located("B", "b", 10.0, 0.0));
        pipeline.on_report(located("A", "a", 10.0, 0.0));
        let mut snapshot = pipeline.snapshot();
        let keys: Vec<_> = snapshot.aircraft.iter().map(|a| a.session_key.clone()).collect();
        assert_eq!(keys, vec!["A", "B"]);

        snapshot.aircraft.clear();
        assert_eq!(pipeline.snapshot().aircraft.len(), 2);
    }

    #[test]
    fn test_refresh_derived_sets_shadow_id() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let obs = AircraftObservation::new(SourceKind::WifiNan, "AA:06")
            .with_identification2("SHADOW")
            .with_connection(ConnectionInfo {
                mac_address: "11:22".into(),
                last_seen_ms: 5,
                rssi: None,
            });
        pipeline.on_report(obs);
        pipeline.refresh_derived();
        let state = &pipeline.snapshot().aircraft[0];
        assert_eq!(state.shadow_id.as_deref(), Some("SHADOW"));
        assert_eq!(state.last_seen_ms(), 5);
    }

    #[test]
    fn test_status_summary_rendering() {
        let summary = StatusSummary {
            bluetooth: true,
            wifi_beacon: false,
            wifi_nan: true,
            scanning: false,
            seconds_since_last_scan: None,
        };
        assert_eq!(summary.to_string(), "BLE on · Wi-Fi off · NAN on");
    }

    #[test]
    fn test_status_summary_reflects_sources() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let counters = Arc::new(Counters::default());
        let pipeline =
            pipeline.with_source(Box::new(MockSource::new(SourceKind::WifiBeacon, counters)));
        let summary = pipeline.status_summary();
        assert!(!summary.bluetooth);
        assert!(summary.wifi_beacon);
        assert!(!summary.scanning);
        assert_eq!(summary.seconds_since_last_scan, None);
    }

    #[test]
    fn test_concurrent_reports_same_key() {
        const THREADS: u64 = 8;
        const REPORTS: u64 = 25;

        let dir = tempfile::tempdir().unwrap();
        let (pipeline, actuator) = create_test_pipeline(dir.path());
        pipeline.on_new_aircraft(
            AircraftObservation::new(SourceKind::Bluetooth, "AA:09").with_identification1("SHARED"),
        );

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let pipeline = &pipeline;
                scope.spawn(move || {
                    #[allow(clippy::cast_precision_loss)]
                    let coord = t as f64;
                    for _ in 0..REPORTS {
                        pipeline.set_receiver_position(ReceiverPosition::new(coord, coord, coord));
                        pipeline.on_updated_aircraft(located("AA:09", "", 10.0, 0.0));
                    }
                });
            }
        });

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.aircraft.len(), 1);
        let state = &snapshot.aircraft[0];
        assert_eq!(state.report_count, THREADS * REPORTS + 1);
        assert_eq!(state.identity.as_deref(), Some("SHARED"));

        let rx = snapshot.receiver.unwrap();
        assert!(rx.latitude == rx.longitude && rx.longitude == rx.altitude);
        assert_eq!(lock(&actuator.requests).len(), 1);
    }

    #[tokio::test]
    async fn test_last_scan_waits_for_first_report() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let pipeline = Arc::new(pipeline);
        pipeline.start().await;
        assert_eq!(pipeline.status_summary().seconds_since_last_scan, None);

        pipeline.on_report(located("AA:10", "Y", 500.0, 0.0));
        assert_eq!(pipeline.status_summary().seconds_since_last_scan, Some(0));
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let counters = Arc::new(Counters::default());
        let pipeline = Arc::new(
            pipeline
                .with_source(Box::new(MockSource::new(SourceKind::Bluetooth, Arc::clone(&counters))))
                .with_source(Box::new(MockSource::new(SourceKind::WifiNan, Arc::clone(&counters)))),
        );

        pipeline.stop().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);

        pipeline.start().await;
        pipeline.start().await;
        assert_eq!(pipeline.state(), ScanState::Active);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);

        pipeline.stop().await;
        pipeline.stop().await;
        assert_eq!(pipeline.state(), ScanState::Idle);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_failure_isolated() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let counters = Arc::new(Counters::default());
        let mut failing = MockSource::new(SourceKind::Bluetooth, Arc::clone(&counters));
        failing.fail_stop = true;
        let pipeline = Arc::new(
            pipeline
                .with_source(Box::new(failing))
                .with_source(Box::new(MockSource::new(SourceKind::WifiBeacon, Arc::clone(&counters)))),
        );

        pipeline.start().await;
        pipeline.stop().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 2);
        assert!(!pipeline.is_scanning());
    }

    #[tokio::test]
    async fn test_stop_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = create_test_pipeline(dir.path());
        let pipeline = Arc::new(pipeline);
        pipeline.start().await;
        pipeline.on_report(located("AA:07", "X", 10.0, 0.0));
        assert_eq!(pipeline.snapshot().aircraft.len(), 1);
        pipeline.stop().await;
        assert!(pipeline.snapshot().aircraft.is_empty());
    }

    #[tokio::test]
    async fn test_events_flow_through_queue() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, actuator) = create_test_pipeline(dir.path());
        let replay = dir.path().join("replay.jsonl");
        std::fs::write(
            &replay,
            concat!(
                r#"{"new":true,"source":"bluetooth","hardware_address":"AA:08","identification1":"Q1"}"#,
                "\n",
                r#"{"source":"bluetooth","hardware_address":"AA:08","location":{"distance_m":40.0}}"#,
                "\n",
            ),
        )
        .unwrap();
        let pipeline = Arc::new(
            pipeline
                .with_source(Box::new(crate::source::ReplaySource::new(
                    SourceKind::Bluetooth,
                    &replay,
                    Duration::from_millis(1),
                )))
                .with_position_feed(Box::new(FixedPositionFeed::new(ReceiverPosition::new(
                    1.0, 2.0, 3.0,
                )))),
        );

        pipeline.start().await;
        for _ in 0..200 {
            if !lock(&actuator.requests).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.receiver.map(|r| r.altitude), Some(3.0));
        assert_eq!(snapshot.aircraft[0].report_count, 2);
        assert_eq!(lock(&actuator.requests).len(), 1);
        assert!(pipeline.status_summary().seconds_since_last_scan.is_some());
        pipeline.stop().await;
    }
}
