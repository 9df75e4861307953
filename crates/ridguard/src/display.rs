//! Periodic display refresh.
//!
//! [`DisplayTicker`] runs on a tokio interval, refreshes derived aircraft
//! fields, takes a snapshot and publishes a [`DisplayFrame`] on a `watch`
//! channel. It never touches the filesystem.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::pipeline::{StatusSummary, TelemetryPipeline, TelemetrySnapshot};
use crate::radar::{self, RadarPoint};

/// Default refresh period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Network reachability, consulted before producing map markers.
pub trait Reachability: Send + Sync {
    /// Whether the network is reachable.
    fn is_online(&self) -> bool;
}

/// Reachability that always reports online.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Reachability for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Reachability that always reports offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl Reachability for Offline {
    fn is_online(&self) -> bool {
        false
    }
}

/// An aircraft position for the map overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    /// Session key of the aircraft.
    pub session_key: String,
    /// Resolved identity, if any.
    pub identity: Option<String>,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Everything a display needs for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    /// Aircraft and receiver copy.
    pub snapshot: TelemetrySnapshot,
    /// Radar disc projection.
    pub radar: Vec<RadarPoint>,
    /// Detector availability and scanning state.
    pub status: StatusSummary,
    /// Map overlay markers, present only when the map is enabled and the
    /// network is reachable.
    pub map_markers: Option<Vec<MapMarker>>,
}

impl DisplayFrame {
    /// Build a frame from the pipeline's current state.
    #[must_use]
    pub fn capture(
        pipeline: &TelemetryPipeline,
        reachability: &dyn Reachability,
        disc_radius: f64,
    ) -> Self {
        pipeline.refresh_derived();
        let snapshot = pipeline.snapshot();
        let settings = pipeline.settings();

        #[allow(clippy::cast_precision_loss)]
        let range = settings.radius_m() as f64;
        let radar = radar::project(
            &snapshot.aircraft,
            snapshot.receiver.as_ref(),
            range,
            disc_radius,
        );

        let map_markers = (settings.map_enabled() && reachability.is_online()).then(|| {
            snapshot
                .aircraft
                .iter()
                .filter_map(|state| {
                    let (latitude, longitude) = state.coordinates()?;
                    Some(MapMarker {
                        session_key: state.session_key.clone(),
                        identity: state.identity.clone(),
                        latitude,
                        longitude,
                    })
                })
                .collect()
        });

        Self {
            status: pipeline.status_summary(),
            snapshot,
            radar,
            map_markers,
        }
    }
}

/// Cancellable periodic publisher of [`DisplayFrame`]s.
#[derive(Debug)]
pub struct DisplayTicker {
    task: JoinHandle<()>,
    frames: watch::Receiver<Option<DisplayFrame>>,
}

impl DisplayTicker {
    /// Spawn the ticker. The first frame is published immediately.
    #[must_use]
    pub fn spawn(
        pipeline: Arc<TelemetryPipeline>,
        reachability: Arc<dyn Reachability>,
        period: Duration,
        disc_radius: f64,
    ) -> Self {
        let (tx, frames) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let frame = DisplayFrame::capture(&pipeline, reachability.as_ref(), disc_radius);
                if tx.send(Some(frame)).is_err() {
                    debug!("No display subscribers left");
                    break;
                }
            }
        });
        Self { task, frames }
    }

    /// A receiver for published frames.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayFrame>> {
        self.frames.clone()
    }

    /// The most recent frame, if one has been published.
    #[must_use]
    pub fn latest(&self) -> Option<DisplayFrame> {
        self.frames.borrow().clone()
    }

    /// Stop publishing.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for DisplayTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
