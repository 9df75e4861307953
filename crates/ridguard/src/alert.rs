//! Alert decisions.
//!
//! [`AlertEngine`] decides whether an observation should raise an alert. It
//! only reports an outcome; actuation is left to an [`AlertActuator`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::privacy::hash_id;
use crate::settings::Settings;
use crate::storage::lock;

/// Why an evaluation did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// No identity could be resolved.
    MissingIdentity,
    /// The global silence window is active.
    Silenced,
    /// The identity is on the permanent ignore list.
    Ignored,
    /// The identity is temporarily ignored.
    TemporarilyIgnored,
    /// Distance unknown, non-positive, or beyond the radius.
    OutOfRadius,
    /// Altitude difference outside the configured window.
    OutsideAltitudeWindow,
    /// An alert for this identity fired too recently.
    CoolingDown,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingIdentity => "missing identity",
            Self::Silenced => "silenced",
            Self::Ignored => "ignored",
            Self::TemporarilyIgnored => "temporarily ignored",
            Self::OutOfRadius => "out of radius",
            Self::OutsideAltitudeWindow => "outside altitude window",
            Self::CoolingDown => "cooling down",
        };
        f.write_str(text)
    }
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Raise an alert.
    Fire,
    /// Do not alert.
    Suppress(SuppressReason),
}

impl Decision {
    /// Whether this decision fires.
    #[must_use]
    pub fn is_fire(&self) -> bool {
        matches!(self, Self::Fire)
    }
}

/// A single actuation request handed to an [`AlertActuator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRequest {
    /// Resolved identity.
    pub identity: String,
    /// Anonymized identity.
    pub hashed_id: String,
    /// Distance from the receiver in meters.
    pub distance_m: f64,
    /// Altitude difference in meters, when known.
    pub altitude_diff_m: Option<f64>,
    /// When the decision fired.
    pub fired_at: DateTime<Utc>,
}

/// Performs the physical or visible alert.
pub trait AlertActuator: Send + Sync {
    /// Deliver one alert.
    fn actuate(&self, request: &AlertRequest);
}

/// Actuator that only emits a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActuator;

impl AlertActuator for TracingActuator {
    fn actuate(&self, request: &AlertRequest) {
        warn!(
            hashed_id = %request.hashed_id,
            distance_m = request.distance_m,
            altitude_diff_m = ?request.altitude_diff_m,
            "Drone nearby"
        );
    }
}

/// Suppression rules and per-identity cooldown.
#[derive(Debug)]
pub struct AlertEngine {
    settings: Settings,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertEngine {
    /// Create an engine reading its thresholds from `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// The settings this engine reads.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Evaluate at the current time.
    pub fn evaluate(
        &self,
        identity: Option<&str>,
        altitude_diff: Option<f64>,
        distance: Option<f64>,
    ) -> Decision {
        self.evaluate_at(Utc::now(), identity, altitude_diff, distance)
    }

    /// Evaluate the suppression rules in order; the first match wins.
    ///
    /// Only a firing evaluation records state (the cooldown timestamp).
    pub fn evaluate_at(
        &self,
        now: DateTime<Utc>,
        identity: Option<&str>,
        altitude_diff: Option<f64>,
        distance: Option<f64>,
    ) -> Decision {
        let decision = self.decide(now, identity, altitude_diff, distance);
        debug!(?decision, "Alert evaluated");
        decision
    }

    fn decide(
        &self,
        now: DateTime<Utc>,
        identity: Option<&str>,
        altitude_diff: Option<f64>,
        distance: Option<f64>,
    ) -> Decision {
        let Some(id) = identity.map(str::trim).filter(|id| !id.is_empty()) else {
            return Decision::Suppress(SuppressReason::MissingIdentity);
        };
        if self.settings.is_silenced_at(now) {
            return Decision::Suppress(SuppressReason::Silenced);
        }
        if self.settings.is_manually_ignored(id) {
            return Decision::Suppress(SuppressReason::Ignored);
        }
        if self.settings.is_temporarily_ignored_at(id, now) {
            return Decision::Suppress(SuppressReason::TemporarilyIgnored);
        }

        #[allow(clippy::cast_precision_loss)]
        let radius = self.settings.radius_m() as f64;
        match distance {
            Some(d) if d > 0.0 && d <= radius => {}
            _ => return Decision::Suppress(SuppressReason::OutOfRadius),
        }

        if self.settings.altitude_window_enabled() {
            if let Some(diff) = altitude_diff {
                #[allow(clippy::cast_precision_loss)]
                let (min, max) = (
                    self.settings.altitude_min_m() as f64,
                    self.settings.altitude_max_m() as f64,
                );
                if diff < min || diff > max {
                    return Decision::Suppress(SuppressReason::OutsideAltitudeWindow);
                }
            }
        }

        // None: too large to represent, never expires.
        let cooldown = Duration::try_seconds(self.settings.cooldown_s().max(0));
        let mut last_fired = lock(&self.last_fired);
        if let Some(last) = last_fired.get(id) {
            if cooldown.map_or(true, |c| now - *last < c) {
                return Decision::Suppress(SuppressReason::CoolingDown);
            }
        }
        last_fired.insert(id.to_string(), now);
        Decision::Fire
    }

    /// Build the actuation request for a fired decision.
    #[must_use]
    pub fn request(
        identity: &str,
        distance_m: f64,
        altitude_diff_m: Option<f64>,
        fired_at: DateTime<Utc>,
    ) -> AlertRequest {
        AlertRequest {
            identity: identity.to_string(),
            hashed_id: hash_id(Some(identity)),
            distance_m,
            altitude_diff_m,
            fired_at,
        }
    }

    /// Number of identities with a recorded alert.
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        lock(&self.last_fired).len()
    }
}
