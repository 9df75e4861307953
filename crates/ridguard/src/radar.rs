//! Polar projection of tracked aircraft onto a radar disc.
//!
//! Points are relative to the disc centre in screen convention: `x` grows to
//! the right, `y` grows downward, north is up.

use serde::Serialize;

use crate::aircraft::{AircraftState, ReceiverPosition};
use crate::geo::initial_bearing_deg;

/// Smallest range the disc can represent, in meters.
pub const MIN_RANGE_M: f64 = 50.0;

/// One aircraft placed on the disc.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarPoint {
    /// Session key of the projected aircraft.
    pub session_key: String,
    /// Horizontal offset from the centre.
    pub x: f64,
    /// Vertical offset from the centre, positive downward.
    pub y: f64,
    /// Radial position in `[0, 1]`; aircraft beyond range sit at 1.
    pub normalized: f64,
}

/// Project `aircraft` onto a disc of `disc_radius` covering `max_range_m`.
///
/// Aircraft with an unknown or non-positive distance are left out. Without
/// a receiver position (or aircraft coordinates) the bearing is taken as 0.
#[must_use]
pub fn project(
    aircraft: &[AircraftState],
    receiver: Option<&ReceiverPosition>,
    max_range_m: f64,
    disc_radius: f64,
) -> Vec<RadarPoint> {
    let range = max_range_m.max(MIN_RANGE_M);
    aircraft
        .iter()
        .filter_map(|state| {
            let distance = state.distance_m().filter(|d| *d > 0.0)?;
            let normalized = (distance / range).min(1.0);
            let bearing = match (receiver, state.coordinates()) {
                (Some(rx), Some((lat, lon))) => {
                    initial_bearing_deg(rx.latitude, rx.longitude, lat, lon)
                }
                _ => 0.0,
            };
            let angle = (bearing - 90.0).to_radians();
            let r = normalized * disc_radius;
            Some(RadarPoint {
                session_key: state.session_key.clone(),
                x: angle.cos() * r,
                y: angle.sin() * r,
                normalized,
            })
        })
        .collect()
}
