use std::time::Duration;

use crate::geo::GeoPoint;
use crate::mission::MissionParams;
use crate::MissionError;

pub fn check_mission(
    reference: &GeoPoint,
    waypoints: &[GeoPoint],
    params: &MissionParams,
    tick: Duration,
) -> Result<(), MissionError> {
    if !reference.is_valid() {
        return Err(MissionError::Coordinates { what: "reference", lat: reference.lat, lon: reference.lon });
    }
    if waypoints.is_empty() {
        return Err(MissionError::NoWaypoints);
    }
    if let Some(w) = waypoints.iter().find(|w| !w.is_valid()) {
        return Err(MissionError::Coordinates { what: "waypoint", lat: w.lat, lon: w.lon });
    }
    if tick.is_zero() {
        return Err(MissionError::TickPeriod);
    }
    params.validate()
}
