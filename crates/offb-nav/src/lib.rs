pub mod doctor;
pub mod geo;
pub mod mission;
pub mod vehicle;

use thiserror::Error;

/// Configuration faults that make a mission impossible to start.
#[derive(Debug, Error, PartialEq)]
pub enum MissionError {
    #[error("mission has no waypoints")]
    NoWaypoints,
    #[error("reach radius must be positive and finite (got {0})")]
    ReachRadius(f64),
    #[error("progress rate must be positive and finite (got {0})")]
    ProgressRate(f64),
    #[error("tick period must be non-zero")]
    TickPeriod,
    #[error("yaw must be finite (got {0})")]
    Yaw(f64),
    #[error("{what} coordinates invalid: lat={lat} lon={lon}")]
    Coordinates { what: &'static str, lat: f64, lon: f64 },
    #[error("waypoint {0} projects to a non-finite NED position")]
    NonFiniteWaypoint(usize),
}
