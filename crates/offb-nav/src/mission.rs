//! Offboard mission state machine.
//!
//! Two phases: hold at the first waypoint, then fly the waypoint list in
//! order. Every tick produces a position setpoint interpolated between the
//! previous and the current target; transitions fire when the vehicle is
//! within the reach radius of the current target.
//!
//! Reaching a target early (before the interpolation has finished)
//! short-circuits the rest of that segment. The reach test is against the
//! target, not the interpolated point.

use std::time::Duration;

use offb_proto::{ControlMode, Vec3};
use tracing::{debug, info};

use crate::vehicle::VehicleState;
use crate::MissionError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionParams {
    /// Interpolation progress per second (θ/s).
    pub progress_rate: f64,
    pub reach_radius_m: f64,
    /// Mission-wide heading, radians.
    pub yaw_rad: f64,
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            progress_rate: 0.1,
            reach_radius_m: 0.1,
            yaw_rad: -std::f64::consts::FRAC_PI_2,
        }
    }
}

impl MissionParams {
    pub fn validate(&self) -> Result<(), MissionError> {
        if !(self.reach_radius_m.is_finite() && self.reach_radius_m > 0.0) {
            return Err(MissionError::ReachRadius(self.reach_radius_m));
        }
        if !(self.progress_rate.is_finite() && self.progress_rate > 0.0) {
            return Err(MissionError::ProgressRate(self.progress_rate));
        }
        if !self.yaw_rad.is_finite() {
            return Err(MissionError::Yaw(self.yaw_rad));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hold,
    WaypointFollow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionState {
    pub phase: Phase,
    pub entry: bool,
    pub index: usize,
    pub previous_target: Vec3,
    pub current_target: Vec3,
    /// Interpolation fraction, always within [0, 1].
    pub theta: f64,
    pub complete: bool,
}

impl MissionState {
    fn initial(first: Vec3) -> Self {
        Self {
            phase: Phase::Hold,
            entry: true,
            index: 0,
            previous_target: Vec3::ZERO,
            current_target: first,
            theta: 0.0,
            complete: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionEvent {
    HoldReached,
    WaypointReached { index: usize },
    MissionComplete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionOutput {
    pub setpoint: Vec3,
    pub yaw: f64,
    pub phase: Phase,
    pub index: usize,
    /// False when the tick was gated by the control mode.
    pub progressed: bool,
    pub event: Option<MissionEvent>,
}

/// One mission tick with no side effects: given the current state and
/// the latest vehicle state, returns the next state, the setpoint to emit
/// and the transition (if any) that fired.
///
/// With no vehicle state the entry baseline falls back to the NED origin
/// and the transition check is skipped; θ still advances.
pub fn advance(
    state: &MissionState,
    waypoints: &[Vec3],
    params: &MissionParams,
    vehicle: Option<&VehicleState>,
    dt: Duration,
) -> (MissionState, Vec3, Option<MissionEvent>) {
    let mut s = state.clone();

    if s.entry {
        s.entry = false;
        s.previous_target = vehicle.map(|v| v.position).unwrap_or(Vec3::ZERO);
        s.current_target = waypoints[s.index];
        s.theta = 0.0;
    }

    let setpoint = s.previous_target.lerp(&s.current_target, s.theta);
    s.theta = (s.theta + params.progress_rate * dt.as_secs_f64()).clamp(0.0, 1.0);

    if s.complete {
        return (s, setpoint, None);
    }

    let Some(v) = vehicle else {
        return (s, setpoint, None);
    };
    if s.current_target.distance_to(&v.position) > params.reach_radius_m {
        return (s, setpoint, None);
    }

    let event = match s.phase {
        Phase::Hold => {
            s.phase = Phase::WaypointFollow;
            s.entry = true;
            MissionEvent::HoldReached
        }
        Phase::WaypointFollow => {
            s.previous_target = s.current_target;
            s.theta = 0.0;
            if s.index + 1 >= waypoints.len() {
                s.complete = true;
                MissionEvent::MissionComplete
            } else {
                let reached = s.index;
                s.index += 1;
                s.current_target = waypoints[s.index];
                MissionEvent::WaypointReached { index: reached }
            }
        }
    };

    (s, setpoint, Some(event))
}

pub struct MissionEngine {
    waypoints: Vec<Vec3>,
    params: MissionParams,
    state: MissionState,
    last_setpoint: Vec3,
}

impl MissionEngine {
    pub fn new(waypoints: Vec<Vec3>, params: MissionParams) -> Result<Self, MissionError> {
        params.validate()?;
        let first = *waypoints.first().ok_or(MissionError::NoWaypoints)?;
        if let Some(i) = waypoints.iter().position(|w| !w.is_finite()) {
            return Err(MissionError::NonFiniteWaypoint(i));
        }
        Ok(Self {
            waypoints,
            params,
            state: MissionState::initial(first),
            last_setpoint: Vec3::ZERO,
        })
    }

    pub fn state(&self) -> &MissionState {
        &self.state
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    /// Run one control tick. Outside offboard mode the mission is frozen
    /// and the last setpoint is handed back so the stream never stalls.
    /// Before the mission has ever progressed that setpoint is the vehicle's
    /// own position, or the origin while no position is known.
    pub fn step(
        &mut self,
        mode: ControlMode,
        vehicle: Option<&VehicleState>,
        dt: Duration,
    ) -> MissionOutput {
        if !mode.is_offboard() {
            if self.state.phase == Phase::Hold && self.state.entry {
                if let Some(v) = vehicle {
                    self.last_setpoint = v.position;
                }
            }
            return self.output(false, None);
        }
        if vehicle.is_none() {
            debug!("mission: no local position yet, transition check deferred");
        }

        let (next, setpoint, event) =
            advance(&self.state, &self.waypoints, &self.params, vehicle, dt);
        self.state = next;
        self.last_setpoint = setpoint;

        match event {
            Some(MissionEvent::HoldReached) => {
                info!("mission: start point reached, entering waypoint mission")
            }
            Some(MissionEvent::WaypointReached { index }) => info!(
                "mission: waypoint {}/{} reached, next target {:?}",
                index + 1,
                self.waypoints.len(),
                self.state.current_target
            ),
            Some(MissionEvent::MissionComplete) => info!("mission: finished"),
            None => {}
        }

        self.output(true, event)
    }

    fn output(&self, progressed: bool, event: Option<MissionEvent>) -> MissionOutput {
        MissionOutput {
            setpoint: self.last_setpoint,
            yaw: self.params.yaw_rad,
            phase: self.state.phase,
            index: self.state.index,
            progressed,
            event,
        }
    }
}
