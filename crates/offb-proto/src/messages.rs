use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use crate::topic::Topic;

/// Three components in the local North-East-Down frame, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub n: f64,
    pub e: f64,
    pub d: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { n: 0.0, e: 0.0, d: 0.0 };

    pub const fn new(n: f64, e: f64, d: f64) -> Self {
        Self { n, e, d }
    }

    pub fn norm(&self) -> f64 {
        (self.n * self.n + self.e * self.e + self.d * self.d).sqrt()
    }

    pub fn distance_to(&self, other: &Vec3) -> f64 {
        (*self - *other).norm()
    }

    /// `self * (1 - t) + other * t`, component-wise.
    pub fn lerp(&self, other: &Vec3, t: f64) -> Vec3 {
        *self * (1.0 - t) + *other * t
    }

    pub fn is_finite(&self) -> bool {
        self.n.is_finite() && self.e.is_finite() && self.d.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.n + rhs.n, self.e + rhs.e, self.d + rhs.d)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.n - rhs.n, self.e - rhs.e, self.d - rhs.d)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, k: f64) -> Vec3 {
        Vec3::new(self.n * k, self.e * k, self.d * k)
    }
}

/// Autopilot control mode as last reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlMode {
    /// Nothing reported yet.
    #[default]
    Unknown,
    Manual,
    Offboard,
    Other(u8),
}

impl ControlMode {
    pub const NAV_STATE_MANUAL: u8 = 0;
    pub const NAV_STATE_OFFBOARD: u8 = 14;

    pub const PX4_MAIN_MODE_MANUAL: u8 = 1;
    pub const PX4_MAIN_MODE_OFFBOARD: u8 = 6;

    /// Decode a PX4 vehicle_status navigation state.
    pub fn from_nav_state(nav_state: u8) -> Self {
        match nav_state {
            Self::NAV_STATE_MANUAL => ControlMode::Manual,
            Self::NAV_STATE_OFFBOARD => ControlMode::Offboard,
            other => ControlMode::Other(other),
        }
    }

    /// Decode the PX4 custom mode carried in a MAVLink HEARTBEAT.
    /// The main mode lives in bits 16..24.
    pub fn from_px4_custom_mode(custom_mode: u32) -> Self {
        let main_mode = ((custom_mode >> 16) & 0xff) as u8;
        match main_mode {
            Self::PX4_MAIN_MODE_MANUAL => ControlMode::Manual,
            Self::PX4_MAIN_MODE_OFFBOARD => ControlMode::Offboard,
            other => ControlMode::Other(other),
        }
    }

    pub fn is_offboard(&self) -> bool {
        matches!(self, ControlMode::Offboard)
    }
}

/// Which setpoint fields the autopilot should track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffboardControlMode {
    pub timestamp_us: u64,
    pub position: bool,
    pub velocity: bool,
    pub acceleration: bool,
    pub attitude: bool,
    pub body_rate: bool,
}

impl OffboardControlMode {
    pub fn position_only(timestamp_us: u64) -> Self {
        Self { timestamp_us, position: true, ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySetpoint {
    pub timestamp_us: u64,
    pub position: Vec3,
    /// Radians.
    pub yaw: f64,
}

/// DO_SET_MODE (176) and COMPONENT_ARM_DISARM (400).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    SetMode,
    ArmDisarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub timestamp_us: u64,
    pub command: CommandKind,
    pub param1: f32,
    pub param2: f32,
    pub target_system: u8,
    pub target_component: u8,
    pub source_system: u8,
    pub source_component: u8,
    pub from_external: bool,
}

impl VehicleCommand {
    pub fn new(command: CommandKind, param1: f32, param2: f32, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            command,
            param1,
            param2,
            target_system: 0,
            target_component: 1,
            source_system: 1,
            source_component: 1,
            from_external: true,
        }
    }
}

/// Messages this process produces for the autopilot.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ControlMode(OffboardControlMode),
    Setpoint(TrajectorySetpoint),
    Command(VehicleCommand),
}

impl Outbound {
    pub fn topic(&self) -> Topic {
        match self {
            Outbound::ControlMode(_) => Topic::OffboardControlMode,
            Outbound::Setpoint(_) => Topic::TrajectorySetpoint,
            Outbound::Command(_) => Topic::VehicleCommand,
        }
    }
}

/// Inbound telemetry from the autopilot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Status { mode: ControlMode },
    LocalPosition { position: Vec3, velocity: Vec3 },
}

impl Telemetry {
    pub fn topic(&self) -> Topic {
        match self {
            Telemetry::Status { .. } => Topic::VehicleStatus,
            Telemetry::LocalPosition { .. } => Topic::VehicleLocalPosition,
        }
    }
}
