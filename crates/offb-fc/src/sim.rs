//! Kinematic stand-in for the autopilot, for dry runs and tests.
//!
//! The simulated vehicle accepts the same messages as the real link: a
//! DO_SET_MODE to the offboard main mode switches it to offboard (once it
//! has seen setpoints), an arm command arms it, and setpoints pull it along
//! at a bounded speed.

use std::time::Duration;

use anyhow::Result;
use offb_proto::{Bus, CommandKind, ControlMode, Outbound, Telemetry, Vec3};
use serde::Deserialize;
use tracing::info;

use crate::control::Controller;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_max_speed")]
    pub max_speed_mps: f64,
    /// Ticks between the mode request and the vehicle reporting offboard.
    #[serde(default)]
    pub offboard_delay_ticks: u32,
    #[serde(default = "default_duration")]
    pub duration_s: f64,
    #[serde(default)]
    pub start: Vec3,
}

fn default_max_speed() -> f64 {
    12.0
}

fn default_duration() -> f64 {
    300.0
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: default_max_speed(),
            offboard_delay_ticks: 0,
            duration_s: default_duration(),
            start: Vec3::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct SimVehicle {
    cfg: SimConfig,
    position: Vec3,
    velocity: Vec3,
    target: Option<Vec3>,
    mode: ControlMode,
    armed: bool,
    pending_offboard: Option<u32>,
    setpoints: u64,
}

impl SimVehicle {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            position: cfg.start,
            velocity: Vec3::ZERO,
            target: None,
            mode: ControlMode::Manual,
            armed: false,
            pending_offboard: None,
            setpoints: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Force a mode change, as a pilot flipping a switch would.
    pub fn set_mode(&mut self, mode: ControlMode) {
        self.pending_offboard = None;
        self.mode = mode;
    }

    /// Advance the vehicle by `dt` and report what the autopilot would
    /// publish: status first, then local position.
    pub fn step(&mut self, dt: Duration) -> [Telemetry; 2] {
        if let Some(n) = self.pending_offboard {
            if n == 0 {
                self.pending_offboard = None;
                self.mode = ControlMode::Offboard;
            } else {
                self.pending_offboard = Some(n - 1);
            }
        }

        let before = self.position;
        match self.target {
            Some(target) if self.mode.is_offboard() && self.armed => {
                let to_go = target - self.position;
                let dist = to_go.norm();
                let reach = self.cfg.max_speed_mps * dt.as_secs_f64();
                self.position = if dist <= reach { target } else { self.position + to_go * (reach / dist) };
            }
            _ => {}
        }
        let secs = dt.as_secs_f64();
        self.velocity = if secs > 0.0 { (self.position - before) * (1.0 / secs) } else { Vec3::ZERO };

        [
            Telemetry::Status { mode: self.mode },
            Telemetry::LocalPosition { position: self.position, velocity: self.velocity },
        ]
    }
}

impl Bus for SimVehicle {
    fn publish(&mut self, msg: Outbound) -> Result<()> {
        match msg {
            Outbound::ControlMode(_) => {}
            Outbound::Setpoint(sp) => {
                self.target = Some(sp.position);
                self.setpoints += 1;
            }
            Outbound::Command(cmd) => match cmd.command {
                CommandKind::SetMode => {
                    let main_mode = cmd.param2.round() as u8;
                    if main_mode == ControlMode::PX4_MAIN_MODE_OFFBOARD {
                        // offboard is refused until a setpoint stream exists
                        if self.setpoints > 0 {
                            self.pending_offboard = Some(self.cfg.offboard_delay_ticks);
                        }
                    } else {
                        self.mode = ControlMode::Other(main_mode);
                    }
                }
                CommandKind::ArmDisarm => self.armed = cmd.param1 >= 0.5,
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimReport {
    pub ticks: u64,
    pub complete: bool,
    pub final_index: usize,
    pub final_position: Vec3,
    pub elapsed: Duration,
}

/// Fly the controller against the simulated vehicle in virtual time until
/// the mission completes or `duration_s` runs out.
pub fn fly(controller: &mut Controller, vehicle: &mut SimVehicle) -> SimReport {
    let tick = controller.tick_period();
    let max_ticks = (vehicle.cfg.duration_s / tick.as_secs_f64()).ceil() as u64;
    let mut last_index = 0;

    while controller.ticks() < max_ticks && !controller.engine().is_complete() {
        for t in vehicle.step(tick) {
            controller.on_telemetry(t);
        }
        let ts = controller.ticks() * tick.as_micros() as u64;
        let out = controller.on_tick(vehicle, ts);
        if out.index != last_index {
            info!("sim: t={:.1}s heading for waypoint {} at {:?}", ts as f64 / 1e6, out.index, vehicle.position());
            last_index = out.index;
        }
    }

    SimReport {
        ticks: controller.ticks(),
        complete: controller.engine().is_complete(),
        final_index: controller.engine().state().index,
        final_position: vehicle.position(),
        elapsed: tick * controller.ticks() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offb_proto::VehicleCommand;

    const DT: Duration = Duration::from_millis(20);

    #[test]
    fn needs_setpoints_before_offboard() {
        let mut v = SimVehicle::new(SimConfig::default());
        v.publish(Outbound::Command(VehicleCommand::new(CommandKind::SetMode, 1.0, 6.0, 0))).unwrap();
        v.step(DT);
        assert_eq!(v.mode(), ControlMode::Manual);
    }

    #[test]
    fn moves_toward_setpoint_at_bounded_speed() {
        let mut v = SimVehicle::new(SimConfig { max_speed_mps: 10.0, ..Default::default() });
        let sp = offb_proto::TrajectorySetpoint { timestamp_us: 0, position: Vec3::new(100.0, 0.0, 0.0), yaw: 0.0 };
        v.publish(Outbound::Setpoint(sp)).unwrap();
        v.publish(Outbound::Command(VehicleCommand::new(CommandKind::SetMode, 1.0, 6.0, 0))).unwrap();
        v.publish(Outbound::Command(VehicleCommand::new(CommandKind::ArmDisarm, 1.0, 0.0, 0))).unwrap();
        assert!(v.is_armed());

        let [status, pos] = v.step(DT);
        assert_eq!(status, Telemetry::Status { mode: ControlMode::Offboard });
        match pos {
            Telemetry::LocalPosition { position, velocity } => {
                assert!((position.n - 0.2).abs() < 1e-9);
                assert!((velocity.n - 10.0).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }

        for _ in 0..1_000 {
            v.step(DT);
        }
        assert_eq!(v.position(), Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn stays_put_when_not_offboard() {
        let mut v = SimVehicle::new(SimConfig::default());
        let sp = offb_proto::TrajectorySetpoint { timestamp_us: 0, position: Vec3::new(5.0, 0.0, 0.0), yaw: 0.0 };
        v.publish(Outbound::Setpoint(sp)).unwrap();
        v.publish(Outbound::Command(VehicleCommand::new(CommandKind::ArmDisarm, 1.0, 0.0, 0))).unwrap();
        v.step(DT);
        assert_eq!(v.position(), Vec3::ZERO);
    }
}
