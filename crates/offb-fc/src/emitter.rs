use anyhow::{Context, Result};
use offb_proto::{Bus, OffboardControlMode, Outbound, TrajectorySetpoint, Vec3};

/// Turns the mission output into the two messages the autopilot needs on
/// every tick: control-mode flags (position only) and the setpoint.
#[derive(Debug, Default)]
pub struct SetpointEmitter {
    sent: u64,
}

impl SetpointEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn messages(position: Vec3, yaw: f64, timestamp_us: u64) -> [Outbound; 2] {
        [
            Outbound::ControlMode(OffboardControlMode::position_only(timestamp_us)),
            Outbound::Setpoint(TrajectorySetpoint { timestamp_us, position, yaw }),
        ]
    }

    pub fn emit(&mut self, bus: &mut dyn Bus, position: Vec3, yaw: f64, timestamp_us: u64) -> Result<()> {
        let [mode, setpoint] = Self::messages(position, yaw, timestamp_us);
        bus.publish(mode).context("publish offboard control mode")?;
        bus.publish(setpoint).context("publish trajectory setpoint")?;
        self.sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use offb_proto::Topic;

    #[test]
    fn emits_flags_then_setpoint() {
        let mut bus = RecordingBus::new("px4_1");
        let mut e = SetpointEmitter::new();
        e.emit(&mut bus, Vec3::new(1.0, 2.0, -3.0), -1.5, 777).unwrap();

        let sent = bus.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "/px4_1/fmu/in/offboard_control_mode");
        match &sent[0].1 {
            Outbound::ControlMode(m) => {
                assert!(m.position);
                assert!(!m.velocity && !m.acceleration && !m.attitude && !m.body_rate);
                assert_eq!(m.timestamp_us, 777);
            }
            other => panic!("unexpected {:?}", other),
        }
        let sp = bus.last_setpoint().unwrap();
        assert_eq!(sp.position, Vec3::new(1.0, 2.0, -3.0));
        assert_eq!(sp.yaw, -1.5);
        assert_eq!(sp.timestamp_us, 777);
        assert_eq!(bus.count(Topic::TrajectorySetpoint), 1);
        assert_eq!(e.sent(), 1);
    }
}
