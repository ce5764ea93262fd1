#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    OffboardControlMode,
    TrajectorySetpoint,
    VehicleCommand,
    VehicleStatus,
    VehicleLocalPosition,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::OffboardControlMode => "fmu/in/offboard_control_mode",
            Topic::TrajectorySetpoint => "fmu/in/trajectory_setpoint",
            Topic::VehicleCommand => "fmu/in/vehicle_command",
            Topic::VehicleStatus => "fmu/out/vehicle_status",
            Topic::VehicleLocalPosition => "fmu/out/vehicle_local_position",
        }
    }

    /// Fully qualified path, e.g. `/px4_1/fmu/in/trajectory_setpoint`.
    pub fn path(&self, namespace: &str) -> String {
        let ns = namespace.trim_matches('/');
        if ns.is_empty() {
            format!("/{}", self.name())
        } else {
            format!("/{}/{}", ns, self.name())
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self, Topic::VehicleStatus | Topic::VehicleLocalPosition)
    }
}
