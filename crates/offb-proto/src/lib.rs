pub mod bus;
pub mod messages;
pub mod topic;

pub use bus::Bus;
pub use messages::{
    CommandKind, ControlMode, OffboardControlMode, Outbound, Telemetry, TrajectorySetpoint,
    Vec3, VehicleCommand,
};
pub use topic::Topic;
