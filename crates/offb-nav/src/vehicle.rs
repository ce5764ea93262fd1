use offb_proto::{ControlMode, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Latest telemetry from the autopilot. The last value received is
/// authoritative until overwritten; there is no staleness tracking.
#[derive(Debug, Clone, Default)]
pub struct VehicleTracker {
    state: Option<VehicleState>,
    mode: ControlMode,
    position_updates: u64,
}

impl VehicleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_position(&mut self, position: Vec3, velocity: Vec3) {
        self.state = Some(VehicleState { position, velocity });
        self.position_updates = self.position_updates.wrapping_add(1);
    }

    pub fn update_control_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
    }

    pub fn current_state(&self) -> Option<&VehicleState> {
        self.state.as_ref()
    }

    pub fn current_control_mode(&self) -> ControlMode {
        self.mode
    }

    pub fn position_updates(&self) -> u64 {
        self.position_updates
    }
}
