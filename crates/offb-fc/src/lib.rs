pub mod bus;
pub mod control;
pub mod emitter;
pub mod mav;
pub mod sequencer;
pub mod sim;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// Any mavlink connection string, e.g. `udpin:0.0.0.0:14540` or
    /// `serial:/dev/ttyACM0:921600`.
    pub url: String,

    /// Topic namespace, used in logs. Example: "px4_1".
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// MAVLink ids we use (companion side)
    #[serde(default = "default_sys_id")]
    pub sys_id: u8,
    #[serde(default = "default_comp_id")]
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for PX4.
    #[serde(default = "one")]
    pub target_sys: u8,
    #[serde(default = "one")]
    pub target_comp: u8,

    /// Companion heartbeat rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,
}

fn default_namespace() -> String {
    "px4_1".into()
}

fn default_sys_id() -> u8 {
    255
}

fn default_comp_id() -> u8 {
    190
}

fn one() -> u8 {
    1
}

/// Wall clock in microseconds since the Unix epoch, for message stamps.
pub fn now_us() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000).max(0) as u64
}
