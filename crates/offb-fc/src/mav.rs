use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
        PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA,
        SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavConnection, MavHeader,
};
use offb_proto::{
    Bus, CommandKind, ControlMode, OffboardControlMode, Outbound, Telemetry, TrajectorySetpoint,
    Vec3, VehicleCommand,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::FcConfig;

type Conn = Arc<dyn MavConnection<MavMessage> + Sync + Send>;

/// MAVLink transport: outbound messages become SET_POSITION_TARGET_LOCAL_NED
/// and COMMAND_LONG, inbound HEARTBEAT / LOCAL_POSITION_NED become telemetry.
pub struct MavBus {
    conn: Conn,
    hdr: MavHeader,
    target_sys: u8,
    target_comp: u8,
    namespace: String,
    control: OffboardControlMode,
    started: Instant,
}

impl MavBus {
    pub fn open(cfg: &FcConfig) -> Result<Self> {
        if let Some(rest) = cfg.url.strip_prefix("serial:") {
            // quick validate device
            let (dev, baud) = parse_serial(rest)?;
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open fc serial device {}", dev))?;
        }

        let conn = mavlink::connect::<MavMessage>(&cfg.url)
            .with_context(|| format!("mavlink connect {}", cfg.url))?;
        info!("fc: connected via {}", cfg.url);

        Ok(Self {
            conn: Arc::from(conn),
            hdr: MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 },
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            namespace: cfg.namespace.clone(),
            control: OffboardControlMode::default(),
            started: Instant::now(),
        })
    }

    /// Reader loop in a blocking task (mavlink recv blocks). Ends when the
    /// dispatcher drops its receiver.
    pub fn spawn_reader(&self, tx: mpsc::Sender<Telemetry>) -> JoinHandle<()> {
        let conn = self.conn.clone();
        let target_sys = self.target_sys;
        tokio::task::spawn_blocking(move || loop {
            match conn.recv() {
                Ok((hdr, msg)) => {
                    let Some(t) = telemetry_from_mav(&hdr, &msg, target_sys) else { continue };
                    if tx.blocking_send(t).is_err() {
                        debug!("fc reader: dispatcher gone, stopping");
                        return;
                    }
                }
                Err(e) => {
                    debug!("fc reader: recv failed: {:?}", e);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }
        })
    }

    fn send(&mut self, msg: MavMessage) -> Result<()> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        self.conn.send(&self.hdr, &msg).context("mavlink send")?;
        Ok(())
    }
}

impl Bus for MavBus {
    fn publish(&mut self, msg: Outbound) -> Result<()> {
        match msg {
            // MAVLink has no separate control-mode message; the flags pick the
            // type mask of the following setpoints.
            Outbound::ControlMode(flags) => {
                self.control = flags;
                Ok(())
            }
            Outbound::Setpoint(sp) => {
                let boot_ms = self.started.elapsed().as_millis() as u32;
                let Some(m) = setpoint_to_mav(&sp, &self.control, boot_ms, self.target_sys, self.target_comp) else {
                    warn!("{}: no position control requested, setpoint dropped", self.namespace);
                    return Ok(());
                };
                self.send(m)
            }
            Outbound::Command(cmd) => {
                info!("FC: sending {:?} ({}, {})", cmd.command, cmd.param1, cmd.param2);
                self.send(command_to_mav(&cmd, self.target_sys, self.target_comp))
            }
        }
    }

    fn keepalive(&mut self) -> Result<()> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }
}

fn parse_serial(rest: &str) -> Result<(&str, u32)> {
    let (dev, baud) = rest.rsplit_once(':').context("serial url must be serial:<dev>:<baud>")?;
    let baud = baud.parse().with_context(|| format!("invalid baud {}", baud))?;
    Ok((dev, baud))
}

/// Only the autopilot's own HEARTBEAT carries its flight mode; other
/// components (GCS, cameras) are ignored.
pub fn telemetry_from_mav(hdr: &MavHeader, msg: &MavMessage, target_sys: u8) -> Option<Telemetry> {
    if target_sys != 0 && hdr.system_id != target_sys {
        return None;
    }
    match msg {
        MavMessage::HEARTBEAT(hb) if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_PX4 => {
            Some(Telemetry::Status { mode: ControlMode::from_px4_custom_mode(hb.custom_mode) })
        }
        MavMessage::LOCAL_POSITION_NED(p) => Some(Telemetry::LocalPosition {
            position: Vec3::new(p.x as f64, p.y as f64, p.z as f64),
            velocity: Vec3::new(p.vx as f64, p.vy as f64, p.vz as f64),
        }),
        _ => None,
    }
}

/// `time_boot_ms` is relative to link start; the setpoint's own timestamp is
/// wall-clock and does not fit the field.
pub fn setpoint_to_mav(
    sp: &TrajectorySetpoint,
    control: &OffboardControlMode,
    time_boot_ms: u32,
    target_sys: u8,
    target_comp: u8,
) -> Option<MavMessage> {
    if !control.position {
        return None;
    }
    let type_mask = PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE;

    Some(MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms,
        target_system: target_sys,
        target_component: target_comp,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask,
        x: sp.position.n as f32,
        y: sp.position.e as f32,
        z: sp.position.d as f32,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: sp.yaw as f32,
        yaw_rate: 0.0,
    }))
}

pub fn command_to_mav(cmd: &VehicleCommand, target_sys: u8, target_comp: u8) -> MavMessage {
    let command = match cmd.command {
        CommandKind::SetMode => MavCmd::MAV_CMD_DO_SET_MODE,
        CommandKind::ArmDisarm => MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
    };
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target_sys,
        target_component: target_comp,
        command,
        confirmation: 0,
        param1: cmd.param1,
        param2: cmd.param2,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
    })
}
