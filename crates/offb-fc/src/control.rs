//! Control loop dispatcher.
//!
//! Telemetry and the fixed-period tick are multiplexed onto one task, so
//! the tracker and the mission engine are only ever touched by one handler
//! at a time and need no locking.

use std::time::Duration;

use anyhow::Result;
use offb_nav::mission::{MissionEngine, MissionOutput};
use offb_nav::vehicle::VehicleTracker;
use offb_proto::{Bus, Outbound, Telemetry};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::emitter::SetpointEmitter;
use crate::now_us;
use crate::sequencer::CommandSequencer;

pub struct Controller {
    tracker: VehicleTracker,
    engine: MissionEngine,
    sequencer: CommandSequencer,
    emitter: SetpointEmitter,
    tick: Duration,
    ticks: u64,
}

impl Controller {
    pub fn new(engine: MissionEngine, sequencer: CommandSequencer, tick: Duration) -> Result<Self> {
        anyhow::ensure!(!tick.is_zero(), "control tick period must be non-zero");
        Ok(Self {
            tracker: VehicleTracker::new(),
            engine,
            sequencer,
            emitter: SetpointEmitter::new(),
            tick,
            ticks: 0,
        })
    }

    pub fn tracker(&self) -> &VehicleTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &MissionEngine {
        &self.engine
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }

    pub fn tick_period(&self) -> Duration {
        self.tick
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Route one telemetry message to its tracker handler.
    pub fn on_telemetry(&mut self, msg: Telemetry) {
        match msg {
            Telemetry::Status { mode } => {
                if mode != self.tracker.current_control_mode() {
                    info!("vehicle: control mode {:?} -> {:?}", self.tracker.current_control_mode(), mode);
                }
                self.tracker.update_control_mode(mode);
            }
            Telemetry::LocalPosition { position, velocity } => {
                if self.tracker.current_state().is_none() {
                    info!("vehicle: first local position {:?}", position);
                }
                self.tracker.update_position(position, velocity);
            }
        }
    }

    /// One control tick: kick-start commands (early ticks only), mission
    /// step, then the setpoint stream. Publish failures are logged and the
    /// next tick simply tries again.
    pub fn on_tick(&mut self, bus: &mut dyn Bus, timestamp_us: u64) -> MissionOutput {
        self.ticks += 1;

        if let Some(cmds) = self.sequencer.on_tick(timestamp_us) {
            for cmd in cmds {
                if let Err(e) = bus.publish(Outbound::Command(cmd)) {
                    warn!("vehicle command {:?} not sent: {:#}", cmd.command, e);
                }
            }
        }

        let out = self.engine.step(
            self.tracker.current_control_mode(),
            self.tracker.current_state(),
            self.tick,
        );

        if let Err(e) = self.emitter.emit(bus, out.setpoint, out.yaw, timestamp_us) {
            warn!("setpoint not sent: {:#}", e);
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Transport keepalive period (companion heartbeat).
    pub keepalive_every: Option<Duration>,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

/// Drive the controller until shutdown, the telemetry source closing, or
/// `max_ticks`.
pub async fn run_dispatcher(
    controller: &mut Controller,
    bus: &mut dyn Bus,
    mut telemetry: mpsc::Receiver<Telemetry>,
    opts: DispatchOptions,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut ticker = interval(controller.tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_keepalive: Option<Instant> = None;

    info!("dispatcher: running at {:?} per tick", controller.tick_period());

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("dispatcher: shutting down after {} ticks", controller.ticks());
                return Ok(());
            }
            msg = telemetry.recv() => match msg {
                Some(msg) => controller.on_telemetry(msg),
                None => {
                    warn!("dispatcher: telemetry source closed");
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                if let Some(every) = opts.keepalive_every {
                    if last_keepalive.map_or(true, |t| t.elapsed() >= every) {
                        if let Err(e) = bus.keepalive() {
                            debug!("keepalive failed: {:#}", e);
                        }
                        last_keepalive = Some(Instant::now());
                    }
                }

                let out = controller.on_tick(bus, now_us());
                if controller.ticks() % 250 == 0 {
                    debug!(
                        "tick {}: phase={:?} wpt={} setpoint={:?}",
                        controller.ticks(), out.phase, out.index, out.setpoint
                    );
                }

                if opts.max_ticks.is_some_and(|n| controller.ticks() >= n) {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use crate::sequencer::SequencerConfig;
    use offb_nav::mission::{MissionParams, Phase};
    use offb_proto::{CommandKind, ControlMode, Topic, Vec3};

    const TICK: Duration = Duration::from_millis(20);

    fn controller(wps: Vec<Vec3>) -> Controller {
        let engine = MissionEngine::new(wps, MissionParams::default()).unwrap();
        Controller::new(engine, CommandSequencer::new(SequencerConfig::default()), TICK).unwrap()
    }

    #[test]
    fn zero_tick_period_is_rejected() {
        let engine = MissionEngine::new(vec![Vec3::ZERO], MissionParams::default()).unwrap();
        let seq = CommandSequencer::new(SequencerConfig::default());
        let err = Controller::new(engine, seq, Duration::ZERO).err().unwrap();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn every_tick_streams_even_without_telemetry() {
        let mut c = controller(vec![Vec3::new(0.0, 0.0, -10.0)]);
        let mut bus = RecordingBus::new("px4_1");
        for t in 0..100 {
            let out = c.on_tick(&mut bus, t);
            assert_eq!(out.phase, Phase::Hold);
        }
        assert_eq!(bus.count(Topic::OffboardControlMode), 100);
        assert_eq!(bus.count(Topic::TrajectorySetpoint), 100);
        // the kick-start went out exactly once
        let cmds = bus.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].command, CommandKind::SetMode);
        assert_eq!(cmds[1].command, CommandKind::ArmDisarm);
        assert_eq!(c.engine().state().phase, Phase::Hold);
    }

    #[test]
    fn commands_precede_setpoint_on_firing_tick() {
        let mut c = controller(vec![Vec3::new(0.0, 0.0, -10.0)]);
        let mut bus = RecordingBus::new("");
        for t in 0..9 {
            c.on_tick(&mut bus, t);
        }
        bus.clear();
        c.on_tick(&mut bus, 9);
        let topics: Vec<&str> = bus.messages().iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "/fmu/in/vehicle_command",
                "/fmu/in/vehicle_command",
                "/fmu/in/offboard_control_mode",
                "/fmu/in/trajectory_setpoint",
            ]
        );
    }

    #[test]
    fn telemetry_routes_to_tracker() {
        let mut c = controller(vec![Vec3::new(0.0, 0.0, -10.0)]);
        c.on_telemetry(Telemetry::Status { mode: ControlMode::Offboard });
        c.on_telemetry(Telemetry::LocalPosition { position: Vec3::new(1.0, 0.0, 0.0), velocity: Vec3::ZERO });
        assert_eq!(c.tracker().current_control_mode(), ControlMode::Offboard);
        assert_eq!(c.tracker().current_state().unwrap().position, Vec3::new(1.0, 0.0, 0.0));

        let mut bus = RecordingBus::new("px4_1");
        c.on_tick(&mut bus, 0);
        assert_eq!(c.engine().state().previous_target, Vec3::new(1.0, 0.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatcher_multiplexes_telemetry_and_ticks() {
        let wp = Vec3::new(0.0, 0.0, -10.0);
        let mut c = controller(vec![wp]);
        let mut bus = RecordingBus::new("px4_1");
        let (tx, rx) = mpsc::channel(16);
        let (_stop_tx, stop_rx) = broadcast::channel(1);

        tx.send(Telemetry::Status { mode: ControlMode::Offboard }).await.unwrap();
        tx.send(Telemetry::LocalPosition { position: wp, velocity: Vec3::ZERO }).await.unwrap();

        let opts = DispatchOptions { keepalive_every: Some(Duration::from_secs(1)), max_ticks: Some(60) };
        run_dispatcher(&mut c, &mut bus, rx, opts, stop_rx).await.unwrap();

        assert_eq!(c.ticks(), 60);
        assert_eq!(bus.count(Topic::TrajectorySetpoint), 60);
        assert!(bus.keepalives() >= 1);
        assert!(c.engine().is_complete());
        assert!(bus.last_setpoint().unwrap().position.distance_to(&wp) < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_follows_its_period() {
        let mut c = controller(vec![Vec3::new(0.0, 0.0, -10.0)]);
        let mut bus = RecordingBus::new("px4_1");
        let (_tx, rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = broadcast::channel(1);

        // 60 ticks span 0..=1180 ms; keepalives land on the first tick at or
        // past each 250 ms period: 0, 260, 520, 780, 1040
        let opts = DispatchOptions { keepalive_every: Some(Duration::from_millis(250)), max_ticks: Some(60) };
        run_dispatcher(&mut c, &mut bus, rx, opts, stop_rx).await.unwrap();

        assert_eq!(c.ticks(), 60);
        assert_eq!(bus.keepalives(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatcher_stops_on_shutdown() {
        let mut c = controller(vec![Vec3::new(0.0, 0.0, -10.0)]);
        let mut bus = RecordingBus::new("px4_1");
        let (_tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        stop_tx.send(()).unwrap();

        run_dispatcher(&mut c, &mut bus, rx, DispatchOptions::default(), stop_rx).await.unwrap();
        assert!(c.ticks() <= 1);
    }
}
