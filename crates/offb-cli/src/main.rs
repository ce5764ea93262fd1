use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use offb_fc::control::{run_dispatcher, Controller, DispatchOptions};
use offb_fc::mav::MavBus;
use offb_fc::sequencer::{CommandSequencer, SequencerConfig};
use offb_fc::sim::{self, SimConfig, SimVehicle};
use offb_fc::FcConfig;
use offb_nav::doctor as nav_doctor;
use offb_nav::geo::{project_waypoints, GeoPoint, ReferencePoint};
use offb_nav::mission::{MissionEngine, MissionParams};
use offb_proto::{Telemetry, Topic, Vec3};

#[derive(Debug, Parser)]
#[command(name = "offb", version, about = "Offboard waypoint mission runner for PX4")]
struct Cli {
    #[arg(long)]
    config: String,

    /// Mission variant selector (reserved).
    #[arg(long, short = 'm')]
    mode: Option<i64>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config and print the projected waypoints.
    Doctor,
    /// Fly the mission over the configured MAVLink link.
    Run,
    /// Fly the mission against a simulated vehicle in virtual time.
    Sim,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    mission: MissionCfg,
    sequencer: Option<SequencerConfig>,
    fc: Option<FcConfig>,
    sim: Option<SimConfig>,
}

#[derive(Debug, serde::Deserialize)]
struct MissionCfg {
    #[serde(default = "default_mode")]
    mode: i64,
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    #[serde(default = "default_progress_rate")]
    progress_rate: f64,
    #[serde(default = "default_reach_radius")]
    reach_radius_m: f64,
    #[serde(default = "default_yaw")]
    yaw_rad: f64,
    reference: GeoPoint,
    waypoints: Vec<GeoPoint>,
}

fn default_mode() -> i64 {
    1
}

fn default_tick_ms() -> u64 {
    20
}

fn default_progress_rate() -> f64 {
    0.1
}

fn default_reach_radius() -> f64 {
    0.1
}

fn default_yaw() -> f64 {
    -std::f64::consts::FRAC_PI_2
}

impl MissionCfg {
    fn params(&self) -> MissionParams {
        MissionParams {
            progress_rate: self.progress_rate,
            reach_radius_m: self.reach_radius_m,
            yaw_rad: self.yaw_rad,
        }
    }

    fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = load_config(&cli.config)?;
    if let Some(mode) = cli.mode {
        cfg.mission.mode = mode;
    }
    info!("mission mode flag = {}", cfg.mission.mode);

    match cli.cmd {
        Command::Doctor => doctor(&cfg),
        Command::Run => run(&cfg).await,
        Command::Sim => simulate(&cfg),
    }
}

fn check(cfg: &Config) -> Result<Vec<Vec3>> {
    let m = &cfg.mission;
    nav_doctor::check_mission(&m.reference, &m.waypoints, &m.params(), m.tick())
        .context("mission config")?;

    let seq = cfg.sequencer.unwrap_or_default();
    anyhow::ensure!(seq.window_start >= 1, "sequencer.window_start must be >= 1");
    anyhow::ensure!(seq.window_start <= seq.window_end, "sequencer window is empty");

    Ok(project_waypoints(&ReferencePoint::new(m.reference), &m.waypoints))
}

fn build_controller(cfg: &Config) -> Result<Controller> {
    let waypoints = check(cfg)?;
    let engine = MissionEngine::new(waypoints, cfg.mission.params()).context("mission setup")?;
    let sequencer = CommandSequencer::new(cfg.sequencer.unwrap_or_default());
    Controller::new(engine, sequencer, cfg.mission.tick())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    let waypoints = check(cfg)?;

    let r = cfg.mission.reference;
    println!("reference lat={} lon={} alt={}m", r.lat, r.lon, r.alt_m);
    for (i, w) in waypoints.iter().enumerate() {
        println!("wpt {:>2}: N={:>9.2} E={:>9.2} D={:>7.2}", i, w.n, w.e, w.d);
    }
    let length: f64 = waypoints.windows(2).map(|p| p[0].distance_to(&p[1])).sum();
    println!("route length {:.1} m over {} waypoints", length, waypoints.len());

    if let Some(fc) = &cfg.fc {
        anyhow::ensure!(!fc.url.is_empty(), "fc.url missing");
        println!("setpoints -> {}", Topic::TrajectorySetpoint.path(&fc.namespace));
    } else {
        warn!("doctor: no [fc] section, `run` will not work");
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    let fc = cfg.fc.as_ref().context("no [fc] config section")?;
    let mut controller = build_controller(cfg)?;

    let mut bus = MavBus::open(fc).context("FC open")?;
    let (tx, rx) = mpsc::channel::<Telemetry>(64);
    let reader = bus.spawn_reader(tx);

    let (stop_tx, stop_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("run: ctrl-c received");
            let _ = stop_tx.send(());
        }
    });

    let hb_hz = fc.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
    let opts = DispatchOptions {
        keepalive_every: Some(Duration::from_secs_f32(1.0 / hb_hz)),
        max_ticks: None,
    };
    run_dispatcher(&mut controller, &mut bus, rx, opts, stop_rx).await?;

    let st = controller.engine().state();
    info!(
        "run: stopped in {:?} at waypoint {} (complete={}, position updates={})",
        st.phase,
        st.index,
        st.complete,
        controller.tracker().position_updates()
    );

    // The reader notices the closed channel on its next inbound message. A
    // silent link leaves it parked in recv, which would block runtime shutdown.
    if tokio::time::timeout(Duration::from_secs(2), reader).await.is_err() {
        warn!("run: fc reader still blocked in recv, exiting");
        std::process::exit(0);
    }
    Ok(())
}

fn simulate(cfg: &Config) -> Result<()> {
    let mut controller = build_controller(cfg)?;
    let mut vehicle = SimVehicle::new(cfg.sim.unwrap_or_default());

    let report = sim::fly(&mut controller, &mut vehicle);
    println!(
        "sim: complete={} waypoint={}/{} ticks={} elapsed={:.1}s final={:?}",
        report.complete,
        report.final_index + 1,
        controller.engine().waypoints().len(),
        report.ticks,
        report.elapsed.as_secs_f64(),
        report.final_position,
    );
    anyhow::ensure!(report.complete, "mission did not complete within the simulated duration");
    Ok(())
}
