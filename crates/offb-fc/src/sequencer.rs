use offb_proto::{CommandKind, VehicleCommand};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SequencerConfig {
    /// First tick (1-based) at which the kick-start may fire.
    #[serde(default = "default_window_start")]
    pub window_start: u16,
    /// Last tick at which it may fire.
    #[serde(default = "default_window_end")]
    pub window_end: u16,
    /// DO_SET_MODE base mode (1 = custom mode enabled).
    #[serde(default = "default_mode_param1")]
    pub mode_param1: f32,
    /// DO_SET_MODE custom main mode (6 = PX4 offboard).
    #[serde(default = "default_mode_param2")]
    pub mode_param2: f32,
}

fn default_window_start() -> u16 {
    10
}

fn default_window_end() -> u16 {
    20
}

fn default_mode_param1() -> f32 {
    1.0
}

fn default_mode_param2() -> f32 {
    6.0
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            window_start: default_window_start(),
            window_end: default_window_end(),
            mode_param1: default_mode_param1(),
            mode_param2: default_mode_param2(),
        }
    }
}

/// One-shot "switch to offboard, then arm" kick-start. Nothing is awaited
/// and nothing is retried.
#[derive(Debug)]
pub struct CommandSequencer {
    cfg: SequencerConfig,
    counter: u16,
    fired: bool,
}

impl CommandSequencer {
    pub fn new(cfg: SequencerConfig) -> Self {
        Self { cfg, counter: 0, fired: false }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Count one control tick and return the commands due on it, if any.
    pub fn on_tick(&mut self, timestamp_us: u64) -> Option<[VehicleCommand; 2]> {
        self.counter = self.counter.wrapping_add(1);
        self.fire(self.counter, timestamp_us)
    }

    /// Fire-window check for a given tick count. Yields the mode and arm
    /// commands at most once per sequencer, whatever counter values come in.
    pub fn fire(&mut self, counter: u16, timestamp_us: u64) -> Option<[VehicleCommand; 2]> {
        if self.fired || counter < self.cfg.window_start || counter > self.cfg.window_end {
            return None;
        }
        self.fired = true;
        info!("sequencer: requesting offboard mode and arming at tick {}", counter);
        Some([
            VehicleCommand::new(
                CommandKind::SetMode,
                self.cfg.mode_param1,
                self.cfg.mode_param2,
                timestamp_us,
            ),
            VehicleCommand::new(CommandKind::ArmDisarm, 1.0, 0.0, timestamp_us),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_inside_window() {
        let mut s = CommandSequencer::new(SequencerConfig::default());
        let mut fired_at = Vec::new();
        for tick in 1..=100u64 {
            if let Some(cmds) = s.on_tick(tick) {
                fired_at.push(tick);
                assert_eq!(cmds[0].command, CommandKind::SetMode);
                assert_eq!(cmds[0].param1, 1.0);
                assert_eq!(cmds[0].param2, 6.0);
                assert_eq!(cmds[1].command, CommandKind::ArmDisarm);
                assert_eq!(cmds[1].param1, 1.0);
                assert_eq!(cmds[1].timestamp_us, tick);
            }
        }
        assert_eq!(fired_at, vec![10]);
        assert!(s.has_fired());
    }

    #[test]
    fn same_counter_twice_fires_once() {
        let mut s = CommandSequencer::new(SequencerConfig::default());
        assert!(s.fire(12, 0).is_some());
        assert!(s.fire(12, 0).is_none());
    }

    #[test]
    fn counter_wrap_does_not_refire() {
        let mut s = CommandSequencer::new(SequencerConfig::default());
        let mut count = 0;
        for _ in 0..(u16::MAX as u32 * 2 + 50) {
            if s.on_tick(0).is_some() {
                count += 1;
            }
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn outside_window_is_silent() {
        let mut s = CommandSequencer::new(SequencerConfig { window_start: 5, window_end: 6, ..Default::default() });
        assert!(s.fire(4, 0).is_none());
        assert!(s.fire(7, 0).is_none());
        assert!(!s.has_fired());
        assert!(s.fire(6, 0).is_some());
    }

    #[test]
    fn command_addressing() {
        let mut s = CommandSequencer::new(SequencerConfig::default());
        let cmds = s.fire(10, 42).unwrap();
        for c in cmds {
            assert_eq!(c.target_system, 0);
            assert_eq!(c.target_component, 1);
            assert_eq!(c.source_system, 1);
            assert_eq!(c.source_component, 1);
            assert!(c.from_external);
            assert_eq!(c.timestamp_us, 42);
        }
    }
}
