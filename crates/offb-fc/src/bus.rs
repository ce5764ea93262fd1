use anyhow::Result;
use offb_proto::{Bus, Outbound, Topic, TrajectorySetpoint, VehicleCommand};

/// In-process bus that keeps everything published to it, keyed by the
/// namespaced topic path.
#[derive(Debug, Default)]
pub struct RecordingBus {
    namespace: String,
    sent: Vec<(String, Outbound)>,
    keepalives: u64,
}

impl RecordingBus {
    pub fn new(namespace: &str) -> Self {
        Self { namespace: namespace.to_string(), ..Default::default() }
    }

    pub fn messages(&self) -> &[(String, Outbound)] {
        &self.sent
    }

    pub fn count(&self, topic: Topic) -> usize {
        let path = topic.path(&self.namespace);
        self.sent.iter().filter(|(p, _)| *p == path).count()
    }

    pub fn setpoints(&self) -> impl Iterator<Item = &TrajectorySetpoint> {
        self.sent.iter().filter_map(|(_, m)| match m {
            Outbound::Setpoint(sp) => Some(sp),
            _ => None,
        })
    }

    pub fn last_setpoint(&self) -> Option<&TrajectorySetpoint> {
        self.setpoints().last()
    }

    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.sent
            .iter()
            .filter_map(|(_, m)| match m {
                Outbound::Command(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn keepalives(&self) -> u64 {
        self.keepalives
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl Bus for RecordingBus {
    fn publish(&mut self, msg: Outbound) -> Result<()> {
        let topic = msg.topic();
        anyhow::ensure!(!topic.is_inbound(), "cannot publish on inbound topic {}", topic.name());
        self.sent.push((topic.path(&self.namespace), msg));
        Ok(())
    }

    fn keepalive(&mut self) -> Result<()> {
        self.keepalives += 1;
        Ok(())
    }
}
