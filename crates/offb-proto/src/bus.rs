use anyhow::Result;

use crate::messages::Outbound;

/// Outbound side of the messaging layer. Inbound telemetry is delivered
/// to the dispatcher separately, so a transport only has to know how to
/// get messages out.
pub trait Bus {
    fn publish(&mut self, msg: Outbound) -> Result<()>;

    /// Link-level liveness message, if the transport needs one.
    fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }
}
