use crate::domain::control::{ControlIntent, ControlPosition};
use crate::domain::protocol::{self, Command, CommandSink, ProtocolError};
use tracing::trace;

/// Run one dispatch tick.
///
/// Samples the latest control position, derives this tick's intent and
/// pushes the resulting commands through `sink`. Does nothing until both a
/// position has been recorded and a channel exists. Returns the commands
/// that were handed to the sink, which drops them itself while offline.
pub fn dispatch_tick(
    position: Option<ControlPosition>,
    sink: Option<&dyn CommandSink>,
) -> Result<Vec<Command>, ProtocolError> {
    let (Some(position), Some(sink)) = (position, sink) else {
        trace!("Tick skipped, session not initialized");
        return Ok(Vec::new());
    };

    let intent = ControlIntent::from_position(position);
    let commands = intent.commands()?;
    for command in &commands {
        protocol::transmit(sink, *command);
    }
    Ok(commands)
}
