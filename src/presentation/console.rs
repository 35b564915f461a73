//! Console stand-ins for the thumb stick and the status label.
//!
//! Input lines:
//!
//! ```text
//! connect          open a new channel
//! disconnect       close the channel
//! stick <x> <y>    hold the stick at (x, y), screen orientation, [-1, 1]
//! release          let go of the stick
//! quit             end the session
//! ```

use crate::domain::control::JoystickState;
use crate::domain::models::{AppEvent, MessageSeverity};
use crate::session::SessionCommand;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Connect,
    Disconnect,
    Stick { x: f64, y: f64 },
    Release,
    Quit,
}

pub fn parse_line(line: &str) -> Option<ConsoleInput> {
    let mut words = line.split_whitespace();
    let input = match words.next()? {
        "connect" => ConsoleInput::Connect,
        "disconnect" => ConsoleInput::Disconnect,
        "release" => ConsoleInput::Release,
        "quit" | "exit" => ConsoleInput::Quit,
        "stick" => {
            let x: f64 = words.next()?.parse().ok()?;
            let y: f64 = words.next()?.parse().ok()?;
            if !x.is_finite() || !y.is_finite() {
                return None;
            }
            ConsoleInput::Stick { x, y }
        }
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(input)
}

/// Build the thumb stick reading for a knob held at (x, y). The knob
/// cannot leave the unit circle.
pub fn stick_state(x: f64, y: f64) -> JoystickState {
    let length = x.hypot(y);
    if length == 0.0 {
        return JoystickState::released();
    }
    JoystickState {
        active: true,
        length: length.min(1.0),
        max_length: 1.0,
        normal: (x / length, y / length),
    }
}

impl ConsoleInput {
    /// Session command for this input, `None` for `quit`.
    pub fn into_command(self) -> Option<SessionCommand> {
        match self {
            ConsoleInput::Connect => Some(SessionCommand::Connect),
            ConsoleInput::Disconnect => Some(SessionCommand::Disconnect),
            ConsoleInput::Stick { x, y } => Some(SessionCommand::Joystick(stick_state(x, y))),
            ConsoleInput::Release => Some(SessionCommand::Joystick(JoystickState::released())),
            ConsoleInput::Quit => None,
        }
    }
}

/// Forward console input to the session until `quit` or end of input.
/// Dropping `commands` on return ends the session.
pub async fn read_input<R>(reader: R, commands: mpsc::UnboundedSender<SessionCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(input) = parse_line(&line) else {
            warn!("Ignoring unknown input: {}", line.trim());
            continue;
        };
        let Some(command) = input.into_command() else {
            break;
        };
        if commands.send(command).is_err() {
            break;
        }
    }
    info!("Input closed");
}

/// Print status updates until every event sender is gone.
pub async fn show_status<W: Write>(mut events: mpsc::UnboundedReceiver<AppEvent>, mut out: W) {
    while let Some(event) = events.recv().await {
        let line = match event {
            AppEvent::ConnectionState(state) => format!("Status: {}", state),
            AppEvent::LogMessage(message) => match message.severity {
                MessageSeverity::Info => message.message,
                MessageSeverity::Error => format!("Error: {}", message.message),
            },
        };
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            break;
        }
    }
}
