//! LEGO Power Functions Command Protocol
//!
//! Commands understood by the RFduino receiver on the vehicle. Every
//! command is a 2-byte frame:
//!
//! ```text
//! [0] : Opcode
//!       0x01 steer left
//!       0x02 steer right
//!       0x03 neutral (center steering)
//!       0x04 accelerate
//!       0x05 reverse accelerate
//!       0x06 brake
//! [1] : Parameter
//!       magnitude in [1; 7] for steer/accelerate opcodes,
//!       0x00 for neutral and brake
//! ```
//!
//! The Power Functions motors have seven speed steps, which is where the
//! parameter range comes from.

use thiserror::Error;
use tracing::trace;

/// Lowest admissible magnitude. Steps are 1-based.
pub const PARAMETER_MINIMUM_VALUE: u8 = 1;

/// Highest admissible magnitude.
pub const PARAMETER_MAXIMUM_VALUE: u8 = 7;

/// Filler parameter for opcodes that carry no magnitude.
pub const EMPTY_PAYLOAD: u8 = 0x00;

/// Size of a command frame on the wire.
pub const FRAME_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    SteerLeft,
    SteerRight,
    Neutral,
    Accelerate,
    ReverseAccelerate,
    Brake,
}

impl Opcode {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::SteerLeft => 0x01,
            Self::SteerRight => 0x02,
            Self::Neutral => 0x03,
            Self::Accelerate => 0x04,
            Self::ReverseAccelerate => 0x05,
            Self::Brake => 0x06,
        }
    }

    /// Whether the opcode carries a magnitude parameter.
    pub fn takes_magnitude(&self) -> bool {
        matches!(
            self,
            Self::SteerLeft | Self::SteerRight | Self::Accelerate | Self::ReverseAccelerate
        )
    }

    /// Name of the parameter as it appears in error messages.
    fn parameter_name(&self) -> &'static str {
        match self {
            Self::SteerLeft | Self::SteerRight => "extent",
            Self::Accelerate | Self::ReverseAccelerate => "velocity",
            Self::Neutral | Self::Brake => "payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(
        "illegal argument: {} must be in range [{}; {}], got {}",
        .opcode.parameter_name(),
        PARAMETER_MINIMUM_VALUE,
        PARAMETER_MAXIMUM_VALUE,
        .value
    )]
    InvalidParameter { opcode: Opcode, value: u8 },
}

/// A single command frame.
///
/// Only constructible through the checked constructors below, so a
/// magnitude-bearing command always holds a parameter in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    parameter: u8,
}

impl Command {
    pub fn steer_left(extent: u8) -> Result<Self, ProtocolError> {
        Self::with_magnitude(Opcode::SteerLeft, extent)
    }

    pub fn steer_right(extent: u8) -> Result<Self, ProtocolError> {
        Self::with_magnitude(Opcode::SteerRight, extent)
    }

    pub fn accelerate(velocity: u8) -> Result<Self, ProtocolError> {
        Self::with_magnitude(Opcode::Accelerate, velocity)
    }

    pub fn reverse_accelerate(velocity: u8) -> Result<Self, ProtocolError> {
        Self::with_magnitude(Opcode::ReverseAccelerate, velocity)
    }

    pub fn center() -> Self {
        Self {
            opcode: Opcode::Neutral,
            parameter: EMPTY_PAYLOAD,
        }
    }

    pub fn brake() -> Self {
        Self {
            opcode: Opcode::Brake,
            parameter: EMPTY_PAYLOAD,
        }
    }

    fn with_magnitude(opcode: Opcode, value: u8) -> Result<Self, ProtocolError> {
        debug_assert!(opcode.takes_magnitude());
        if !is_in_range(value) {
            return Err(ProtocolError::InvalidParameter { opcode, value });
        }
        Ok(Self {
            opcode,
            parameter: value,
        })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [self.opcode.as_byte(), self.parameter]
    }
}

pub fn is_in_range(value: u8) -> bool {
    (PARAMETER_MINIMUM_VALUE..=PARAMETER_MAXIMUM_VALUE).contains(&value)
}

/// Anything command frames can be pushed through.
///
/// Sending is best-effort: implementations drop frames while offline
/// instead of queueing them, the vehicle has no use for stale commands.
pub trait CommandSink {
    fn is_connected(&self) -> bool;
    fn send(&self, bytes: &[u8]);
}

/// Send `command` if the sink is connected. Silently dropped otherwise.
pub fn transmit(sink: &dyn CommandSink, command: Command) {
    if sink.is_connected() {
        sink.send(&command.to_bytes());
    } else {
        trace!("Dropping {:?}, not connected", command.opcode());
    }
}

/// Dispatch a 'steer left' command. An out-of-range extent fails before
/// anything is sent.
pub fn steer_left(sink: &dyn CommandSink, extent: u8) -> Result<(), ProtocolError> {
    transmit(sink, Command::steer_left(extent)?);
    Ok(())
}

pub fn steer_right(sink: &dyn CommandSink, extent: u8) -> Result<(), ProtocolError> {
    transmit(sink, Command::steer_right(extent)?);
    Ok(())
}

/// Move the steering axis back to its neutral position.
pub fn center(sink: &dyn CommandSink) {
    transmit(sink, Command::center());
}

pub fn accelerate(sink: &dyn CommandSink, velocity: u8) -> Result<(), ProtocolError> {
    transmit(sink, Command::accelerate(velocity)?);
    Ok(())
}

pub fn reverse_accelerate(sink: &dyn CommandSink, velocity: u8) -> Result<(), ProtocolError> {
    transmit(sink, Command::reverse_accelerate(velocity)?);
    Ok(())
}

/// Stop the vehicle.
pub fn brake(sink: &dyn CommandSink) {
    transmit(sink, Command::brake());
}
