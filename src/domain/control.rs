//! Joystick to vehicle control mapping.
//!
//! A joystick reading is first scaled to a pair of signed control values in
//! [-127, 127] ([`ControlPosition`]), which the dispatch loop turns into a
//! discrete [`ControlIntent`] on every tick.

use crate::domain::protocol::{Command, ProtocolError, PARAMETER_MAXIMUM_VALUE};

/// Full scale of a control axis.
pub const CONTROL_RANGE: f64 = 127.0;

/// |controlY| must exceed this before the vehicle accelerates.
pub const THROTTLE_THRESHOLD: i32 = 20;

/// Half-width of the steering dead-zone. Values strictly inside
/// (-40, 40) center the steering.
pub const STEER_THRESHOLD: i32 = 40;

/// Magnitude used for every throttle and steer command.
pub const DRIVE_MAGNITUDE: u8 = PARAMETER_MAXIMUM_VALUE;

/// Readable state of the on-screen thumb stick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoystickState {
    pub active: bool,
    /// Distance of the knob from the stick origin.
    pub length: f64,
    /// Largest distance the knob can travel.
    pub max_length: f64,
    /// Unit direction vector of the knob, screen orientation.
    pub normal: (f64, f64),
}

impl JoystickState {
    pub fn released() -> Self {
        Self {
            active: false,
            length: 0.0,
            max_length: 1.0,
            normal: (0.0, 0.0),
        }
    }
}

/// Signed control values, both in [-127, 127].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlPosition {
    pub x: i32,
    pub y: i32,
}

impl ControlPosition {
    pub const NEUTRAL: Self = Self { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Scale a joystick reading. Releasing the stick resets both axes
    /// together so the vehicle stops and straightens.
    ///
    /// Both axes are inverted to map the stick orientation onto the
    /// vehicle orientation.
    pub fn from_joystick(stick: &JoystickState) -> Self {
        if !stick.active || stick.max_length <= 0.0 {
            return Self::NEUTRAL;
        }
        let scale = |normal: f64| -> i32 {
            let value = (-(stick.length * normal / stick.max_length) * CONTROL_RANGE).round();
            value.clamp(-CONTROL_RANGE, CONTROL_RANGE) as i32
        };
        Self {
            x: scale(stick.normal.0),
            y: scale(stick.normal.1),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steer {
    Left,
    Right,
    Center,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Forward,
    Reverse,
    Brake,
    None,
}

/// Discrete action for one dispatch tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlIntent {
    pub steer: Steer,
    pub throttle: Throttle,
    pub magnitude: u8,
}

impl ControlIntent {
    pub const STOP: Self = Self {
        steer: Steer::Center,
        throttle: Throttle::Brake,
        magnitude: DRIVE_MAGNITUDE,
    };

    pub fn from_position(position: ControlPosition) -> Self {
        if position.is_neutral() {
            return Self::STOP;
        }

        let throttle = if position.y > THROTTLE_THRESHOLD {
            Throttle::Forward
        } else if position.y < -THROTTLE_THRESHOLD {
            Throttle::Reverse
        } else {
            Throttle::None
        };

        // Positive x means the stick was pushed to the left of the screen
        // (axes are inverted), hence x <= -40 steers right.
        let steer = if position.x < STEER_THRESHOLD && position.x > -STEER_THRESHOLD {
            Steer::Center
        } else if position.x < STEER_THRESHOLD {
            Steer::Right
        } else if position.x > -STEER_THRESHOLD {
            Steer::Left
        } else {
            // Unreachable, the three ranges above cover every x.
            Steer::None
        };

        Self {
            steer,
            throttle,
            magnitude: DRIVE_MAGNITUDE,
        }
    }

    /// Commands for this tick, in transmission order.
    ///
    /// A full stop sends center before brake. Otherwise the throttle
    /// command (if any) goes out before the steer command.
    pub fn commands(&self) -> Result<Vec<Command>, ProtocolError> {
        if self.throttle == Throttle::Brake {
            let mut commands = Vec::with_capacity(2);
            if let Some(steer) = self.steer_command()? {
                commands.push(steer);
            }
            commands.push(Command::brake());
            return Ok(commands);
        }

        let mut commands = Vec::with_capacity(2);
        match self.throttle {
            Throttle::Forward => commands.push(Command::accelerate(self.magnitude)?),
            Throttle::Reverse => commands.push(Command::reverse_accelerate(self.magnitude)?),
            Throttle::Brake | Throttle::None => {}
        }
        if let Some(steer) = self.steer_command()? {
            commands.push(steer);
        }
        Ok(commands)
    }

    fn steer_command(&self) -> Result<Option<Command>, ProtocolError> {
        Ok(match self.steer {
            Steer::Left => Some(Command::steer_left(self.magnitude)?),
            Steer::Right => Some(Command::steer_right(self.magnitude)?),
            Steer::Center => Some(Command::center()),
            Steer::None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stick(x: f64, y: f64) -> JoystickState {
        let length = (x * x + y * y).sqrt();
        JoystickState {
            active: true,
            length,
            max_length: 1.0,
            normal: (x / length, y / length),
        }
    }

    fn bytes(intent: ControlIntent) -> Vec<[u8; 2]> {
        intent
            .commands()
            .unwrap()
            .iter()
            .map(Command::to_bytes)
            .collect()
    }

    #[test]
    fn test_released_stick_is_neutral() {
        let mut state = stick(0.8, -0.3);
        state.active = false;
        assert_eq!(ControlPosition::from_joystick(&state), ControlPosition::NEUTRAL);
        assert_eq!(
            ControlPosition::from_joystick(&JoystickState::released()),
            ControlPosition::NEUTRAL
        );
    }

    #[test]
    fn test_axes_are_inverted_and_scaled() {
        // Full deflection to the right and down on screen.
        let position = ControlPosition::from_joystick(&stick(1.0, 0.0));
        assert_eq!(position, ControlPosition::new(-127, 0));

        let position = ControlPosition::from_joystick(&stick(0.0, 1.0));
        assert_eq!(position, ControlPosition::new(0, -127));

        let position = ControlPosition::from_joystick(&JoystickState {
            active: true,
            length: 50.0,
            max_length: 100.0,
            normal: (-0.6, -0.8),
        });
        // -(50 * -0.6 / 100) * 127 = 38.1, -(50 * -0.8 / 100) * 127 = 50.8
        assert_eq!(position, ControlPosition::new(38, 51));
    }

    #[test]
    fn test_degenerate_max_length_is_neutral() {
        let state = JoystickState {
            active: true,
            length: 1.0,
            max_length: 0.0,
            normal: (1.0, 0.0),
        };
        assert!(ControlPosition::from_joystick(&state).is_neutral());
    }

    #[test]
    fn test_exact_zero_stops_and_straightens() {
        let intent = ControlIntent::from_position(ControlPosition::NEUTRAL);
        assert_eq!(intent, ControlIntent::STOP);
        assert_eq!(bytes(intent), vec![[0x03, 0x00], [0x06, 0x00]]);
    }

    #[test]
    fn test_throttle_before_steer() {
        let intent = ControlIntent::from_position(ControlPosition::new(50, 50));
        assert_eq!(intent.throttle, Throttle::Forward);
        assert_eq!(intent.steer, Steer::Left);
        assert_eq!(bytes(intent), vec![[0x04, 0x07], [0x01, 0x07]]);

        let intent = ControlIntent::from_position(ControlPosition::new(-50, -50));
        assert_eq!(bytes(intent), vec![[0x05, 0x07], [0x02, 0x07]]);
    }

    #[test]
    fn test_dead_zones_only_center() {
        let intent = ControlIntent::from_position(ControlPosition::new(10, 0));
        assert_eq!(intent.throttle, Throttle::None);
        assert_eq!(intent.steer, Steer::Center);
        assert_eq!(bytes(intent), vec![[0x03, 0x00]]);

        let intent = ControlIntent::from_position(ControlPosition::new(0, 20));
        assert_eq!(bytes(intent), vec![[0x03, 0x00]]);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(0, 21)).throttle,
            Throttle::Forward
        );
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(0, -21)).throttle,
            Throttle::Reverse
        );
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(0, -20)).throttle,
            Throttle::None
        );
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(39, 1)).steer,
            Steer::Center
        );
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(40, 0)).steer,
            Steer::Left
        );
        assert_eq!(
            ControlIntent::from_position(ControlPosition::new(-40, 0)).steer,
            Steer::Right
        );
    }

    #[test]
    fn test_pushing_stick_right_steers_right() {
        let position = ControlPosition::from_joystick(&stick(0.9, 0.0));
        let intent = ControlIntent::from_position(position);
        assert_eq!(intent.steer, Steer::Right);
        assert_eq!(intent.throttle, Throttle::None);
    }

    #[test]
    fn test_pushing_stick_up_accelerates() {
        let position = ControlPosition::from_joystick(&stick(0.0, -0.5));
        let intent = ControlIntent::from_position(position);
        assert_eq!(intent.throttle, Throttle::Forward);
        assert_eq!(intent.steer, Steer::Center);
    }

    #[test]
    fn test_invalid_magnitude_is_reported() {
        let intent = ControlIntent {
            steer: Steer::Left,
            throttle: Throttle::None,
            magnitude: 0,
        };
        assert!(intent.commands().is_err());
    }
}
