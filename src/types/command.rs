//! Control protocol command tokens

use std::fmt;
use std::str::FromStr;

use crate::DroneError;

/// Translation direction accepted by the drone's move commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Forward,
        Direction::Back,
    ];

    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Back => "back",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DroneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| DroneError::invalid_command(format!("unknown direction '{s}'")))
    }
}

/// Yaw rotation sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// `cw`
    Clockwise,
    /// `ccw`
    CounterClockwise,
}

impl Rotation {
    pub fn as_str(self) -> &'static str {
        match self {
            Rotation::Clockwise => "cw",
            Rotation::CounterClockwise => "ccw",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rotation {
    type Err = DroneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cw" => Ok(Rotation::Clockwise),
            "ccw" => Ok(Rotation::CounterClockwise),
            other => Err(DroneError::invalid_command(format!("unknown rotation '{other}'"))),
        }
    }
}

/// A single control protocol request.
///
/// `Display` renders the exact text sent in the datagram. Arguments are passed
/// through unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enter SDK command mode
    Enter,
    Takeoff,
    Land,
    /// Stop all motors immediately
    Emergency,
    StreamOn,
    Speed(i32),
    Move { direction: Direction, centimeters: i64 },
    Turn { rotation: Rotation, degrees: i32 },
}

impl Command {
    /// Build a move command from a distance in meters.
    ///
    /// Meters are converted to whole centimeters with round-half-to-even, so
    /// `0.125` becomes `12` rather than `13`.
    pub fn move_meters(direction: Direction, meters: f64) -> Self {
        let centimeters = (meters * 100.0).round_ties_even() as i64;
        Command::Move { direction, centimeters }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Enter => f.write_str("command"),
            Command::Takeoff => f.write_str("takeoff"),
            Command::Land => f.write_str("land"),
            Command::Emergency => f.write_str("emergency"),
            Command::StreamOn => f.write_str("streamon"),
            Command::Speed(speed) => write!(f, "speed {speed}"),
            Command::Move { direction, centimeters } => write!(f, "{direction} {centimeters}"),
            Command::Turn { rotation, degrees } => write!(f, "{rotation} {degrees}"),
        }
    }
}
