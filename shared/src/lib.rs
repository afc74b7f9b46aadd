use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_ROWS: i32 = 10;
pub const DEFAULT_COLS: i32 = 10;
/// Width of the band that sequential spawning fills before moving down a row.
pub const SPAWN_STRIDE: i32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("invalid grid dimensions {rows}x{cols}: both must be positive")]
    InvalidDimensions { rows: i32, cols: i32 },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown direction {0:?}")]
pub struct UnknownDirection(pub String);

/// A grid cell. `i` is the row, `j` the column.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub i: i32,
    pub j: i32,
}

impl Position {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    /// The neighbouring cell one step in `direction`. May lie outside any grid.
    pub fn offset(self, direction: Direction) -> Self {
        let (di, dj) = direction.delta();
        Self {
            i: self.i + di,
            j: self.j + dj,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Row and column delta for one step.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

/// How a new session's starting cell is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnPolicy {
    /// Fill a band of `SPAWN_STRIDE` columns row by row. The registry hands
    /// out the lowest band cell nobody is standing on.
    #[default]
    Sequential,
    /// Always the top-left cell.
    Origin,
    /// Any cell, uniformly at random.
    Random,
}

impl fmt::Display for SpawnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpawnPolicy::Sequential => "sequential",
            SpawnPolicy::Origin => "origin",
            SpawnPolicy::Random => "random",
        })
    }
}

impl FromStr for SpawnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(SpawnPolicy::Sequential),
            "origin" => Ok(SpawnPolicy::Origin),
            "random" => Ok(SpawnPolicy::Random),
            other => Err(format!(
                "unknown spawn policy '{other}' (expected sequential, origin or random)"
            )),
        }
    }
}

/// Grid dimensions. Construction is the only place dimensions are validated,
/// so every `Grid` in circulation has at least one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    rows: i32,
    cols: i32,
}

impl Grid {
    pub fn new(rows: i32, cols: i32) -> Result<Self, GridError> {
        if rows <= 0 || cols <= 0 {
            return Err(GridError::InvalidDimensions { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn is_in_bounds(&self, position: Position) -> bool {
        (0..self.rows).contains(&position.i) && (0..self.cols).contains(&position.j)
    }

    /// Folds any position back onto the grid as if its edges were joined.
    pub fn wrap(&self, position: Position) -> Position {
        Position {
            i: position.i.rem_euclid(self.rows),
            j: position.j.rem_euclid(self.cols),
        }
    }

    /// Starting cell for the `index`-th concurrent session.
    pub fn spawn_position(&self, policy: SpawnPolicy, index: usize) -> Position {
        match policy {
            SpawnPolicy::Origin => Position::new(0, 0),
            SpawnPolicy::Sequential => {
                let stride = SPAWN_STRIDE.min(self.cols) as usize;
                let row = (index / stride) % self.rows as usize;
                let col = index % stride;
                Position::new(row as i32, col as i32)
            }
            SpawnPolicy::Random => {
                let mut rng = rand::thread_rng();
                Position::new(rng.gen_range(0..self.rows), rng.gen_range(0..self.cols))
            }
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Exact shape of an inbound frame. Anything besides an optional `move`
/// field is rejected.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClientFrame {
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    movement: Option<String>,
}

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// A move request. The direction is kept verbatim; validating it is the
    /// move processor's job.
    Move { direction: String },
    /// `{}`: the client pressed a key it has no mapping for.
    Idle,
}

impl ClientMessage {
    pub fn movement(direction: Direction) -> Self {
        ClientMessage::Move {
            direction: direction.as_str().to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;
        // Derived struct deserializers also accept sequences, so `["up"]`
        // would otherwise read as a move.
        if !value.is_object() {
            return Err(ProtocolError::MalformedMessage(format!(
                "expected a JSON object, got {value}"
            )));
        }
        let frame: ClientFrame = serde_json::from_value(value)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

        Ok(match frame.movement {
            Some(direction) => ClientMessage::Move { direction },
            None => ClientMessage::Idle,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let frame = match self {
            ClientMessage::Move { direction } => ClientFrame {
                movement: Some(direction.clone()),
            },
            ClientMessage::Idle => ClientFrame::default(),
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

/// Server to client messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerMessage {
    /// World state as seen by one session.
    Snapshot {
        position: Position,
        others: Vec<Position>,
    },
    /// Sent only to the connection it concerns, never broadcast.
    Error { error: String },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}
