//! Wire format shared with the gophertron server.
//!
//! Inbound text frames are either a bare control token (`countdown`,
//! `victory`) or a JSON object mapping player ids to their trail and color.
//! Outbound frames are JSON move intents.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const CONTROL_COUNTDOWN: &str = "countdown";
pub const CONTROL_VICTORY: &str = "victory";

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[source] serde_json::Error),
    #[error("failed to encode intent: {0}")]
    EncodeIntent(#[source] serde_json::Error),
}

/// Game-phase signal carried as a bare string frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    Countdown,
    Victory,
}

impl ControlToken {
    /// Exact, case-sensitive match against the control vocabulary.
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            CONTROL_COUNTDOWN => Some(Self::Countdown),
            CONTROL_VICTORY => Some(Self::Victory),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Countdown => CONTROL_COUNTDOWN,
            Self::Victory => CONTROL_VICTORY,
        }
    }
}

/// One trail point in server grid units. A missing or non-numeric axis
/// reads as NaN, which the drawing surface treats as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    fn from_value(value: &Value) -> Self {
        let axis = |key: &str| value.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
        Self::new(axis("X"), axis("Y"))
    }
}

/// One player's trail. The first coordinate is the oldest point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    // The server serializes an empty trail as `null`.
    #[serde(default, deserialize_with = "lenient_trail")]
    pub coordinate: Vec<Coordinate>,
    #[serde(default, deserialize_with = "lenient_color")]
    pub color: Option<String>,
}

impl EntityRecord {
    pub fn origin(&self) -> Option<Coordinate> {
        self.coordinate.first().copied()
    }

    /// Anything that is not an object reads as an entity with nothing to draw.
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

fn lenient_trail<'de, D>(deserializer: D) -> Result<Vec<Coordinate>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(points) => points.iter().map(Coordinate::from_value).collect(),
        _ => Vec::new(),
    })
}

fn lenient_color<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(color) => Some(color),
        _ => None,
    })
}

/// Complete scene description; replaces whatever was drawn before.
///
/// Only the top level must be a JSON object. Entity fields are read
/// leniently so one bad entity never hides the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub entities: BTreeMap<String, EntityRecord>,
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let entities = raw
            .into_iter()
            .map(|(id, value)| (id, EntityRecord::from_value(value)))
            .collect();
        Ok(Self { entities })
    }
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityRecord)> {
        self.entities.iter().map(|(id, record)| (id.as_str(), record))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Control(ControlToken),
    Snapshot(Snapshot),
}

/// Classify one inbound text frame. Control tokens are checked before any
/// JSON parsing is attempted.
pub fn classify(payload: &str) -> Result<Inbound, WireError> {
    if let Some(token) = ControlToken::from_payload(payload) {
        return Ok(Inbound::Control(token));
    }
    serde_json::from_str::<Snapshot>(payload)
        .map(Inbound::Snapshot)
        .map_err(WireError::MalformedSnapshot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Move,
}

/// Outbound request expressing the local player's desired direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub request: RequestKind,
    pub param: Direction,
}

impl Intent {
    pub fn move_to(direction: Direction) -> Self {
        Self {
            request: RequestKind::Move,
            param: direction,
        }
    }
}

pub fn encode_intent(intent: &Intent) -> Result<String, WireError> {
    serde_json::to_string(intent).map_err(WireError::EncodeIntent)
}
