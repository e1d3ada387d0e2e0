use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::{Add, Mul, Sub};

pub mod protocol;
pub mod snapshot;

pub use protocol::{
    AckId, ActionReply, ClientEvent, GameStarted, InboundFrame, OutboundFrame, ProtocolError,
    RoomGrant, RoomReply, RosterEntry, RosterUpdate, ServerEvent,
};
pub use snapshot::{PlayerInfo, Snapshot, SnapshotEntry};

pub const MAP_WIDTH: f32 = 2400.0;
pub const MAP_HEIGHT: f32 = 1800.0;
pub const PLAYER_SIZE: f32 = 40.0;
pub const PLAYER_SPEED: f32 = 5.0;
pub const SCREEN_WIDTH: f32 = 800.0;
pub const SCREEN_HEIGHT: f32 = 600.0;
pub const DEFAULT_WALL_SIZE: f32 = 50.0;

/// Spawn used when a room reply omits coordinates for the room creator.
pub const CREATE_SPAWN: Vec2 = Vec2 { x: 80.0, y: 80.0 };
/// Spawn used when a room reply omits coordinates for a joining player.
pub const JOIN_SPAWN: Vec2 = Vec2 {
    x: MAP_WIDTH - 120.0,
    y: MAP_HEIGHT - 120.0,
};

/// Server-assigned per-room player index.
pub type Slot = u32;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (other - *self).length()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Player color as sent on the wire: `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

/// Playable area, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    pub width: f32,
    pub height: f32,
}

impl MapBounds {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamps the top-left corner of a `size`-sided box so the box stays inside the map.
    pub fn clamp_box(&self, position: Vec2, size: f32) -> Vec2 {
        Vec2::new(
            position.x.clamp(0.0, (self.width - size).max(0.0)),
            position.y.clamp(0.0, (self.height - size).max(0.0)),
        )
    }

    pub fn contains_box(&self, position: Vec2, size: f32) -> bool {
        position.x >= 0.0
            && position.y >= 0.0
            && position.x <= self.width - size
            && position.y <= self.height - size
    }
}

impl Default for MapBounds {
    fn default() -> Self {
        Self::new(MAP_WIDTH, MAP_HEIGHT)
    }
}

/// Static axis-aligned obstacle, fixed for the lifetime of a room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Wall {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Decodes one wire wall. Missing or non-numeric coordinates become 0 and missing or zero
    /// sizes become [`DEFAULT_WALL_SIZE`]; anything that is not an object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let number = |key: &str| obj.get(key).and_then(Value::as_f64).map(|n| n as f32);
        let size = |key: &str| {
            number(key)
                .filter(|n| *n != 0.0)
                .unwrap_or(DEFAULT_WALL_SIZE)
        };

        Some(Self {
            x: number("x").unwrap_or(0.0),
            y: number("y").unwrap_or(0.0),
            width: size("width"),
            height: size("height"),
        })
    }

    /// Decodes a wire wall list entry by entry. A null or non-array list is empty.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|walls| walls.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Strict AABB overlap with a `size`-sided box; touching edges do not count.
    pub fn overlaps_box(&self, position: Vec2, size: f32) -> bool {
        position.x < self.x + self.width
            && position.x + size > self.x
            && position.y < self.y + self.height
            && position.y + size > self.y
    }
}
