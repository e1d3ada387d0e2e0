//! Event-channel wire format shared by the client and any room server.
//!
//! Frames are JSON text. Outbound: `{"event", "data", "ack"?}`; a frame carrying `ack` expects
//! a reply `{"ack", "data"}`. Inbound events use the same `{"event", "data"}` shape, and the
//! server's first frame is `connect` carrying the session id.

use crate::snapshot::{parse_color, Snapshot};
use crate::{Rgb, Slot, Vec2, Wall, CREATE_SPAWN, JOIN_SPAWN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Correlates an acknowledged call with its reply.
pub type AckId = u64;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("frame has neither an event name nor an ack id")]
    MissingEvent,
    #[error("connect frame carries no session id")]
    MissingSessionId,
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Client to server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping {},
    CreateRoom {
        room_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    JoinRoom {
        room_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    StartGame {},
    LeaveRoom {},
    UpdatePosition {
        x: f32,
        y: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    GetGameState {},
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Ping {} => "ping",
            ClientEvent::CreateRoom { .. } => "create_room",
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::StartGame {} => "start_game",
            ClientEvent::LeaveRoom {} => "leave_room",
            ClientEvent::UpdatePosition { .. } => "update_position",
            ClientEvent::GetGameState {} => "get_game_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub event: ClientEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckId>,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    event: Option<String>,
    #[serde(default)]
    data: Value,
    ack: Option<AckId>,
}

/// Decoded server to client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Connect { session_id: String },
    Event(ServerEvent),
    Ack { id: AckId, payload: Value },
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawInbound = serde_json::from_str(text)?;

        if let Some(id) = raw.ack {
            return Ok(InboundFrame::Ack {
                id,
                payload: raw.data,
            });
        }

        match raw.event.as_deref() {
            Some("connect") => raw
                .data
                .get("sid")
                .and_then(Value::as_str)
                .map(|sid| InboundFrame::Connect {
                    session_id: sid.to_string(),
                })
                .ok_or(ProtocolError::MissingSessionId),
            Some(name) => Ok(InboundFrame::Event(ServerEvent::from_wire(name, raw.data)?)),
            None => Err(ProtocolError::MissingEvent),
        }
    }
}

/// Server pushed events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    GameState(Snapshot),
    PlayerJoined(RosterUpdate),
    PlayerLeft(RosterUpdate),
    GameStarted(GameStarted),
    Other { name: String },
}

impl ServerEvent {
    pub fn from_wire(name: &str, data: Value) -> Result<Self, ProtocolError> {
        let event = match name {
            "game_state" => ServerEvent::GameState(Snapshot::parse(&data)?),
            "player_joined" => ServerEvent::PlayerJoined(RosterUpdate::from_value(&data)),
            "player_left" => ServerEvent::PlayerLeft(RosterUpdate::from_value(&data)),
            "game_started" => ServerEvent::GameStarted(GameStarted::from_value(&data)),
            other => ServerEvent::Other {
                name: other.to_string(),
            },
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: String,
    pub username: Option<String>,
    pub is_host: bool,
}

impl RosterEntry {
    /// Entries without a string `id` are unusable and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(Value::as_str)?;
        Some(Self {
            id: id.to_string(),
            username: value
                .get("username")
                .and_then(Value::as_str)
                .map(str::to_owned),
            is_host: value
                .get("is_host")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Keeps the usable entries of a wire `player_list`; anything but an array is empty.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|entries| entries.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

/// Payload of `player_joined` and `player_left`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterUpdate {
    pub player_list: Vec<RosterEntry>,
    pub new_host: Option<String>,
}

impl RosterUpdate {
    fn from_value(data: &Value) -> Self {
        Self {
            player_list: data
                .get("player_list")
                .map(RosterEntry::list_from_value)
                .unwrap_or_default(),
            new_host: data
                .get("new_host")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStarted {
    pub snapshot: Option<Snapshot>,
    pub walls: Option<Vec<Wall>>,
}

impl GameStarted {
    /// Infallible. A `game_state` that is not an object is dropped, and `walls` is only taken
    /// when it is an array.
    fn from_value(data: &Value) -> Self {
        let snapshot = data
            .get("game_state")
            .and_then(|v| Snapshot::parse(v).ok());
        let walls = data
            .get("walls")
            .filter(|v| v.is_array())
            .map(Wall::list_from_value);
        Self { snapshot, walls }
    }
}

/// Reply to `ping`, `start_game`, `leave_room` and `get_game_state`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub game_state: Option<Value>,
}

impl ActionReply {
    /// Lenient: any payload that does not decode counts as a failed action without a message.
    pub fn from_value(payload: &Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_default()
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}

/// Everything a successful `create_room` / `join_room` hands the client.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomGrant {
    pub color: Option<Rgb>,
    pub slot: Slot,
    pub spawn: Vec2,
    pub walls: Vec<Wall>,
    pub is_host: bool,
    pub player_list: Vec<RosterEntry>,
    pub game_started: bool,
    pub game_state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomReply {
    Accepted(RoomGrant),
    Rejected { message: String },
}

impl RoomReply {
    /// Decodes a room reply. `creator` picks the fallback spawn when coordinates are absent.
    ///
    /// Only a payload that is not an object is an error. Every field is read on its own, so
    /// a bad wall or roster entry costs that entry and nothing else.
    pub fn from_value(payload: &Value, creator: bool) -> Result<Self, ProtocolError> {
        let obj = payload.as_object().ok_or(ProtocolError::NotAnObject)?;
        let flag = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);
        let number = |key: &str| obj.get(key).and_then(Value::as_f64).map(|n| n as f32);

        if !flag("success") {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Ok(RoomReply::Rejected {
                message: message.to_string(),
            });
        }

        let fallback = if creator { CREATE_SPAWN } else { JOIN_SPAWN };
        let spawn = Vec2::new(
            number("x").unwrap_or(fallback.x),
            number("y").unwrap_or(fallback.y),
        );

        Ok(RoomReply::Accepted(RoomGrant {
            color: obj.get("color").and_then(parse_color),
            slot: obj
                .get("position_index")
                .and_then(Value::as_u64)
                .and_then(|slot| Slot::try_from(slot).ok())
                .unwrap_or(0),
            spawn,
            walls: obj
                .get("walls")
                .map(Wall::list_from_value)
                .unwrap_or_default(),
            is_host: flag("is_host"),
            player_list: obj
                .get("player_list")
                .map(RosterEntry::list_from_value)
                .unwrap_or_default(),
            game_started: flag("game_started"),
            game_state: obj.get("game_state").filter(|v| !v.is_null()).cloned(),
        }))
    }
}
