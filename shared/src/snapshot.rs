//! Validated view of a `game_state` payload.
//!
//! The server sends a JSON object keyed by session id. Each entry is checked once here and
//! becomes either [`SnapshotEntry::Valid`] or [`SnapshotEntry::Invalid`], so nothing past the
//! transport boundary has to check optional fields.

use crate::protocol::ProtocolError;
use crate::{Rgb, Slot, Vec2};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub position: Vec2,
    pub color: Rgb,
    pub slot: Slot,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEntry {
    Valid(PlayerInfo),
    Invalid { reason: &'static str },
}

/// Full authoritative mapping of session id to player state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<(String, SnapshotEntry)>,
}

impl Snapshot {
    /// Parses a wire snapshot. Only a non-object payload is an error; bad entries are kept
    /// as [`SnapshotEntry::Invalid`].
    pub fn parse(value: &Value) -> Result<Self, ProtocolError> {
        let map = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        let entries = map
            .iter()
            .map(|(session_id, info)| (session_id.clone(), parse_entry(info)))
            .collect();

        Ok(Self { entries })
    }

    pub fn from_players<I, S>(players: I) -> Self
    where
        I: IntoIterator<Item = (S, PlayerInfo)>,
        S: Into<String>,
    {
        Self {
            entries: players
                .into_iter()
                .map(|(sid, info)| (sid.into(), SnapshotEntry::Valid(info)))
                .collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &SnapshotEntry)> {
        self.entries.iter().map(|(sid, entry)| (sid.as_str(), entry))
    }

    pub fn valid(&self) -> impl Iterator<Item = (&str, &PlayerInfo)> {
        self.entries().filter_map(|(sid, entry)| match entry {
            SnapshotEntry::Valid(info) => Some((sid, info)),
            SnapshotEntry::Invalid { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire form, the same shape the server pushes.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (sid, info) in self.valid() {
            let mut entry = serde_json::json!({
                "x": info.position.x,
                "y": info.position.y,
                "color": info.color,
                "position_index": info.slot,
            });
            if let (Some(name), Some(obj)) = (&info.username, entry.as_object_mut()) {
                obj.insert("username".to_string(), Value::String(name.clone()));
            }
            map.insert(sid.to_string(), entry);
        }
        Value::Object(map)
    }
}

fn parse_entry(info: &Value) -> SnapshotEntry {
    let Some(obj) = info.as_object() else {
        return SnapshotEntry::Invalid {
            reason: "entry is not an object",
        };
    };

    let (Some(x), Some(y)) = (
        obj.get("x").and_then(Value::as_f64),
        obj.get("y").and_then(Value::as_f64),
    ) else {
        return SnapshotEntry::Invalid {
            reason: "missing position",
        };
    };

    let Some(color) = obj.get("color").and_then(parse_color) else {
        return SnapshotEntry::Invalid {
            reason: "missing color",
        };
    };

    let Some(slot) = obj
        .get("position_index")
        .and_then(Value::as_u64)
        .and_then(|slot| Slot::try_from(slot).ok())
    else {
        return SnapshotEntry::Invalid {
            reason: "missing slot",
        };
    };

    let username = obj
        .get("username")
        .and_then(Value::as_str)
        .map(str::to_owned);

    SnapshotEntry::Valid(PlayerInfo {
        position: Vec2::new(x as f32, y as f32),
        color,
        slot,
        username,
    })
}

pub(crate) fn parse_color(value: &Value) -> Option<Rgb> {
    let channels = value.as_array()?;
    if channels.len() < 3 {
        return None;
    }

    let mut rgb = [0u8; 3];
    for (out, channel) in rgb.iter_mut().zip(channels) {
        *out = u8::try_from(channel.as_u64()?).ok()?;
    }
    Some(Rgb(rgb))
}
