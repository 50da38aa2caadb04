//! Protocol messages.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sparkle_core::{Change, PrimaryKey, State};

/// A Twilight protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Message {
    /// A batch of changes. `seq == 0` marks a full snapshot.
    Update {
        /// Identifier of the sender's protocol instance.
        incarnation: String,
        /// Sequence number of this batch.
        seq: u64,
        /// Raw `[table, pkey, state, part]` entries.
        #[serde(default)]
        changes: Vec<Value>,
    },
    /// Request for a full snapshot.
    Resync,
    /// Any event this side does not understand.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Builds an update from change tuples.
    pub fn update(incarnation: impl Into<String>, seq: u64, changes: &[Change]) -> Self {
        Message::Update {
            incarnation: incarnation.into(),
            seq,
            changes: changes.iter().map(Change::to_wire).collect(),
        }
    }

    /// Builds a resync request.
    pub fn resync() -> Self {
        Message::Resync
    }

    /// Returns the event name.
    pub fn event(&self) -> &'static str {
        match self {
            Message::Update { .. } => "update",
            Message::Resync => "resync",
            Message::Unknown => "unknown",
        }
    }

    /// Returns true for a full-snapshot update.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Message::Update { seq: 0, .. })
    }

    /// Number of change entries carried.
    pub fn change_count(&self) -> usize {
        match self {
            Message::Update { changes, .. } => changes.len(),
            _ => 0,
        }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Converts from a JSON value.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Decodes one change entry.
///
/// Only the shape is checked here: a four-element array of table name,
/// scalar or list primary key, state name, and object or null part. A list
/// key becomes a composite key. Whether the sender may report the change at
/// all is decided by the receiver.
pub fn decode_change(entry: &Value) -> ProtocolResult<Change> {
    let items = entry
        .as_array()
        .ok_or_else(|| ProtocolError::malformed("change is not an array"))?;
    let [table, pkey, state, part] = items.as_slice() else {
        return Err(ProtocolError::malformed(format!(
            "expected 4 elements, got {}",
            items.len()
        )));
    };

    let table = table
        .as_str()
        .ok_or_else(|| ProtocolError::malformed("table name is not a string"))?;

    if pkey.is_object() {
        return Err(ProtocolError::malformed("primary key is an object"));
    }
    let pkey = PrimaryKey::from_value(pkey);

    let state = state
        .as_str()
        .and_then(State::parse)
        .ok_or_else(|| ProtocolError::malformed(format!("unknown state {state}")))?;

    let part = match part {
        Value::Null => None,
        Value::Object(map) => Some(map.clone()),
        other => {
            return Err(ProtocolError::malformed(format!(
                "part is neither an object nor null: {other}"
            )))
        }
    };

    Ok(Change::new(table, pkey, state, part))
}
