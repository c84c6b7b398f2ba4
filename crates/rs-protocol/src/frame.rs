use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Per-frame size cap (§6.1): a frame whose decoded JSON exceeds this is
/// rejected with an `error` response rather than dropping the connection.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Cap on the `action` frame's `name` field.
pub const MAX_ACTION_NAME_BYTES: usize = 256;

/// A single duplex-protocol message. Tagged on `type`, matching the closed
/// enum the read pump parses against: `init`, `sync`, `patch`, `update`,
/// `action`, `ping`, `pong`, `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// S→C, sent immediately after connect. `state` is a full snapshot.
    Init {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "sessionToken")]
        session_token: String,
        state: Map<String, Value>,
    },
    /// S→C, full snapshot replacement (snapshot mode, or a diffing-mode
    /// client's first send).
    Sync { state: Map<String, Value> },
    /// S→C, diff since the last send (diffing mode only).
    Patch {
        added: Map<String, Value>,
        removed: Vec<String>,
        changed: Map<String, Value>,
    },
    /// C→S, requests a state change for the named key.
    Update { key: String, value: Value },
    /// C→S, invokes a server-registered action handler.
    Action { name: String, payload: Value },
    /// Heartbeat, either direction.
    Ping,
    /// Heartbeat reply, either direction.
    Pong,
    /// S→C, reports a problem without closing the connection.
    Error { message: String },
}

impl Frame {
    /// The wire `type` tag, for logging without re-serializing.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Init { .. } => "init",
            Frame::Sync { .. } => "sync",
            Frame::Patch { .. } => "patch",
            Frame::Update { .. } => "update",
            Frame::Action { .. } => "action",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::Error { .. } => "error",
        }
    }

    /// Enforces the `action` name length cap. Called by the codec on decode
    /// so an oversize name is rejected before it ever reaches the
    /// `ActionRegistry`.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if let Frame::Action { name, .. } = self {
            if name.len() > MAX_ACTION_NAME_BYTES {
                return Err(ProtocolError::ActionNameTooLong);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let frame = Frame::Action {
            name: "increment".to_string(),
            payload: Value::Null,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"action\""));
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn oversize_action_name_fails_validation() {
        let frame = Frame::Action {
            name: "x".repeat(MAX_ACTION_NAME_BYTES + 1),
            payload: Value::Null,
        };
        assert!(matches!(frame.validate(), Err(ProtocolError::ActionNameTooLong)));
    }

    #[test]
    fn ping_and_pong_serialize_with_only_a_type_tag() {
        let json = serde_json::to_string(&Frame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }
}
