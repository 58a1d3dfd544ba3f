//! Messages exchanged between a session and the sync server.
//!
//! Every message is `{ "type": ..., "payload": { ... } }`.

use crate::command::Actor;
use crate::legacy::LegacyEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `event.type` of every submitted item
pub const SYNC_EVENT_TYPE: &str = "event";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEventPayload {
    pub schema: String,
    #[serde(rename = "commandId")]
    pub command_id: String,
    /// `{ "event": LegacyEvent }` for `legacy.event.apply`
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: SyncEventPayload,
}

impl SyncEvent {
    /// Decode the bridged legacy event from `payload.data.event`
    pub fn legacy_event(&self) -> Result<LegacyEvent, serde_json::Error> {
        let event = self.payload.data.get("event").cloned().unwrap_or(Value::Null);
        serde_json::from_value(event)
    }
}

/// What a client submits for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitItem {
    pub event: SyncEvent,
    pub partitions: Vec<String>,
}

impl SubmitItem {
    pub fn command_id(&self) -> &str {
        &self.event.payload.command_id
    }
}

/// A submission the server accepted, stamped with its log position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedEvent {
    pub cursor: u64,
    pub command_id: String,
    pub partitions: Vec<String>,
    pub event: SyncEvent,
    pub actor: Actor,
    /// Epoch milliseconds
    pub committed_at: i64,
}

impl CommittedEvent {
    pub fn touches(&self, partitions: &[String]) -> bool {
        self.partitions.iter().any(|p| partitions.contains(p))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        token: String,
    },
    /// Subscribe to `partitions` and request everything after `since`
    #[serde(rename_all = "camelCase")]
    Sync {
        request_id: String,
        partitions: Vec<String>,
        #[serde(default)]
        since: u64,
    },
    Submit {
        item: SubmitItem,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Accepted,
    Duplicate,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String, client_id: String },

    #[serde(rename_all = "camelCase")]
    SubmitResult {
        command_id: String,
        status: SubmitStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<u64>,
    },

    Committed { event: CommittedEvent },

    /// `cursor` is the newest committed position across the requested
    /// partitions
    #[serde(rename_all = "camelCase")]
    SyncResponse {
        request_id: String,
        cursor: u64,
        events: Vec<CommittedEvent>,
    },

    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_are_type_payload_tagged() {
        let sync = ClientMessage::Sync {
            request_id: "r1".into(),
            partitions: vec!["project:p1:story".into()],
            since: 3,
        };

        assert_eq!(
            serde_json::to_value(&sync).unwrap(),
            json!({
                "type": "sync",
                "payload": { "requestId": "r1", "partitions": ["project:p1:story"], "since": 3 }
            })
        );
    }

    #[test]
    fn test_submit_result_omits_empty_fields() {
        let result = ServerMessage::SubmitResult {
            command_id: "c1".into(),
            status: SubmitStatus::Duplicate,
            reason: None,
            message: None,
            cursor: None,
        };

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "type": "submit_result", "payload": { "commandId": "c1", "status": "duplicate" } })
        );
    }

    #[test]
    fn test_server_message_parses_from_text() {
        let text = r#"{"type":"connected","payload":{"userId":"u1","clientId":"c1"}}"#;
        let message: ServerMessage = serde_json::from_str(text).unwrap();

        assert_eq!(
            message,
            ServerMessage::Connected {
                user_id: "u1".into(),
                client_id: "c1".into()
            }
        );
    }

    #[test]
    fn test_legacy_event_decodes_from_sync_event() {
        let event = SyncEvent {
            kind: SYNC_EVENT_TYPE.into(),
            payload: SyncEventPayload {
                schema: "legacy.event.apply".into(),
                command_id: "c1".into(),
                data: json!({ "event": { "type": "unset", "payload": { "target": "story.title" } } }),
            },
        };
        assert_eq!(event.legacy_event().unwrap(), LegacyEvent::unset("story.title"));

        let mut broken = event.clone();
        broken.payload.data = json!({});
        assert!(broken.legacy_event().is_err());
    }
}
