//! The path-addressed edit vocabulary the application already speaks.
//!
//! ```json
//! { "type": "nodeInsert",
//!   "payload": { "target": "images", "value": { "id": "img-1", "name": "Sky" },
//!                "options": { "parent": "folder-1", "position": "last" } } }
//! ```

use routevn_tree::{InsertPosition, ROOT_PARENT_ID};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacyEventKind {
    /// Write (or shallow-merge) a value at a dot path
    Set,
    /// Remove the key at a dot path
    Unset,
    NodeInsert,
    NodeUpdate,
    NodeMove,
    NodeDelete,
    /// Replace the whole document
    Init,
}

impl LegacyEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyEventKind::Set => "set",
            LegacyEventKind::Unset => "unset",
            LegacyEventKind::NodeInsert => "nodeInsert",
            LegacyEventKind::NodeUpdate => "nodeUpdate",
            LegacyEventKind::NodeMove => "nodeMove",
            LegacyEventKind::NodeDelete => "nodeDelete",
            LegacyEventKind::Init => "init",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<InsertPosition>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace: bool,
}

impl LegacyOptions {
    /// Parent id, `_root` when absent
    pub fn parent_or_root(&self) -> &str {
        self.parent.as_deref().unwrap_or(ROOT_PARENT_ID)
    }

    /// Position, `first` when absent
    pub fn position_or_first(&self) -> InsertPosition {
        self.position.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayload {
    /// Dot path, e.g. `scenes.items.scene-1.sections`
    #[serde(default)]
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<LegacyOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyEvent {
    #[serde(rename = "type")]
    pub kind: LegacyEventKind,
    pub payload: LegacyPayload,
}

impl LegacyEvent {
    pub fn new(kind: LegacyEventKind, payload: LegacyPayload) -> Self {
        Self { kind, payload }
    }

    pub fn set(target: impl Into<String>, value: Value) -> Self {
        Self::new(
            LegacyEventKind::Set,
            LegacyPayload {
                target: target.into(),
                value: Some(value),
                options: None,
            },
        )
    }

    pub fn unset(target: impl Into<String>) -> Self {
        Self::new(
            LegacyEventKind::Unset,
            LegacyPayload {
                target: target.into(),
                ..Default::default()
            },
        )
    }

    /// Insert `value` (which carries its own `id`) into the collection at `target`
    pub fn node_insert(
        target: impl Into<String>,
        value: Value,
        parent: Option<&str>,
        position: InsertPosition,
    ) -> Self {
        Self::new(
            LegacyEventKind::NodeInsert,
            LegacyPayload {
                target: target.into(),
                value: Some(value),
                options: Some(LegacyOptions {
                    parent: parent.map(str::to_string),
                    position: Some(position),
                    ..Default::default()
                }),
            },
        )
    }

    pub fn node_update(target: impl Into<String>, id: &str, value: Value, replace: bool) -> Self {
        Self::new(
            LegacyEventKind::NodeUpdate,
            LegacyPayload {
                target: target.into(),
                value: Some(value),
                options: Some(LegacyOptions {
                    id: Some(id.to_string()),
                    replace,
                    ..Default::default()
                }),
            },
        )
    }

    pub fn node_move(
        target: impl Into<String>,
        id: &str,
        parent: Option<&str>,
        position: InsertPosition,
    ) -> Self {
        Self::new(
            LegacyEventKind::NodeMove,
            LegacyPayload {
                target: target.into(),
                value: None,
                options: Some(LegacyOptions {
                    id: Some(id.to_string()),
                    parent: parent.map(str::to_string),
                    position: Some(position),
                    ..Default::default()
                }),
            },
        )
    }

    pub fn node_delete(target: impl Into<String>, id: &str) -> Self {
        Self::new(
            LegacyEventKind::NodeDelete,
            LegacyPayload {
                target: target.into(),
                value: None,
                options: Some(LegacyOptions {
                    id: Some(id.to_string()),
                    ..Default::default()
                }),
            },
        )
    }

    pub fn init(value: Map<String, Value>) -> Self {
        Self::new(
            LegacyEventKind::Init,
            LegacyPayload {
                target: String::new(),
                value: Some(Value::Object(value)),
                options: None,
            },
        )
    }

    pub fn target(&self) -> &str {
        &self.payload.target
    }

    pub fn options(&self) -> LegacyOptions {
        self.payload.options.clone().unwrap_or_default()
    }

    /// Entity id supplied outside the path.
    ///
    /// First non-empty string among `options.id`, `value.id`,
    /// `value.item.id` and `value.value.id`.
    pub fn explicit_id(&self) -> Option<&str> {
        let value = self.payload.value.as_ref();

        [
            self.payload.options.as_ref().and_then(|o| o.id.as_deref()),
            value.and_then(|v| v.get("id")).and_then(Value::as_str),
            nested_id(value, "item"),
            nested_id(value, "value"),
        ]
        .into_iter()
        .flatten()
        .find(|id| !id.is_empty())
    }
}

fn nested_id<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a str> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_matches_legacy_json() {
        let event = LegacyEvent::node_insert(
            "images",
            json!({ "id": "img-1", "name": "Sky" }),
            Some("folder-1"),
            InsertPosition::Last,
        );

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "nodeInsert",
                "payload": {
                    "target": "images",
                    "value": { "id": "img-1", "name": "Sky" },
                    "options": { "parent": "folder-1", "position": "last" }
                }
            })
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed: Result<LegacyEvent, _> =
            serde_json::from_value(json!({ "type": "explode", "payload": { "target": "x" } }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_explicit_id_precedence() {
        let mut event = LegacyEvent::set(
            "variables",
            json!({ "id": "", "item": { "id": "from-item" }, "value": { "id": "from-value" } }),
        );
        assert_eq!(event.explicit_id(), Some("from-item"));

        event.payload.options = Some(LegacyOptions {
            id: Some("from-options".to_string()),
            ..Default::default()
        });
        assert_eq!(event.explicit_id(), Some("from-options"));

        assert_eq!(LegacyEvent::unset("variables").explicit_id(), None);
    }

    #[test]
    fn test_option_defaults() {
        let options = LegacyOptions::default();
        assert_eq!(options.parent_or_root(), "_root");
        assert_eq!(options.position_or_first(), InsertPosition::First);
    }
}
