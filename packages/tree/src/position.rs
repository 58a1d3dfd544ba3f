//! Sibling placement for insert and move.

use crate::TreeNode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Where a node lands among its new siblings.
///
/// Wire form is `"first"`, `"last"`, `{ "before": id }` or `{ "after": id }`.
/// Anything else reads as `First`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InsertPosition {
    #[default]
    First,
    Last,
    Before(String),
    After(String),
}

impl InsertPosition {
    /// Normalize an arbitrary JSON value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) if s == "last" => InsertPosition::Last,
            Value::Object(map) => {
                if let Some(id) = map.get("before").and_then(Value::as_str) {
                    InsertPosition::Before(id.to_string())
                } else if let Some(id) = map.get("after").and_then(Value::as_str) {
                    InsertPosition::After(id.to_string())
                } else {
                    InsertPosition::First
                }
            }
            _ => InsertPosition::First,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            InsertPosition::First => json!("first"),
            InsertPosition::Last => json!("last"),
            InsertPosition::Before(id) => json!({ "before": id }),
            InsertPosition::After(id) => json!({ "after": id }),
        }
    }

    /// Index at which to insert into `siblings`.
    ///
    /// An anchor that is not among the siblings prepends.
    pub(crate) fn index_in(&self, siblings: &[TreeNode]) -> usize {
        match self {
            InsertPosition::First => 0,
            InsertPosition::Last => siblings.len(),
            InsertPosition::Before(anchor) => siblings
                .iter()
                .position(|s| s.id == *anchor)
                .unwrap_or(0),
            InsertPosition::After(anchor) => siblings
                .iter()
                .position(|s| s.id == *anchor)
                .map(|i| i + 1)
                .unwrap_or(0),
        }
    }
}

impl Serialize for InsertPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InsertPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(InsertPosition::from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_normalizes_to_first() {
        for garbage in [json!(null), json!(3), json!("middle"), json!({ "beside": "x" }), json!([])] {
            let position: InsertPosition = serde_json::from_value(garbage).unwrap();
            assert_eq!(position, InsertPosition::First);
        }
    }

    #[test]
    fn test_wire_forms() {
        let before: InsertPosition = serde_json::from_value(json!({ "before": "a" })).unwrap();
        let after: InsertPosition = serde_json::from_value(json!({ "after": "b" })).unwrap();
        let last: InsertPosition = serde_json::from_value(json!("last")).unwrap();

        assert_eq!(before, InsertPosition::Before("a".to_string()));
        assert_eq!(after, InsertPosition::After("b".to_string()));
        assert_eq!(last, InsertPosition::Last);
        assert_eq!(serde_json::to_value(&after).unwrap(), json!({ "after": "b" }));
    }

    #[test]
    fn test_unknown_anchor_prepends() {
        let siblings = [TreeNode::leaf("a"), TreeNode::leaf("b")];

        assert_eq!(InsertPosition::Before("zz".into()).index_in(&siblings), 0);
        assert_eq!(InsertPosition::After("zz".into()).index_in(&siblings), 0);
        assert_eq!(InsertPosition::After("a".into()).index_in(&siblings), 1);
        assert_eq!(InsertPosition::Last.index_in(&siblings), 2);
    }
}
