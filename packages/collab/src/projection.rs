//! # Committed-Event Projection
//!
//! Folds server-committed legacy events into a JSON project state. This is
//! the only place project state changes, and it is crate-private: the UI
//! reads through `CollabSession::state` and writes only by submitting
//! commands.
//!
//! ## Event Semantics
//!
//! - `set`: writes at the dot path, creating intermediate objects. Without
//!   `replace`, an object value is shallow-merged into an existing object
//! - `unset`: removes the key; a missing path is a no-op
//! - `node*`: the value at `target` is a tree collection and the matching
//!   tree mutation is applied to it. A missing collection starts empty; a
//!   non-object value at `target` makes the event a no-op. Fields of the
//!   collection object other than `items` and `tree` are kept
//! - `init`: replaces the whole state with an object value

use routevn_protocol::{LegacyEvent, LegacyEventKind};
use routevn_tree::{ItemData, TreeCollection};
use serde_json::{Map, Value};

/// Empty project document
pub(crate) fn empty_state() -> Value {
    Value::Object(Map::new())
}

/// Apply `event` to `state`, returning the new state
pub(crate) fn apply_event(state: &Value, event: &LegacyEvent) -> Value {
    let payload = &event.payload;
    let options = event.options();
    let keys: Vec<&str> = payload.target.split('.').collect();

    match event.kind {
        LegacyEventKind::Init => match &payload.value {
            Some(value @ Value::Object(_)) => value.clone(),
            _ => state.clone(),
        },

        LegacyEventKind::Set => {
            let mut next = state.clone();
            let value = payload.value.clone().unwrap_or(Value::Null);
            set_path(&mut next, &keys, value, options.replace);
            next
        }

        LegacyEventKind::Unset => {
            let mut next = state.clone();
            unset_path(&mut next, &keys);
            next
        }

        LegacyEventKind::NodeInsert
        | LegacyEventKind::NodeUpdate
        | LegacyEventKind::NodeMove
        | LegacyEventKind::NodeDelete => {
            let existing = get_path(state, &keys);
            let collection = match existing {
                None | Some(Value::Null) => TreeCollection::new(),
                Some(value @ Value::Object(_)) => TreeCollection::from_value(value),
                Some(_) => return state.clone(),
            };

            let value: ItemData = payload
                .value
                .as_ref()
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let id = options.id.as_deref().unwrap_or("");

            let updated = match event.kind {
                LegacyEventKind::NodeInsert => {
                    collection.insert(&value, options.parent_or_root(), &options.position_or_first())
                }
                LegacyEventKind::NodeUpdate => collection.update(id, &value, options.replace),
                LegacyEventKind::NodeMove => {
                    collection.move_node(id, options.parent_or_root(), &options.position_or_first())
                }
                _ => collection.delete(id),
            };

            let mut next = state.clone();
            write_collection(&mut next, &keys, &updated);
            next
        }
    }
}

/// Store `collection` at a dot path. Only `items` and `tree` are rewritten;
/// other fields of the collection object stay, a legacy `order` is dropped.
fn write_collection(state: &mut Value, keys: &[&str], collection: &TreeCollection) {
    let Value::Object(fields) = collection.to_value() else {
        return;
    };

    let mut current = state;
    for key in keys {
        current = match child_object(current, key) {
            Some(child) => child,
            None => return,
        };
    }

    if let Some(object) = as_object_forced(current) {
        object.remove("order");
        object.extend(fields);
    }
}

/// Value at a dot path, if every segment exists
pub(crate) fn get_path<'a>(state: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(state, |current, key| current.get(*key))
}

fn set_path(state: &mut Value, keys: &[&str], value: Value, replace: bool) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = state;
    for key in parents {
        current = match child_object(current, key) {
            Some(child) => child,
            None => return,
        };
    }

    let Some(object) = as_object_forced(current) else {
        return;
    };

    if !replace {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (object.get_mut(*last), &value) {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
            return;
        }
    }
    object.insert(last.to_string(), value);
}

fn unset_path(state: &mut Value, keys: &[&str]) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = state;
    for key in parents {
        match current.get_mut(*key) {
            Some(next) => current = next,
            None => return,
        }
    }

    if let Value::Object(object) = current {
        object.remove(*last);
    }
}

/// Descend into `key`, replacing anything that is not an object with `{}`
fn child_object<'a>(current: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let object = as_object_forced(current)?;
    let child = object
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    Some(child)
}

fn as_object_forced(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}
