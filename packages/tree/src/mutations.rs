//! # Tree Mutations
//!
//! Structural operations on a [`TreeCollection`]. All of them are pure: the
//! receiver is never modified, a new collection is returned.
//!
//! ## Mutation Semantics
//!
//! ### Insert
//! - Stores the value (minus its `id`) and places a new leaf node
//! - Root is the virtual parent `_root`
//! - Unknown parent leaves the item stored but unplaced (orphan)
//! - Re-inserting a placed id refreshes its data, never duplicates the node
//!
//! ### Update
//! - Shallow merge, or full replacement with `replace`
//! - Never changes structural position
//! - No-op if the id has no stored item
//!
//! ### Delete
//! - Removes the node and every descendant from both `tree` and `items`
//! - No-op if the id is not placed
//!
//! ### Move
//! - Detaches the node object with its children still attached and places
//!   it under the new parent
//! - No-op if the id is not placed, or if the new parent cannot be found
//!   once the node is detached (which also covers moving into itself or a
//!   descendant)

use crate::{InsertPosition, ItemData, TreeCollection, TreeNode, ROOT_PARENT_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural tree operations as data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TreeMutation {
    #[serde(rename_all = "camelCase")]
    Insert {
        value: ItemData,
        #[serde(default = "root_parent")]
        parent_id: String,
        #[serde(default)]
        position: InsertPosition,
    },

    Update {
        id: String,
        value: ItemData,
        #[serde(default)]
        replace: bool,
    },

    Delete {
        id: String,
    },

    #[serde(rename_all = "camelCase")]
    Move {
        id: String,
        #[serde(default = "root_parent")]
        parent_id: String,
        #[serde(default)]
        position: InsertPosition,
    },
}

fn root_parent() -> String {
    ROOT_PARENT_ID.to_string()
}

impl TreeMutation {
    /// Apply to `collection`, returning the resulting collection
    pub fn apply(&self, collection: &TreeCollection) -> TreeCollection {
        match self {
            TreeMutation::Insert {
                value,
                parent_id,
                position,
            } => collection.insert(value, parent_id, position),
            TreeMutation::Update { id, value, replace } => collection.update(id, value, *replace),
            TreeMutation::Delete { id } => collection.delete(id),
            TreeMutation::Move {
                id,
                parent_id,
                position,
            } => collection.move_node(id, parent_id, position),
        }
    }

    /// The id this mutation addresses, if it carries one
    pub fn target_id(&self) -> Option<&str> {
        match self {
            TreeMutation::Insert { value, .. } => value.get("id").and_then(Value::as_str),
            TreeMutation::Update { id, .. }
            | TreeMutation::Delete { id }
            | TreeMutation::Move { id, .. } => Some(id),
        }
    }
}

impl TreeCollection {
    /// Store `value` under `value.id` and place it under `parent_id`.
    pub fn insert(&self, value: &ItemData, parent_id: &str, position: &InsertPosition) -> Self {
        let mut next = self.clone();
        let Some(id) = value.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) else {
            return next;
        };

        next.items.insert(id.to_string(), strip_id(value));

        if next.contains_node(id) {
            return next;
        }

        // An unknown parent hands the node back; the item stays an orphan.
        let _ = place_node(&mut next.tree, parent_id, TreeNode::leaf(id), position);
        next
    }

    /// Merge (or with `replace`, overwrite) the attributes of `id`.
    pub fn update(&self, id: &str, value: &ItemData, replace: bool) -> Self {
        let mut next = self.clone();
        let Some(existing) = next.items.get_mut(id) else {
            return next;
        };

        if replace {
            *existing = strip_id(value);
        } else {
            for (key, field) in value {
                if key != "id" {
                    existing.insert(key.clone(), field.clone());
                }
            }
        }
        next
    }

    /// Remove `id` and its whole subtree from the forest and from `items`.
    pub fn delete(&self, id: &str) -> Self {
        let mut next = self.clone();
        let Some(removed) = detach_node(&mut next.tree, id) else {
            return next;
        };

        let mut removed_ids = Vec::new();
        collect_subtree_ids(&removed, &mut removed_ids);
        for removed_id in removed_ids {
            next.items.remove(&removed_id);
        }
        next
    }

    /// Relocate `id` (with its descendants) under `parent_id`.
    pub fn move_node(&self, id: &str, parent_id: &str, position: &InsertPosition) -> Self {
        let mut next = self.clone();
        let Some(node) = detach_node(&mut next.tree, id) else {
            return next;
        };

        match place_node(&mut next.tree, parent_id, node, position) {
            Ok(()) => next,
            Err(_) => self.clone(),
        }
    }
}

fn strip_id(value: &ItemData) -> ItemData {
    let mut data = value.clone();
    data.remove("id");
    data
}

/// Insert `node` among the children of `parent_id`; hands the node back
/// when the parent is not in the forest.
fn place_node(
    nodes: &mut Vec<TreeNode>,
    parent_id: &str,
    node: TreeNode,
    position: &InsertPosition,
) -> Result<(), TreeNode> {
    if parent_id == ROOT_PARENT_ID {
        let index = position.index_in(nodes);
        nodes.insert(index, node);
        return Ok(());
    }

    match find_node_mut(nodes, parent_id) {
        Some(parent) => {
            let index = position.index_in(&parent.children);
            parent.children.insert(index, node);
            Ok(())
        }
        None => Err(node),
    }
}

fn find_node_mut<'a>(nodes: &'a mut [TreeNode], id: &str) -> Option<&'a mut TreeNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Remove the first node with `id` in pre-order from its parent list, the
/// same node `find_node` reports
fn detach_node(nodes: &mut Vec<TreeNode>, id: &str) -> Option<TreeNode> {
    for index in 0..nodes.len() {
        if nodes[index].id == id {
            return Some(nodes.remove(index));
        }
        if let Some(removed) = detach_node(&mut nodes[index].children, id) {
            return Some(removed);
        }
    }
    None
}

fn collect_subtree_ids(node: &TreeNode, out: &mut Vec<String>) {
    out.push(node.id.clone());
    for child in &node.children {
        collect_subtree_ids(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> ItemData {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_insert_strips_id_from_item_data() {
        let collection = TreeCollection::new().insert(
            &data(json!({ "id": "a", "name": "A" })),
            ROOT_PARENT_ID,
            &InsertPosition::First,
        );

        assert_eq!(collection.items["a"], data(json!({ "name": "A" })));
        assert_eq!(collection.tree, vec![TreeNode::leaf("a")]);
    }

    #[test]
    fn test_insert_without_id_is_noop() {
        let collection = TreeCollection::new().insert(
            &data(json!({ "name": "nameless" })),
            ROOT_PARENT_ID,
            &InsertPosition::Last,
        );
        assert!(collection.is_empty());
        assert!(collection.tree.is_empty());
    }

    #[test]
    fn test_insert_under_unknown_parent_leaves_orphan() {
        let collection = TreeCollection::new().insert(
            &data(json!({ "id": "a" })),
            "ghost",
            &InsertPosition::Last,
        );
        assert!(collection.items.contains_key("a"));
        assert!(collection.tree.is_empty());
    }

    #[test]
    fn test_update_merges_and_replaces() {
        let base = TreeCollection::new().insert(
            &data(json!({ "id": "a", "name": "A", "color": "red" })),
            ROOT_PARENT_ID,
            &InsertPosition::First,
        );

        let merged = base.update("a", &data(json!({ "id": "zzz", "name": "B" })), false);
        assert_eq!(merged.items["a"], data(json!({ "name": "B", "color": "red" })));

        let replaced = base.update("a", &data(json!({ "name": "C" })), true);
        assert_eq!(replaced.items["a"], data(json!({ "name": "C" })));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let base = TreeCollection::new();
        let next = base.update("missing", &data(json!({ "name": "x" })), false);
        assert_eq!(base, next);
    }

    #[test]
    fn test_move_into_own_descendant_is_noop() {
        let base = TreeCollection::new()
            .insert(&data(json!({ "id": "a" })), ROOT_PARENT_ID, &InsertPosition::Last)
            .insert(&data(json!({ "id": "b" })), "a", &InsertPosition::Last);

        let next = base.move_node("a", "b", &InsertPosition::Last);
        assert_eq!(base, next);
    }

    #[test]
    fn test_repeated_id_detaches_the_node_find_reports() {
        // x sits under a and again at the root
        let base = TreeCollection {
            items: [("a", json!({})), ("x", json!({})), ("y", json!({}))]
                .into_iter()
                .map(|(id, v)| (id.to_string(), data(v)))
                .collect(),
            tree: vec![
                TreeNode::with_children("a", vec![TreeNode::leaf("x")]),
                TreeNode::with_children("x", vec![TreeNode::leaf("y")]),
            ],
        };
        assert!(base.find_node("x").is_some_and(|n| n.children.is_empty()));

        let deleted = base.delete("x");
        assert!(deleted.tree[0].children.is_empty());
        assert_eq!(deleted.tree[1].id, "x");
        assert_eq!(deleted.tree[1].children, vec![TreeNode::leaf("y")]);

        let moved = base.move_node("x", ROOT_PARENT_ID, &InsertPosition::First);
        assert_eq!(moved.tree[0], TreeNode::leaf("x"));
        assert!(moved.tree[1].children.is_empty());
    }

    #[test]
    fn test_mutation_enum_round_trips_through_json() {
        let mutation: TreeMutation = serde_json::from_value(json!({
            "op": "move",
            "id": "a",
            "parentId": "f1",
            "position": { "after": "b" }
        }))
        .unwrap();

        assert_eq!(
            mutation,
            TreeMutation::Move {
                id: "a".to_string(),
                parent_id: "f1".to_string(),
                position: InsertPosition::After("b".to_string()),
            }
        );
        assert_eq!(mutation.target_id(), Some("a"));
    }

    #[test]
    fn test_receiver_is_never_modified() {
        let base = TreeCollection::new().insert(
            &data(json!({ "id": "a" })),
            ROOT_PARENT_ID,
            &InsertPosition::First,
        );
        let snapshot = base.clone();

        let _ = base.delete("a");
        let _ = base.update("a", &data(json!({ "name": "x" })), true);
        let _ = base.move_node("a", ROOT_PARENT_ID, &InsertPosition::Last);

        assert_eq!(base, snapshot);
    }
}
