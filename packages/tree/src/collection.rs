//! # Tree Collection
//!
//! The stored shape of every hierarchical project collection.
//!
//! A collection is two halves that must agree with each other:
//! - `items`: attribute maps keyed by id
//! - `tree`: ordered forest of `{ id, children }` nodes
//!
//! Every id placed in the forest has an `items` entry. An id may appear in
//! `items` without a forest node (an orphan), which views simply ignore.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Virtual parent id addressing the top level of the forest.
pub const ROOT_PARENT_ID: &str = "_root";

/// Arbitrary item attributes (name, type, resource refs, ...).
pub type ItemData = Map<String, Value>;

/// One node of the forest. A node without children is a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(id: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Items plus their forest arrangement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeCollection {
    #[serde(default)]
    pub items: BTreeMap<String, ItemData>,

    /// Older project files call this `order`
    #[serde(default, alias = "order")]
    pub tree: Vec<TreeNode>,
}

impl TreeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from loosely-shaped JSON.
    ///
    /// Anything that is not an object item or an `{ id }` node is skipped,
    /// so a damaged project file degrades instead of failing to load.
    ///
    /// Older files keep the hierarchy in `items[*].parentId` and either have
    /// no order at all or a flat list of id strings. For those the forest is
    /// rebuilt from the parent links, in list order followed by any
    /// remaining items.
    pub fn from_value(value: &Value) -> Self {
        let items = value
            .get("items")
            .and_then(Value::as_object)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|(id, data)| data.as_object().map(|d| (id.clone(), d.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let order = value
            .get("tree")
            .or_else(|| value.get("order"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let tree = if order.is_empty() {
            hierarchy_from_parent_ids(&items, Vec::new())
        } else if order.iter().any(Value::is_string) {
            hierarchy_from_parent_ids(&items, legacy_order_ids(order))
        } else {
            nodes_from_value(order)
        };

        Self { items, tree }
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        let items = self
            .items
            .iter()
            .map(|(id, data)| (id.clone(), Value::Object(data.clone())))
            .collect();
        out.insert("items".to_string(), Value::Object(items));
        out.insert(
            "tree".to_string(),
            Value::Array(self.tree.iter().map(node_to_value).collect()),
        );
        Value::Object(out)
    }

    /// Item attributes for `id`, if stored
    pub fn item(&self, id: &str) -> Option<&ItemData> {
        self.items.get(id)
    }

    /// Find the first node with `id` (depth-first, document order)
    pub fn find_node(&self, id: &str) -> Option<&TreeNode> {
        find_in(&self.tree, id)
    }

    /// Whether `id` is placed anywhere in the forest
    pub fn contains_node(&self, id: &str) -> bool {
        self.find_node(id).is_some()
    }

    /// Forest ids in pre-order; a repeated id is reported once.
    pub fn node_ids(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        collect_unique(&self.tree, &mut visited, &mut out);
        out
    }

    /// Number of stored items (placed or orphaned)
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn name_of(&self, id: &str) -> Option<&str> {
        self.items
            .get(id)
            .and_then(|data| data.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub(crate) fn is_folder(&self, id: &str) -> bool {
        self.items
            .get(id)
            .and_then(|data| data.get("type"))
            .and_then(Value::as_str)
            == Some("folder")
    }
}

fn nodes_from_value(entries: &[Value]) -> Vec<TreeNode> {
    entries
        .iter()
        .filter_map(|entry| {
            let node = entry.as_object()?;
            let id = node.get("id")?.as_str()?;
            let children = node
                .get("children")
                .and_then(Value::as_array)
                .map(|children| nodes_from_value(children))
                .unwrap_or_default();
            Some(TreeNode::with_children(id, children))
        })
        .collect()
}

/// Ids of a legacy order list, which may mix id strings and `{ id }` nodes
fn legacy_order_ids(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(id) => Some(id.clone()),
            Value::Object(node) => node.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

/// Forest described by `items[*].parentId`.
///
/// Siblings keep the order of `ordered` (unknown ids dropped), then items
/// it did not mention. A missing, unknown or self-referencing parent puts
/// the item at the root. Items caught in a parent cycle never hang below a
/// root and are appended as root leaves.
fn hierarchy_from_parent_ids(items: &BTreeMap<String, ItemData>, ordered: Vec<String>) -> Vec<TreeNode> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = ordered
        .into_iter()
        .filter(|id| items.contains_key(id))
        .chain(items.keys().cloned())
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let mut children: HashMap<Option<&str>, Vec<&str>> = HashMap::new();
    for id in &ids {
        let parent = items
            .get(id)
            .and_then(|data| data.get("parentId"))
            .and_then(Value::as_str)
            .filter(|parent| !parent.is_empty() && *parent != id.as_str() && items.contains_key(*parent));
        children.entry(parent).or_default().push(id.as_str());
    }

    let mut visited = HashSet::new();
    let mut tree: Vec<TreeNode> = children
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .filter_map(|id| build_from_links(id, &children, &mut visited))
                .collect()
        })
        .unwrap_or_default();

    for id in &ids {
        if visited.insert(id.clone()) {
            tree.push(TreeNode::leaf(id.clone()));
        }
    }
    tree
}

fn build_from_links(
    id: &str,
    children: &HashMap<Option<&str>, Vec<&str>>,
    visited: &mut HashSet<String>,
) -> Option<TreeNode> {
    if !visited.insert(id.to_string()) {
        return None;
    }

    let nested = children
        .get(&Some(id))
        .map(|ids| {
            ids.iter()
                .filter_map(|child| build_from_links(child, children, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(TreeNode::with_children(id, nested))
}

fn node_to_value(node: &TreeNode) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::String(node.id.clone()));
    if node.has_children() {
        out.insert(
            "children".to_string(),
            Value::Array(node.children.iter().map(node_to_value).collect()),
        );
    }
    Value::Object(out)
}

fn find_in<'a>(nodes: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn collect_unique(nodes: &[TreeNode], visited: &mut HashSet<String>, out: &mut Vec<String>) {
    for node in nodes {
        if !visited.insert(node.id.clone()) {
            continue;
        }
        out.push(node.id.clone());
        collect_unique(&node.children, visited, out);
    }
}
