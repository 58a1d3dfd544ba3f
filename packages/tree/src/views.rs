//! # Derived Views
//!
//! Read-only projections of a [`TreeCollection`] for list, gallery and
//! explorer presentation.
//!
//! Every view is a pre-order walk in document order guarded by a visited
//! set: a repeated id (including a node nested inside itself) is dropped the
//! second time it is reached, so malformed input always terminates.

use crate::{ItemData, TreeCollection, TreeNode};
use serde::Serialize;
use std::collections::HashSet;

/// Item data plus its position in the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatItem {
    pub id: String,
    #[serde(rename = "_level")]
    pub level: usize,
    pub parent_id: Option<String>,
    pub has_children: bool,
    /// Ancestor names and own name joined with `" > "`
    pub full_label: String,
    #[serde(flatten)]
    pub data: ItemData,
}

/// A folder with its direct non-folder children
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatGroup {
    pub id: String,
    #[serde(rename = "_level")]
    pub level: usize,
    pub parent_id: Option<String>,
    pub has_children: bool,
    pub full_label: String,
    pub children: Vec<FlatItem>,
    #[serde(flatten)]
    pub data: ItemData,
}

/// Nested node carrying its item data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyItem {
    pub id: String,
    #[serde(rename = "_level")]
    pub level: usize,
    pub parent_id: Option<String>,
    pub has_children: bool,
    pub full_label: String,
    pub children: Vec<HierarchyItem>,
    #[serde(flatten)]
    pub data: ItemData,
}

impl TreeCollection {
    /// Every placed item in document order
    pub fn to_flat_items(&self) -> Vec<FlatItem> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.flatten(&self.tree, &mut chain, &mut visited, &mut out);
        out
    }

    /// Folder groups in document order, each with its direct non-folder
    /// children. Only folders are descended into.
    pub fn to_flat_groups(&self) -> Vec<FlatGroup> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.group(&self.tree, &mut chain, &mut visited, &mut out);
        out
    }

    /// The forest with item data attached to every node
    pub fn to_hierarchy_structure(&self) -> Vec<HierarchyItem> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.nest(&self.tree, &mut chain, &mut visited)
    }

    fn flatten<'a>(
        &self,
        nodes: &'a [TreeNode],
        chain: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
        out: &mut Vec<FlatItem>,
    ) {
        for node in nodes {
            if !visited.insert(node.id.as_str()) {
                continue;
            }

            out.push(FlatItem {
                id: node.id.clone(),
                level: chain.len(),
                parent_id: chain.last().map(|p| p.to_string()),
                has_children: node.has_children(),
                full_label: self.full_label(chain, &node.id),
                data: self.data_of(&node.id),
            });

            if node.has_children() {
                chain.push(&node.id);
                self.flatten(&node.children, chain, visited, out);
                chain.pop();
            }
        }
    }

    fn group<'a>(
        &self,
        nodes: &'a [TreeNode],
        chain: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
        out: &mut Vec<FlatGroup>,
    ) {
        for node in nodes {
            if !self.is_folder(&node.id) || !visited.insert(node.id.as_str()) {
                continue;
            }

            let level = chain.len();
            let full_label = self.full_label(chain, &node.id);

            chain.push(&node.id);
            let mut children = Vec::new();
            for child in &node.children {
                if self.is_folder(&child.id) || !visited.insert(child.id.as_str()) {
                    continue;
                }
                children.push(FlatItem {
                    id: child.id.clone(),
                    level: level + 1,
                    parent_id: Some(node.id.clone()),
                    has_children: child.has_children(),
                    full_label: self.full_label(chain, &child.id),
                    data: self.data_of(&child.id),
                });
            }
            chain.pop();

            let mut data = self.data_of(&node.id);
            data.insert("type".to_string(), "folder".into());

            out.push(FlatGroup {
                id: node.id.clone(),
                level,
                parent_id: chain.last().map(|p| p.to_string()),
                has_children: node.has_children(),
                full_label,
                children,
                data,
            });

            chain.push(&node.id);
            self.group(&node.children, chain, visited, out);
            chain.pop();
        }
    }

    fn nest<'a>(
        &self,
        nodes: &'a [TreeNode],
        chain: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> Vec<HierarchyItem> {
        let mut out = Vec::new();
        for node in nodes {
            if !visited.insert(node.id.as_str()) {
                continue;
            }

            let level = chain.len();
            let full_label = self.full_label(chain, &node.id);
            let parent_id = chain.last().map(|p| p.to_string());

            chain.push(&node.id);
            let children = self.nest(&node.children, chain, visited);
            chain.pop();

            out.push(HierarchyItem {
                id: node.id.clone(),
                level,
                parent_id,
                has_children: node.has_children(),
                full_label,
                children,
                data: self.data_of(&node.id),
            });
        }
        out
    }

    fn data_of(&self, id: &str) -> ItemData {
        self.items.get(id).cloned().unwrap_or_default()
    }

    fn full_label(&self, chain: &[&str], id: &str) -> String {
        let own = self.name_of(id).unwrap_or("");
        let ancestors: Vec<&str> = chain.iter().filter_map(|p| self.name_of(p)).collect();

        if ancestors.is_empty() {
            own.to_string()
        } else {
            format!("{} > {}", ancestors.join(" > "), own)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TreeCollection {
        serde_json::from_value(json!({
            "items": {
                "f1": { "name": "Characters", "type": "folder" },
                "f2": { "name": "Side", "type": "folder" },
                "a": { "name": "Alice" },
                "b": { "name": "Bob" },
                "c": { "name": "Carol" }
            },
            "tree": [
                { "id": "f1", "children": [
                    { "id": "a" },
                    { "id": "f2", "children": [{ "id": "b" }] }
                ]},
                { "id": "c" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_flat_items_are_in_document_order() {
        let ids: Vec<String> = sample().to_flat_items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["f1", "a", "f2", "b", "c"]);
    }

    #[test]
    fn test_flat_item_metadata() {
        let flat = sample().to_flat_items();
        let bob = flat.iter().find(|i| i.id == "b").unwrap();

        assert_eq!(bob.level, 2);
        assert_eq!(bob.parent_id.as_deref(), Some("f2"));
        assert_eq!(bob.full_label, "Characters > Side > Bob");
        assert!(!bob.has_children);

        let root = flat.iter().find(|i| i.id == "f1").unwrap();
        assert_eq!(root.parent_id, None);
        assert_eq!(root.full_label, "Characters");
        assert!(root.has_children);
    }

    #[test]
    fn test_flat_item_serializes_legacy_field_names() {
        let flat = sample().to_flat_items();
        let json = serde_json::to_value(&flat[1]).unwrap();

        assert_eq!(json["_level"], 1);
        assert_eq!(json["parentId"], "f1");
        assert_eq!(json["fullLabel"], "Characters > Alice");
        assert_eq!(json["hasChildren"], false);
        assert_eq!(json["name"], "Alice");
    }

    #[test]
    fn test_flat_groups_hold_direct_non_folder_children() {
        let groups = sample().to_flat_groups();
        assert_eq!(groups.len(), 2);

        assert_eq!(groups[0].id, "f1");
        let child_ids: Vec<&str> = groups[0].children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(child_ids, vec!["a"]);

        assert_eq!(groups[1].id, "f2");
        assert_eq!(groups[1].full_label, "Characters > Side");
        assert_eq!(groups[1].children[0].id, "b");
        assert_eq!(groups[1].children[0].level, 2);
    }

    #[test]
    fn test_empty_folder_still_forms_group() {
        let collection: TreeCollection = serde_json::from_value(json!({
            "items": { "f": { "name": "Empty", "type": "folder" } },
            "tree": [{ "id": "f" }]
        }))
        .unwrap();

        let groups = collection.to_flat_groups();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].children.is_empty());
        assert!(!groups[0].has_children);
    }

    #[test]
    fn test_hierarchy_structure_nests_data() {
        let hierarchy = sample().to_hierarchy_structure();

        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy[0].children.len(), 2);
        assert_eq!(hierarchy[0].children[1].children[0].id, "b");
        assert_eq!(hierarchy[0].children[1].children[0].full_label, "Characters > Side > Bob");
        assert_eq!(hierarchy[1].data["name"], "Carol");
    }

    #[test]
    fn test_unnamed_ancestors_are_skipped_in_label() {
        let collection: TreeCollection = serde_json::from_value(json!({
            "items": { "p": {}, "x": { "name": "X" } },
            "tree": [{ "id": "p", "children": [{ "id": "x" }] }]
        }))
        .unwrap();

        assert_eq!(collection.to_flat_items()[1].full_label, "X");
    }
}
