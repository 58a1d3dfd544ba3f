//! Derived views over well-formed and malformed forests

use routevn_tree::{TreeCollection, TreeNode};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

fn malformed() -> TreeCollection {
    // a contains itself; b and c contain each other
    TreeCollection {
        items: BTreeMap::new(),
        tree: vec![
            TreeNode::with_children("a", vec![TreeNode::with_children("a", vec![TreeNode::leaf("x")])]),
            TreeNode::with_children(
                "b",
                vec![TreeNode::with_children("c", vec![TreeNode::with_children("b", vec![TreeNode::leaf("c")])])],
            ),
        ],
    }
}

#[test]
fn test_flat_items_terminate_on_cycles_without_repeats() {
    let flat = malformed().to_flat_items();

    let ids: Vec<&str> = flat.iter().map(|i| i.id.as_str()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();

    assert_eq!(ids.len(), unique.len());
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_hierarchy_and_groups_terminate_on_cycles() {
    let collection = malformed();

    let hierarchy = collection.to_hierarchy_structure();
    assert_eq!(hierarchy.len(), 2);
    assert!(hierarchy[0].children.is_empty());
    assert_eq!(hierarchy[1].children[0].id, "c");
    assert!(hierarchy[1].children[0].children.is_empty());

    assert!(collection.to_flat_groups().is_empty());
}

#[test]
fn test_views_keep_document_order() {
    let collection: TreeCollection = serde_json::from_value(json!({
        "items": {
            "z": { "name": "Zeta", "type": "folder" },
            "m": { "name": "Mu" },
            "a": { "name": "Alpha" }
        },
        "tree": [
            { "id": "z", "children": [{ "id": "m" }, { "id": "a" }] }
        ]
    }))
    .unwrap();

    let ids: Vec<String> = collection.to_flat_items().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["z", "m", "a"]);

    let groups = collection.to_flat_groups();
    let child_ids: Vec<&str> = groups[0].children.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(child_ids, vec!["m", "a"]);
}

#[test]
fn test_orphans_are_not_in_views() {
    let collection: TreeCollection = serde_json::from_value(json!({
        "items": { "placed": { "name": "P" }, "orphan": { "name": "O" } },
        "tree": [{ "id": "placed" }]
    }))
    .unwrap();

    let flat = collection.to_flat_items();
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].id, "placed");
}

#[test]
fn test_group_serializes_with_children_and_folder_type() {
    let collection: TreeCollection = serde_json::from_value(json!({
        "items": {
            "f": { "name": "Music", "type": "folder" },
            "s": { "name": "Theme", "fileId": "file-1" }
        },
        "tree": [{ "id": "f", "children": [{ "id": "s" }] }]
    }))
    .unwrap();

    let json = serde_json::to_value(collection.to_flat_groups()).unwrap();

    assert_eq!(json[0]["type"], "folder");
    assert_eq!(json[0]["_level"], 0);
    assert_eq!(json[0]["children"][0]["fileId"], "file-1");
    assert_eq!(json[0]["children"][0]["fullLabel"], "Music > Theme");
    assert_eq!(json[0]["children"][0]["parentId"], "f");
}

#[test]
fn test_legacy_parent_links_nest_flat_labels() {
    // Stored before node objects: string order plus parentId on each item
    let collection = TreeCollection::from_value(&json!({
        "items": {
            "child": { "name": "Child", "parentId": "folder" },
            "folder": { "name": "Folder", "type": "folder" },
            "grandchild": { "name": "Leaf", "parentId": "child" },
            "loose": { "name": "Loose", "parentId": "missing" }
        },
        "order": ["loose", "folder", "child", "grandchild"]
    }));

    let flat = collection.to_flat_items();
    let rows: Vec<(&str, usize, Option<&str>, &str)> = flat
        .iter()
        .map(|i| (i.id.as_str(), i.level, i.parent_id.as_deref(), i.full_label.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("loose", 0, None, "Loose"),
            ("folder", 0, None, "Folder"),
            ("child", 1, Some("folder"), "Folder > Child"),
            ("grandchild", 2, Some("child"), "Folder > Child > Leaf"),
        ]
    );
    assert!(flat[1].has_children);
    assert!(!flat[3].has_children);
}
