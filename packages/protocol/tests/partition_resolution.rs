//! Partition resolution and command building across every domain

use routevn_protocol::{
    build_command, resolve_partitions, Actor, CommandBuilder, CommandNonce, LegacyEvent,
    LegacyEventKind, LegacyOptions, LegacyPayload,
};
use routevn_tree::InsertPosition;
use serde_json::json;
use uuid::Uuid;

fn partitions(event: &LegacyEvent) -> Vec<String> {
    resolve_partitions("p1", event)
}

#[test]
fn test_set_on_line_dialogue() {
    let event = LegacyEvent::set(
        "scenes.items.scene-1.sections.items.section-1.lines.items.line-1.actions.dialogue",
        json!({ "content": [{ "text": "Hello" }] }),
    );

    assert_eq!(
        partitions(&event),
        vec!["project:p1:story", "project:p1:story:line:line-1"]
    );
}

#[test]
fn test_set_initial_scene() {
    let event = LegacyEvent::set("story.initialSceneId", json!("scene-2"));

    assert_eq!(
        partitions(&event),
        vec!["project:p1:story", "project:p1:story:scene:scene-2"]
    );
}

#[test]
fn test_every_domain_family() {
    let cases = vec![
        (
            LegacyEvent::node_insert("scenes", json!({ "id": "s9", "name": "Intro" }), None, InsertPosition::Last),
            vec!["project:p1:story", "project:p1:story:scene:s9"],
        ),
        (
            LegacyEvent::node_update("scenes.items.s1.sections", "sec-2", json!({ "name": "B" }), false),
            vec!["project:p1:story", "project:p1:story:section:sec-2"],
        ),
        (
            LegacyEvent::set("scenes.items.s1.sections.items.sec-1.name", json!("A")),
            vec!["project:p1:story", "project:p1:story:section:sec-1"],
        ),
        (
            LegacyEvent::set("story.title", json!("Demo")),
            vec!["project:p1:story"],
        ),
        (
            LegacyEvent::node_insert("layouts", json!({ "id": "lay-1" }), None, InsertPosition::First),
            vec!["project:p1:layouts", "project:p1:layouts:layout:lay-1"],
        ),
        (
            LegacyEvent::set("layouts.items.lay-1.elements.items.el-1.x", json!(20)),
            vec!["project:p1:layouts", "project:p1:layouts:layout:lay-1:element:el-1"],
        ),
        (
            LegacyEvent::set("characters.items.c1.name", json!("Alice")),
            vec!["project:p1:resources", "project:p1:resources:character:c1"],
        ),
        (
            LegacyEvent::set("characters.items.c1.sprites", json!({})),
            vec!["project:p1:resources", "project:p1:resources:character:c1:sprites"],
        ),
        (
            LegacyEvent::node_delete("characters", "c2"),
            vec!["project:p1:resources", "project:p1:resources:characters:c2"],
        ),
        (
            LegacyEvent::node_move("sounds", "bgm-1", Some("folder-1"), InsertPosition::First),
            vec!["project:p1:resources", "project:p1:resources:sounds:bgm-1"],
        ),
        (
            LegacyEvent::node_insert("variables", json!({ "id": "v1", "type": "number" }), None, InsertPosition::Last),
            vec!["project:p1:settings", "project:p1:settings:variable:v1"],
        ),
        (
            LegacyEvent::unset("project.description"),
            vec!["project:p1:settings", "project:p1:settings:project_field:description"],
        ),
    ];

    for (event, expected) in cases {
        assert_eq!(partitions(&event), expected, "target {}", event.target());
    }
}

#[test]
fn test_nested_value_ids_are_used() {
    let event = LegacyEvent::new(
        LegacyEventKind::Set,
        LegacyPayload {
            target: "images".into(),
            value: Some(json!({ "value": { "id": "img-7" } })),
            options: None,
        },
    );
    assert_eq!(partitions(&event)[1], "project:p1:resources:images:img-7");

    let with_options = LegacyEvent::new(
        LegacyEventKind::NodeUpdate,
        LegacyPayload {
            target: "images".into(),
            value: Some(json!({ "id": "ignored" })),
            options: Some(LegacyOptions {
                id: Some("img-8".into()),
                ..Default::default()
            }),
        },
    );
    assert_eq!(partitions(&with_options)[1], "project:p1:resources:images:img-8");
}

#[test]
fn test_resolution_is_pure() {
    let event = LegacyEvent::set("layouts.items.a.elements.items.b", json!({ "w": 1 }));
    let first = partitions(&event);

    for _ in 0..10 {
        assert_eq!(partitions(&event), first);
    }
}

#[test]
fn test_command_carries_resolved_partitions_and_event() {
    let event = LegacyEvent::node_insert("images", json!({ "id": "img-1" }), None, InsertPosition::Last);
    let mut builder = CommandBuilder::new("p1", Actor::new("u1", "c1"));
    let command = builder.build(event.clone()).unwrap();

    assert_eq!(command.partitions, partitions(&event));
    assert_eq!(command.event(), &event);
    assert_eq!(command.project_id, "p1");
    assert!(command.client_ts > 0);
    assert!(Uuid::parse_str(&command.id).is_ok());
}

#[test]
fn test_command_id_depends_on_content() {
    let nonce = CommandNonce {
        seed: Uuid::nil(),
        counter: 0,
    };
    let actor = Actor::new("u1", "c1");

    let a = build_command("p1", &actor, LegacyEvent::set("story.title", json!("A")), nonce).unwrap();
    let b = build_command("p1", &actor, LegacyEvent::set("story.title", json!("B")), nonce).unwrap();
    let other_actor =
        build_command("p1", &Actor::new("u2", "c1"), LegacyEvent::set("story.title", json!("A")), nonce)
            .unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(a.id, other_actor.id);
}
