//! Structured matchers over legacy dot paths.
//!
//! A target such as `scenes.items.s1.sections.items.x.lines.items.l9.actions`
//! is parsed once into a closed set of variants instead of being re-split at
//! every call site. Only the leading `{collection}.items.{id}` repeats matter;
//! trailing field segments are ignored.

/// Top-level collections routed to the `resources` domain
pub const RESOURCE_ROOTS: &[&str] = &[
    "images",
    "tweens",
    "sounds",
    "videos",
    "characters",
    "fonts",
    "transforms",
    "colors",
    "typography",
    "components",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPath {
    /// Empty target (whole-document events such as `init`)
    Empty,
    Scenes(ScenePath),
    /// `story.initialSceneId`
    InitialScene,
    /// Any other `story.*` field
    StoryField,
    Layouts(LayoutPath),
    /// `characters.items.<id>...`
    Characters(CharacterPath),
    /// A resource collection (including `characters` without an item id)
    Resource { root: String },
    /// `project` or `project.<field>`
    ProjectField { field: Option<String> },
    Variables,
    Unknown { root: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenePath {
    /// `scenes` or a scenes path without an item id
    Collection,
    Scene {
        scene_id: String,
    },
    /// `scenes.items.<scene>.sections` without a section id
    Sections {
        scene_id: String,
    },
    Section {
        scene_id: String,
        section_id: String,
    },
    /// `...sections.items.<section>.lines` without a line id
    Lines {
        scene_id: String,
        section_id: String,
    },
    Line {
        scene_id: String,
        section_id: String,
        line_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutPath {
    Collection,
    Layout { layout_id: String },
    Elements { layout_id: String },
    Element { layout_id: String, element_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterPath {
    Character { character_id: String },
    Sprites { character_id: String },
    Sprite { character_id: String, sprite_id: String },
}

impl TargetPath {
    pub fn parse(target: &str) -> Self {
        if target.is_empty() {
            return TargetPath::Empty;
        }

        let parts: Vec<&str> = target.split('.').collect();
        let root = parts[0];

        match root {
            "scenes" => TargetPath::Scenes(ScenePath::parse(&parts[1..])),
            "story" if parts.get(1) == Some(&"initialSceneId") => TargetPath::InitialScene,
            "story" => TargetPath::StoryField,
            "layouts" => TargetPath::Layouts(LayoutPath::parse(&parts[1..])),
            "characters" => match CharacterPath::parse(&parts[1..]) {
                Some(path) => TargetPath::Characters(path),
                None => TargetPath::Resource {
                    root: root.to_string(),
                },
            },
            "project" => TargetPath::ProjectField {
                field: parts
                    .get(1)
                    .filter(|f| !f.is_empty())
                    .map(|f| f.to_string()),
            },
            "variables" => TargetPath::Variables,
            _ if RESOURCE_ROOTS.contains(&root) => TargetPath::Resource {
                root: root.to_string(),
            },
            _ => TargetPath::Unknown {
                root: root.to_string(),
            },
        }
    }
}

/// `items.<id>` at the head of `rest`
fn item_id<'a>(rest: &[&'a str]) -> Option<&'a str> {
    match rest {
        ["items", id, ..] if !id.is_empty() => Some(*id),
        _ => None,
    }
}

impl ScenePath {
    fn parse(rest: &[&str]) -> Self {
        let Some(scene_id) = item_id(rest) else {
            return ScenePath::Collection;
        };
        let scene_id = scene_id.to_string();

        if rest.get(2) != Some(&"sections") {
            return ScenePath::Scene { scene_id };
        }

        let sections = &rest[3..];
        let Some(section_id) = item_id(sections) else {
            return ScenePath::Sections { scene_id };
        };
        let section_id = section_id.to_string();

        if sections.get(2) != Some(&"lines") {
            return ScenePath::Section {
                scene_id,
                section_id,
            };
        }

        match item_id(&sections[3..]) {
            Some(line_id) => ScenePath::Line {
                scene_id,
                section_id,
                line_id: line_id.to_string(),
            },
            None => ScenePath::Lines {
                scene_id,
                section_id,
            },
        }
    }
}

impl LayoutPath {
    fn parse(rest: &[&str]) -> Self {
        let Some(layout_id) = item_id(rest) else {
            return LayoutPath::Collection;
        };
        let layout_id = layout_id.to_string();

        if rest.get(2) != Some(&"elements") {
            return LayoutPath::Layout { layout_id };
        }

        match item_id(&rest[3..]) {
            Some(element_id) => LayoutPath::Element {
                layout_id,
                element_id: element_id.to_string(),
            },
            None => LayoutPath::Elements { layout_id },
        }
    }
}

impl CharacterPath {
    fn parse(rest: &[&str]) -> Option<Self> {
        let character_id = item_id(rest)?.to_string();

        if rest.get(2) != Some(&"sprites") {
            return Some(CharacterPath::Character { character_id });
        }

        Some(match item_id(&rest[3..]) {
            Some(sprite_id) => CharacterPath::Sprite {
                character_id,
                sprite_id: sprite_id.to_string(),
            },
            None => CharacterPath::Sprites { character_id },
        })
    }
}
