//! # Partition Resolution
//!
//! Maps a legacy edit to the authorization/ordering scopes it touches.
//!
//! ```text
//! project:<projectId>:<domain>                      coarse, always present
//! project:<projectId>:<domain>:<type>:<id>[:...]    fine, when one entity is addressed
//! ```
//!
//! Index 0 is the scope every subscriber of the domain sees; index 1 is the
//! entity-level scope used for per-entity ordering and de-duplication.

use crate::legacy::LegacyEvent;
use crate::path::{CharacterPath, LayoutPath, ScenePath, TargetPath};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Coarse partition domain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Domain {
    Story,
    Resources,
    Layouts,
    Settings,
    /// Unrecognized root, lower-cased
    Other(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Story => "story",
            Domain::Resources => "resources",
            Domain::Layouts => "layouts",
            Domain::Settings => "settings",
            Domain::Other(name) => name,
        }
    }

    /// Every named domain, the default subscription set of a session
    pub fn all() -> [Domain; 4] {
        [
            Domain::Story,
            Domain::Resources,
            Domain::Layouts,
            Domain::Settings,
        ]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TargetPath {
    pub fn domain(&self) -> Domain {
        match self {
            TargetPath::Scenes(_) | TargetPath::InitialScene | TargetPath::StoryField => {
                Domain::Story
            }
            TargetPath::Layouts(_) => Domain::Layouts,
            TargetPath::Characters(_) | TargetPath::Resource { .. } => Domain::Resources,
            TargetPath::Empty | TargetPath::ProjectField { .. } | TargetPath::Variables => {
                Domain::Settings
            }
            TargetPath::Unknown { root } => Domain::Other(root.to_lowercase()),
        }
    }

    /// Entity suffix appended to the coarse partition, if one entity is
    /// addressed. `explicit_id` fills in an id the path leaves open.
    pub fn entity_suffix(&self, explicit_id: Option<&str>, value: Option<&Value>) -> Option<String> {
        match self {
            TargetPath::Scenes(scene) => scene_suffix(scene, explicit_id),
            TargetPath::InitialScene => value
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(|id| format!("scene:{id}")),
            TargetPath::Layouts(layout) => layout_suffix(layout, explicit_id),
            TargetPath::Characters(character) => Some(character_suffix(character, explicit_id)),
            TargetPath::Resource { root } => explicit_id.map(|id| format!("{root}:{id}")),
            TargetPath::ProjectField { field } => {
                field.as_ref().map(|field| format!("project_field:{field}"))
            }
            TargetPath::Variables => explicit_id.map(|id| format!("variable:{id}")),
            TargetPath::Empty | TargetPath::StoryField | TargetPath::Unknown { .. } => None,
        }
    }
}

fn scene_suffix(path: &ScenePath, explicit_id: Option<&str>) -> Option<String> {
    match path {
        ScenePath::Collection => explicit_id.map(|id| format!("scene:{id}")),
        ScenePath::Scene { scene_id } => Some(format!("scene:{scene_id}")),
        ScenePath::Sections { scene_id } => Some(match explicit_id {
            Some(id) => format!("section:{id}"),
            None => format!("scene:{scene_id}"),
        }),
        ScenePath::Section { section_id, .. } => Some(format!("section:{section_id}")),
        ScenePath::Lines { section_id, .. } => Some(match explicit_id {
            Some(id) => format!("line:{id}"),
            None => format!("section:{section_id}"),
        }),
        ScenePath::Line { line_id, .. } => Some(format!("line:{line_id}")),
    }
}

fn layout_suffix(path: &LayoutPath, explicit_id: Option<&str>) -> Option<String> {
    match path {
        LayoutPath::Collection => explicit_id.map(|id| format!("layout:{id}")),
        LayoutPath::Layout { layout_id } => Some(format!("layout:{layout_id}")),
        LayoutPath::Elements { layout_id } => Some(match explicit_id {
            Some(id) => format!("layout:{layout_id}:element:{id}"),
            None => format!("layout:{layout_id}"),
        }),
        LayoutPath::Element {
            layout_id,
            element_id,
        } => Some(format!("layout:{layout_id}:element:{element_id}")),
    }
}

fn character_suffix(path: &CharacterPath, explicit_id: Option<&str>) -> String {
    match path {
        CharacterPath::Character { character_id } => format!("character:{character_id}"),
        CharacterPath::Sprites { character_id } => match explicit_id {
            Some(id) => format!("character:{character_id}:sprite:{id}"),
            None => format!("character:{character_id}:sprites"),
        },
        CharacterPath::Sprite {
            character_id,
            sprite_id,
        } => format!("character:{character_id}:sprite:{sprite_id}"),
    }
}

/// `project:<project_id>:<domain>`
pub fn partition_for(project_id: &str, domain: &Domain) -> String {
    format!("project:{project_id}:{domain}")
}

/// `base` followed by `extra`, empties and repeats dropped, order kept
pub fn unique_partitions<I, S>(base: &str, extra: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |partition: &str| {
        if !partition.is_empty() && seen.insert(partition.to_string()) {
            out.push(partition.to_string());
        }
    };

    push(base);
    for partition in extra {
        push(partition.as_ref());
    }
    out
}

/// `[coarse]` or `[coarse, fine]` for `event` within `project_id`
pub fn resolve_partitions(project_id: &str, event: &LegacyEvent) -> Vec<String> {
    let path = TargetPath::parse(event.target());
    let base = partition_for(project_id, &path.domain());

    let fine = path
        .entity_suffix(event.explicit_id(), event.payload.value.as_ref())
        .map(|suffix| format!("{base}:{suffix}"));

    unique_partitions(&base, fine)
}
