//! # RouteVN Tree Store
//!
//! Value-based forest of typed items (folders and leaves) used by every
//! project collection: scenes, images, layouts, characters and so on.
//!
//! ## Model
//!
//! ```text
//! TreeCollection
//!  ├─ items: id → attributes (never stores its own id)
//!  └─ tree:  [ { id, children: [ { id }, ... ] }, ... ]
//! ```
//!
//! ## Core Principles
//!
//! 1. **Pure**: every mutation takes `&self` and returns a new collection
//! 2. **Forgiving**: unknown ids are no-ops, duplicate/cyclic ids are
//!    dropped by a visited set, nothing panics on malformed input
//! 3. **Order-preserving**: derived views follow document order
//!
//! ## Usage
//!
//! ```rust
//! use routevn_tree::{InsertPosition, TreeCollection, ROOT_PARENT_ID};
//! use serde_json::json;
//!
//! let folder = json!({ "id": "f1", "name": "Backgrounds", "type": "folder" });
//! let image = json!({ "id": "i1", "name": "Sky" });
//!
//! let tree = TreeCollection::default()
//!     .insert(folder.as_object().unwrap(), ROOT_PARENT_ID, &InsertPosition::Last)
//!     .insert(image.as_object().unwrap(), "f1", &InsertPosition::Last);
//!
//! let flat = tree.to_flat_items();
//! assert_eq!(flat[1].full_label, "Backgrounds > Sky");
//! ```

mod collection;
mod mutations;
mod position;
mod views;

pub use collection::{ItemData, TreeCollection, TreeNode, ROOT_PARENT_ID};
pub use mutations::TreeMutation;
pub use position::InsertPosition;
pub use views::{FlatGroup, FlatItem, HierarchyItem};
