//! Parent-chain path resolution.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::header::ObjectHeader;

/// Discovery-ordered object registry, id → decoded header.  Append-only
/// for the duration of one extraction run; a child's ancestors are always
/// registered before the child because ids increase in stream order.
pub type Registry = BTreeMap<u32, ObjectHeader>;

/// First id handed out during a scan.  Ids 0-256 are reserved for the
/// root and built-in objects and never appear in a registry.
pub const FIRST_OBJECT_ID: u32 = 257;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("parent chain of object {id} loops back on itself")]
    ParentCycle { id: u32 },
}

/// Resolve the path of `id` as name components, root first.
///
/// The walk follows `parent_id` until it reaches an id that was never
/// registered; that id stands for the destination root, so an object
/// whose parent is unknown lands directly under it.  A corrupt image can
/// wire parent ids into a cycle — the visited set turns that into an
/// error instead of an endless loop.
pub fn resolve_path(registry: &Registry, id: u32) -> Result<Vec<String>, TreeError> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = id;
    while let Some(record) = registry.get(&cursor) {
        if !seen.insert(cursor) {
            return Err(TreeError::ParentCycle { id });
        }
        names.push(record.name.clone());
        cursor = record.parent_id;
    }
    names.reverse();
    Ok(names)
}
