//! Hierarchy materializer
//!
//! Turns a fetched page plus the expansion state into the flat list of rows
//! the table draws. Expanded rows are followed directly by their children, so
//! each family stays a contiguous block. The page window is never touched:
//! expanding a row adds render rows, not page rows.

use std::collections::HashMap;

use crate::model::entity::Entity;
use crate::model::query::Expanded;
use crate::model::row::{RowKind, RowNode, RowPath};

type ChildIdFn = dyn Fn(&str, usize, &Entity) -> String + Send + Sync;

/// How row ids are derived
///
/// Top-level rows use their stable id. Children use `"{parent}.{position}"`
/// unless a custom function is installed, so ids stay the same across
/// re-fetches as long as child order is stable.
#[derive(Default)]
pub struct RowIdentity {
    child_id: Option<Box<ChildIdFn>>,
}

impl RowIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize, &Entity) -> String + Send + Sync + 'static,
    {
        self.child_id = Some(Box::new(f));
        self
    }

    pub fn child_id(&self, parent_id: &str, position: usize, child: &Entity) -> String {
        match &self.child_id {
            Some(f) => f(parent_id, position, child),
            None => format!("{}.{}", parent_id, position),
        }
    }
}

impl std::fmt::Debug for RowIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIdentity")
            .field("custom_child_id", &self.child_id.is_some())
            .finish()
    }
}

/// A row can expand iff it has a non-empty child list
pub fn row_can_expand(entity: &Entity) -> bool {
    entity.has_children()
}

/// Build the render list for a page
pub fn materialize(page: &[Entity], expanded: &Expanded, identity: &RowIdentity) -> Vec<RowNode> {
    let mut rows = Vec::with_capacity(page.len());

    for entity in page {
        let can_expand = row_can_expand(entity);
        let is_expanded = can_expand && expanded.is_expanded(&entity.id);
        rows.push(RowNode {
            id: entity.id.clone(),
            depth: 0,
            kind: RowKind::Parent,
            can_expand,
            is_expanded,
            data: entity.clone(),
        });
        if is_expanded {
            let path = RowPath::default();
            push_children(&mut rows, &path, &entity.id, entity, expanded, identity);
        }
    }

    rows
}

fn push_children(
    rows: &mut Vec<RowNode>,
    parent_path: &RowPath,
    parent_id: &str,
    parent: &Entity,
    expanded: &Expanded,
    identity: &RowIdentity,
) {
    for (position, child) in parent.child_list().iter().enumerate() {
        let id = identity.child_id(parent_id, position, child);
        let path = parent_path.child(parent_id, position);
        let can_expand = row_can_expand(child);
        let is_expanded = can_expand && expanded.is_expanded(&id);
        rows.push(RowNode {
            id: id.clone(),
            depth: path.positions.len(),
            kind: RowKind::Child { path: path.clone() },
            can_expand,
            is_expanded,
            data: child.clone(),
        });
        if is_expanded {
            push_children(rows, &path, &id, child, expanded, identity);
        }
    }
}

/// Ids of every row on the page that could expand, at any depth
pub fn expandable_ids(page: &[Entity], identity: &RowIdentity) -> Vec<String> {
    let mut ids = Vec::new();
    for entity in page {
        collect_expandable(&entity.id, entity, identity, &mut ids);
    }
    ids
}

fn collect_expandable(id: &str, entity: &Entity, identity: &RowIdentity, ids: &mut Vec<String>) {
    if !row_can_expand(entity) {
        return;
    }
    ids.push(id.to_string());
    for (position, child) in entity.child_list().iter().enumerate() {
        let child_id = identity.child_id(id, position, child);
        collect_expandable(&child_id, child, identity, ids);
    }
}

/// Every row on the page keyed by row id, children included
///
/// Unlike `materialize` this ignores expansion, so a selected child of a
/// collapsed row can still be found on the page.
pub fn index_page<'a>(page: &'a [Entity], identity: &RowIdentity) -> HashMap<String, &'a Entity> {
    let mut index = HashMap::new();
    for entity in page {
        index_entity(entity.id.clone(), entity, identity, &mut index);
    }
    index
}

fn index_entity<'a>(
    id: String,
    entity: &'a Entity,
    identity: &RowIdentity,
    index: &mut HashMap<String, &'a Entity>,
) {
    for (position, child) in entity.child_list().iter().enumerate() {
        let child_id = identity.child_id(&id, position, child);
        index_entity(child_id, child, identity, index);
    }
    index.insert(id, entity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn order(id: &str, items: usize) -> Entity {
        let children = (0..items)
            .map(|i| Entity::new("").with("sku", format!("{}-item{}", id, i)))
            .collect();
        Entity::new(id).with_children(children)
    }

    fn expanded_rows(ids: &[&str]) -> Expanded {
        let map: BTreeMap<String, bool> = ids.iter().map(|id| (id.to_string(), true)).collect();
        Expanded::Rows(map)
    }

    fn ids(rows: &[RowNode]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_expanded_parent_emits_children_contiguously() {
        let page = vec![order("a", 3), order("b", 0), order("c", 1)];
        let rows = materialize(&page, &expanded_rows(&["a"]), &RowIdentity::new());

        assert_eq!(ids(&rows), vec!["a", "a.0", "a.1", "a.2", "b", "c"]);
        assert_eq!(rows[1].depth, 1);
        assert_eq!(rows[1].path().ancestors, vec!["a"]);
        assert_eq!(rows[4].depth, 0);
        assert!(rows[0].is_expanded);
    }

    #[test]
    fn test_collapsed_parent_emits_only_itself() {
        let page = vec![order("a", 3), order("b", 2)];
        let rows = materialize(&page, &Expanded::default(), &RowIdentity::new());

        assert_eq!(ids(&rows), vec!["a", "b"]);
        assert!(rows.iter().all(|r| r.path() == RowPath::default()));
        assert!(rows[0].can_expand && !rows[0].is_expanded);
    }

    #[test]
    fn test_expand_flag_without_children_is_ignored() {
        let page = vec![order("a", 0)];
        let rows = materialize(&page, &expanded_rows(&["a"]), &RowIdentity::new());

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].can_expand);
        assert!(!rows[0].is_expanded);
    }

    #[test]
    fn test_expand_all_flag() {
        let page = vec![order("a", 1), order("b", 2)];
        let rows = materialize(&page, &Expanded::All(true), &RowIdentity::new());
        assert_eq!(ids(&rows), vec!["a", "a.0", "b", "b.0", "b.1"]);
    }

    #[test]
    fn test_row_kinds_carry_paths() {
        let page = vec![order("a", 2), order("b", 0)];
        let rows = materialize(&page, &Expanded::All(true), &RowIdentity::new());
        assert_eq!(rows[3].kind, RowKind::Parent);
        assert_eq!(rows[2].path().positions, vec![1]);
        assert_eq!(rows[2].path().root(), Some("a"));
    }

    #[test]
    fn test_nested_children_recurse() {
        let grandchild = Entity::new("").with("name", "leaf");
        let child = Entity::new("").with_children(vec![grandchild]);
        let page = vec![Entity::new("root").with_children(vec![child])];

        let rows = materialize(&page, &expanded_rows(&["root", "root.0"]), &RowIdentity::new());
        assert_eq!(ids(&rows), vec!["root", "root.0", "root.0.0"]);
        assert_eq!(rows[2].depth, 2);
        assert_eq!(rows[2].path().ancestors, vec!["root", "root.0"]);
        assert_eq!(rows[2].path().positions, vec![0, 0]);
    }

    #[test]
    fn test_custom_child_id() {
        let identity =
            RowIdentity::new().with_child_id(|_, _, child: &Entity| child.text("sku"));
        let page = vec![order("a", 2)];
        let rows = materialize(&page, &expanded_rows(&["a"]), &identity);
        assert_eq!(ids(&rows), vec!["a", "a-item0", "a-item1"]);
    }

    #[test]
    fn test_child_ids_stable_across_refetch() {
        let first = materialize(&[order("a", 2)], &Expanded::All(true), &RowIdentity::new());
        let second = materialize(&[order("a", 2)], &Expanded::All(true), &RowIdentity::new());
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_index_page_includes_collapsed_children() {
        let page = vec![order("a", 2)];
        let identity = RowIdentity::new();
        let index = index_page(&page, &identity);

        assert_eq!(index.len(), 3);
        assert_eq!(index["a.1"].text("sku"), "a-item1");
    }

    #[test]
    fn test_expandable_ids() {
        let page = vec![order("a", 1), order("b", 0), order("c", 2)];
        assert_eq!(expandable_ids(&page, &RowIdentity::new()), vec!["a", "c"]);
    }
}
