//! Render rows produced by the hierarchy materializer

use super::entity::Entity;

/// Where a row sits under its top-level row
///
/// `ancestors` runs from the top-level row down to the direct parent, and
/// `positions` holds the child index taken at each of those levels. A
/// top-level row has an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowPath {
    pub ancestors: Vec<String>,
    pub positions: Vec<usize>,
}

impl RowPath {
    /// Id of the top-level row this path starts from
    pub fn root(&self) -> Option<&str> {
        self.ancestors.first().map(String::as_str)
    }

    /// Path of the `position`-th child of the row at this path, whose id is `own_id`
    pub fn child(&self, own_id: &str, position: usize) -> RowPath {
        let mut path = self.clone();
        path.ancestors.push(own_id.to_string());
        path.positions.push(position);
        path
    }

    /// Follow the positions down from the top-level entity
    pub fn locate<'a>(&self, root: &'a Entity) -> Option<&'a Entity> {
        self.positions
            .iter()
            .try_fold(root, |entity, position| entity.child_list().get(*position))
    }
}

/// Whether a render row is a page-level row or a materialized child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// Top-level row from the fetched page
    Parent,
    /// Sub-row emitted under an expanded row
    Child { path: RowPath },
}

/// One row of the flat render list
#[derive(Debug, Clone, PartialEq)]
pub struct RowNode {
    pub id: String,
    pub depth: usize,
    pub kind: RowKind,
    pub can_expand: bool,
    pub is_expanded: bool,
    pub data: Entity,
}

impl RowNode {
    /// Path from the top-level row; empty for top-level rows
    pub fn path(&self) -> RowPath {
        match &self.kind {
            RowKind::Parent => RowPath::default(),
            RowKind::Child { path } => path.clone(),
        }
    }

    pub fn children(&self) -> &[Entity] {
        self.data.child_list()
    }
}
