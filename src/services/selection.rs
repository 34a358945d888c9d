//! Selection manager
//!
//! The selection is a set of stable row ids that outlives pagination: moving
//! to another page only changes which selected rows are visible, never which
//! rows are selected. The grid itself only sees a page-local projection keyed
//! by position, derived on demand.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::model::entity::Entity;
use crate::model::row::{RowNode, RowPath};
use crate::services::data_source::DataSource;
use crate::services::hierarchy::{index_page, RowIdentity};

/// Per-table selection behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Selecting a row also selects its children, and deselecting clears them
    #[serde(default)]
    pub cascade_children: bool,
}

/// Result of resolving the selection into entities
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One entity per selected id, in selection order
    pub entities: Vec<Entity>,
    /// Ids that were replaced with placeholders
    pub unresolved: Vec<String>,
    /// Set when placeholders had to be synthesized
    pub warning: Option<String>,
    /// Positions in `entities` whose ancestor was resolved too, so the
    /// ancestor's own child list already holds them
    pub nested: BTreeSet<usize>,
}

impl Resolution {
    /// Entities to hand to the export, children of selected ancestors folded in
    pub fn into_export_rows(self) -> Vec<Entity> {
        let Resolution {
            entities, nested, ..
        } = self;
        entities
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !nested.contains(index))
            .map(|(_, entity)| entity)
            .collect()
    }
}

/// Selected row ids, each with the path that leads to it from its top-level row
#[derive(Debug, Clone, Default)]
pub struct SelectionManager {
    selected: IndexMap<String, RowPath>,
    policy: SelectionPolicy,
}

impl SelectionManager {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            selected: IndexMap::new(),
            policy,
        }
    }

    /// Flip one id; returns whether it is now selected
    pub fn toggle(&mut self, id: &str) -> bool {
        self.toggle_at(id, RowPath::default())
    }

    pub fn select(&mut self, id: &str) {
        self.select_at(id, RowPath::default());
    }

    pub fn deselect(&mut self, id: &str) {
        self.selected.shift_remove(id);
    }

    fn toggle_at(&mut self, id: &str, path: RowPath) -> bool {
        if self.selected.shift_remove(id).is_some() {
            false
        } else {
            self.selected.insert(id.to_string(), path);
            true
        }
    }

    fn select_at(&mut self, id: &str, path: RowPath) {
        self.selected.insert(id.to_string(), path);
    }

    /// Toggle a render row, applying the cascade policy to its children
    ///
    /// `child_ids` are the row ids of the row's direct children. The row's
    /// path is kept so a selected child can be found again once its page is
    /// gone.
    pub fn toggle_row(&mut self, row: &RowNode, child_ids: &[String]) -> bool {
        let path = row.path();
        let now_selected = self.toggle_at(&row.id, path.clone());
        if self.policy.cascade_children {
            for (position, child_id) in child_ids.iter().enumerate() {
                if now_selected {
                    self.select_at(child_id, path.child(&row.id, position));
                } else {
                    self.deselect(child_id);
                }
            }
        }
        now_selected
    }

    /// Select every top-level row on the page, or deselect them if all are selected
    pub fn toggle_page(&mut self, page: &[Entity]) {
        let all_selected = !page.is_empty() && page.iter().all(|e| self.is_selected(&e.id));
        for entity in page {
            if all_selected {
                self.deselect(&entity.id);
            } else {
                self.select(&entity.id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Page-relative projection for the grid: `{index: true}` for selected rows
    pub fn page_local_selection(&self, page: &[Entity]) -> BTreeMap<usize, bool> {
        page.iter()
            .enumerate()
            .filter(|(_, e)| self.is_selected(&e.id))
            .map(|(i, _)| (i, true))
            .collect()
    }

    /// Turn the selection into entities, fetching off-page rows in one batch
    ///
    /// Never fails: rows that cannot be resolved become placeholders built
    /// from `columns`, and the output always has one entry per selected id.
    /// Children missing from the page are looked up through their top-level
    /// row, since the source only knows top-level ids.
    pub fn resolve_selected_entities(
        &self,
        page: &[Entity],
        identity: &RowIdentity,
        source: &dyn DataSource,
        columns: &[String],
    ) -> Resolution {
        let on_page = index_page(page, identity);
        let mut lookups: IndexSet<String> = IndexSet::new();
        for (id, path) in &self.selected {
            if on_page.contains_key(id.as_str()) {
                continue;
            }
            let key = path.root().unwrap_or(id.as_str());
            if !on_page.contains_key(key) {
                lookups.insert(key.to_string());
            }
        }

        let mut fetched: HashMap<String, Entity> = HashMap::new();
        let mut failure = None;
        if !lookups.is_empty() {
            let ids: Vec<String> = lookups.into_iter().collect();
            tracing::debug!(count = ids.len(), "resolving off-page selection");
            match source.fetch_by_ids(&ids) {
                Ok(entities) => {
                    for entity in entities {
                        fetched.insert(entity.id.clone(), entity);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "batch lookup for selected rows failed");
                    failure = Some(err);
                }
            }
        }

        let mut resolution = Resolution::default();
        let mut resolved_ids: HashSet<&str> = HashSet::new();
        for (id, path) in &self.selected {
            let entity = match on_page.get(id.as_str()) {
                Some(entity) => Some((*entity).clone()),
                None => match path.root() {
                    None => fetched.get(id).cloned(),
                    Some(root) => on_page
                        .get(root)
                        .copied()
                        .or_else(|| fetched.get(root))
                        .and_then(|top| path.locate(top))
                        .cloned(),
                },
            };
            match entity {
                Some(mut entity) => {
                    if entity.id.is_empty() {
                        entity.id = id.clone();
                    }
                    resolved_ids.insert(id.as_str());
                    resolution.entities.push(entity);
                }
                None => {
                    resolution.unresolved.push(id.clone());
                    resolution.entities.push(Entity::placeholder(id, columns));
                }
            }
        }

        resolution.nested = self
            .selected
            .values()
            .enumerate()
            .filter(|(_, path)| {
                path.ancestors
                    .iter()
                    .any(|ancestor| resolved_ids.contains(ancestor.as_str()))
            })
            .map(|(index, _)| index)
            .collect();

        if !resolution.unresolved.is_empty() {
            let reason = failure
                .map(|err| format!(": {}", err))
                .unwrap_or_default();
            resolution.warning = Some(format!(
                "{} selected row(s) could not be loaded{}",
                resolution.unresolved.len(),
                reason
            ));
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::entity::{PageResponse, PLACEHOLDER_TEXT};
    use crate::model::query::{Expanded, PageRequest};
    use crate::services::data_source::MemorySource;
    use crate::services::hierarchy::materialize;

    fn page(ids: &[&str]) -> Vec<Entity> {
        ids.iter()
            .map(|id| Entity::new(*id).with("name", format!("name-{}", id)))
            .collect()
    }

    /// Source whose batch lookup always fails
    struct BrokenLookup;

    impl DataSource for BrokenLookup {
        fn fetch_page(&self, _request: &PageRequest) -> Result<PageResponse, FetchError> {
            Err(FetchError::Unavailable("offline".to_string()))
        }

        fn fetch_by_ids(&self, _ids: &[String]) -> Result<Vec<Entity>, FetchError> {
            Err(FetchError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn test_selection_accumulates_across_pages() {
        let mut selection = SelectionManager::default();
        let page_one = page(&["a", "b", "c"]);
        let page_two = page(&["d", "e", "f"]);

        selection.toggle("a");
        selection.toggle("c");
        selection.toggle("e");

        assert_eq!(selection.len(), 3);
        assert_eq!(
            selection.page_local_selection(&page_one),
            BTreeMap::from([(0, true), (2, true)])
        );
        assert_eq!(
            selection.page_local_selection(&page_two),
            BTreeMap::from([(1, true)])
        );

        selection.clear();
        assert_eq!(selection.len(), 0);
        assert!(selection.page_local_selection(&page_one).is_empty());
    }

    #[test]
    fn test_projection_does_not_prune_set() {
        let mut selection = SelectionManager::default();
        selection.toggle("gone");
        let projection = selection.page_local_selection(&page(&["x", "y"]));

        assert!(projection.is_empty());
        assert!(selection.is_selected("gone"));
    }

    #[test]
    fn test_toggle_twice_deselects() {
        let mut selection = SelectionManager::default();
        assert!(selection.toggle("a"));
        assert!(!selection.toggle("a"));
        assert_eq!(selection.len(), 0);
    }

    #[test]
    fn test_toggle_page_selects_then_clears() {
        let mut selection = SelectionManager::default();
        let rows = page(&["a", "b"]);
        selection.select("zzz");

        selection.toggle_page(&rows);
        assert_eq!(selection.len(), 3);

        selection.toggle_page(&rows);
        assert_eq!(selection.len(), 1);
        assert!(selection.is_selected("zzz"));
    }

    #[test]
    fn test_resolve_mixes_page_and_batch_rows() {
        let source = MemorySource::new(page(&["a", "b", "c", "d"]));
        let mut selection = SelectionManager::default();
        selection.select("d");
        selection.select("a");

        let resolution = selection.resolve_selected_entities(
            &page(&["a", "b"]),
            &RowIdentity::new(),
            &source,
            &["name".to_string()],
        );

        let ids: Vec<&str> = resolution.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);
        assert!(resolution.unresolved.is_empty());
        assert!(resolution.warning.is_none());
    }

    #[test]
    fn test_failed_lookup_yields_placeholders() {
        let mut selection = SelectionManager::default();
        selection.select("a");
        selection.select("b");
        selection.select("off-page");

        let resolution = selection.resolve_selected_entities(
            &page(&["a", "b", "c"]),
            &RowIdentity::new(),
            &BrokenLookup,
            &["name".to_string()],
        );

        assert_eq!(resolution.entities.len(), 3);
        assert_eq!(resolution.unresolved, vec!["off-page".to_string()]);
        let placeholder = &resolution.entities[2];
        assert!(placeholder.placeholder);
        assert_eq!(placeholder.text("name"), PLACEHOLDER_TEXT);
        assert!(resolution.warning.unwrap().contains("offline"));
    }

    #[test]
    fn test_unknown_ids_yield_placeholders() {
        let source = MemorySource::new(page(&["a"]));
        let mut selection = SelectionManager::default();
        selection.select("missing");

        let resolution =
            selection.resolve_selected_entities(&[], &RowIdentity::new(), &source, &[]);
        assert_eq!(resolution.entities.len(), 1);
        assert!(resolution.entities[0].placeholder);
        assert!(resolution.warning.is_some());
    }

    #[test]
    fn test_selected_child_resolves_from_page() {
        let parent = Entity::new("p").with_children(vec![Entity::new("").with("name", "kid")]);
        let mut selection = SelectionManager::default();
        selection.select("p.0");

        let resolution = selection.resolve_selected_entities(
            &[parent],
            &RowIdentity::new(),
            &BrokenLookup,
            &[],
        );
        assert_eq!(resolution.entities[0].text("name"), "kid");
        assert_eq!(resolution.entities[0].id, "p.0");
        assert!(resolution.warning.is_none());
    }

    #[test]
    fn test_cascade_policy_selects_children() {
        let parent = Entity::new("p").with_children(vec![Entity::new(""), Entity::new("")]);
        let rows = materialize(&[parent], &Expanded::All(true), &RowIdentity::new());
        let child_ids = vec!["p.0".to_string(), "p.1".to_string()];

        let mut cascading = SelectionManager::new(SelectionPolicy {
            cascade_children: true,
        });
        cascading.toggle_row(&rows[0], &child_ids);
        assert_eq!(cascading.len(), 3);
        cascading.toggle_row(&rows[0], &child_ids);
        assert_eq!(cascading.len(), 0);

        let mut plain = SelectionManager::default();
        plain.toggle_row(&rows[0], &child_ids);
        assert_eq!(plain.len(), 1);
    }

    fn order_with_items(id: &str, items: &[&str]) -> Entity {
        let children = items
            .iter()
            .map(|item| Entity::new("").with("name", *item))
            .collect();
        Entity::new(id).with("name", id).with_children(children)
    }

    #[test]
    fn test_off_page_child_resolves_through_its_parent() {
        let first_page = vec![order_with_items("a", &["Cable", "Dock"])];
        let source = MemorySource::new(vec![
            order_with_items("a", &["Cable", "Dock"]),
            order_with_items("b", &[]),
        ]);
        let rows = materialize(&first_page, &Expanded::All(true), &RowIdentity::new());
        let mut selection = SelectionManager::default();
        selection.toggle_row(&rows[2], &[]);

        let resolution = selection.resolve_selected_entities(
            &page(&["b"]),
            &RowIdentity::new(),
            &source,
            &["name".to_string()],
        );

        assert!(resolution.warning.is_none());
        assert_eq!(resolution.entities[0].id, "a.1");
        assert_eq!(resolution.entities[0].text("name"), "Dock");
        assert!(resolution.nested.is_empty());
    }

    #[test]
    fn test_cascaded_children_fold_into_selected_parent() {
        let parent = order_with_items("a", &["Cable", "Dock", "Mouse"]);
        let rows = materialize(&[parent.clone()], &Expanded::All(true), &RowIdentity::new());
        let child_ids: Vec<String> = (0..3).map(|i| format!("a.{}", i)).collect();
        let mut selection = SelectionManager::new(SelectionPolicy {
            cascade_children: true,
        });
        selection.toggle_row(&rows[0], &child_ids);

        let resolution =
            selection.resolve_selected_entities(&[parent], &RowIdentity::new(), &BrokenLookup, &[]);
        assert_eq!(resolution.entities.len(), 4);
        assert_eq!(resolution.nested, BTreeSet::from([1, 2, 3]));

        let rows = resolution.into_export_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].child_list().len(), 3);
    }
}
