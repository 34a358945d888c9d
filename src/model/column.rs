//! Column definitions and the durable column layout

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Narrowest width a column may be resized to
pub const MIN_COLUMN_WIDTH: u16 = 4;

/// A column the table can show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    pub header: String,
    #[serde(default = "default_width")]
    pub default_width: u16,
    #[serde(default = "default_true")]
    pub hideable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
}

fn default_width() -> u16 {
    14
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    pub fn new(id: &str, header: &str, default_width: u16) -> Self {
        Self {
            id: id.to_string(),
            header: header.to_string(),
            default_width,
            hideable: true,
            sortable: true,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.hideable = false;
        self
    }
}

/// Width and order overrides for one table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnLayout {
    #[serde(default)]
    pub sizing: BTreeMap<String, u16>,
    #[serde(default)]
    pub order: Vec<String>,
}

impl ColumnLayout {
    pub fn is_empty(&self) -> bool {
        self.sizing.is_empty() && self.order.is_empty()
    }

    pub fn width_of(&self, column: &ColumnDef) -> u16 {
        self.sizing
            .get(&column.id)
            .copied()
            .unwrap_or(column.default_width)
    }

    /// Column ids in display order
    ///
    /// Ids named in `order` come first, in that order; ids it does not know
    /// keep their declared position after them. Unknown and repeated ids in
    /// `order` are ignored, so a stale or hand-edited layout never hides or
    /// duplicates a column.
    pub fn ordered_ids<'a>(&self, columns: &'a [ColumnDef]) -> Vec<&'a str> {
        let mut ids: Vec<&str> = Vec::with_capacity(columns.len());
        for id in &self.order {
            let Some(column) = columns.iter().find(|c| &c.id == id) else {
                continue;
            };
            if !ids.contains(&column.id.as_str()) {
                ids.push(column.id.as_str());
            }
        }
        for column in columns {
            if !ids.contains(&column.id.as_str()) {
                ids.push(column.id.as_str());
            }
        }
        ids
    }

    pub fn ordered<'a>(&self, columns: &'a [ColumnDef]) -> Vec<&'a ColumnDef> {
        self.ordered_ids(columns)
            .into_iter()
            .filter_map(|id| columns.iter().find(|c| c.id == id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "ID", 10).pinned(),
            ColumnDef::new("name", "Name", 20),
            ColumnDef::new("total", "Total", 10),
        ]
    }

    #[test]
    fn test_empty_layout_keeps_declared_order() {
        let layout = ColumnLayout::default();
        assert_eq!(layout.ordered_ids(&columns()), vec!["id", "name", "total"]);
        assert_eq!(layout.width_of(&columns()[1]), 20);
    }

    #[test]
    fn test_partial_order_puts_named_first() {
        let layout = ColumnLayout {
            sizing: BTreeMap::from([("total".to_string(), 7)]),
            order: vec!["total".to_string(), "gone".to_string(), "id".to_string()],
        };
        assert_eq!(layout.ordered_ids(&columns()), vec!["total", "id", "name"]);
        assert_eq!(layout.width_of(&columns()[2]), 7);
    }

    #[test]
    fn test_repeated_ids_in_order_render_once() {
        let layout = ColumnLayout {
            sizing: BTreeMap::new(),
            order: vec!["name".to_string(), "id".to_string(), "name".to_string()],
        };
        assert_eq!(layout.ordered_ids(&columns()), vec!["name", "id", "total"]);
        assert_eq!(layout.ordered(&columns()).len(), 3);
    }

    #[test]
    fn test_layout_json_shape() {
        let layout: ColumnLayout =
            serde_json::from_str(r#"{"sizing":{"name":30},"order":["name","id"]}"#).unwrap();
        assert_eq!(layout.sizing["name"], 30);
        assert_eq!(layout.order, vec!["name", "id"]);

        let partial: ColumnLayout = serde_json::from_str("{}").unwrap();
        assert!(partial.is_empty());
    }
}
