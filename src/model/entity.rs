//! Entities returned by the data source

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text shown in every field of a placeholder entity
pub const PLACEHOLDER_TEXT: &str = "N/A";

/// A row of business data
///
/// `id` is the stable identity declared by the source. Children may omit it;
/// their row identity is derived from the parent (see `RowIdentity`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub id: String,
    /// Declared row kind, used to split exports into groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, rename = "subRows", skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Entity>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Synthesized because the real entity could not be resolved
    #[serde(skip)]
    pub placeholder: bool,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            children: None,
            fields: Map::new(),
            placeholder: false,
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Entity>) -> Self {
        self.children = Some(children);
        self
    }

    /// Stand-in for an entity that could not be resolved
    ///
    /// Every requested column gets the sentinel text so exports keep their
    /// shape; the id column keeps the real id so the row can be traced.
    pub fn placeholder(id: &str, columns: &[String]) -> Self {
        let mut entity = Entity::new(id);
        for column in columns.iter().filter(|c| c.as_str() != "id") {
            entity
                .fields
                .insert(column.clone(), Value::from(PLACEHOLDER_TEXT));
        }
        entity.placeholder = true;
        entity
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Display text for a field; missing and null fields are empty
    pub fn text(&self, key: &str) -> String {
        if key == "id" && !self.fields.contains_key("id") {
            return self.id.clone();
        }
        self.fields.get(key).map(value_text).unwrap_or_default()
    }

    pub fn child_list(&self) -> &[Entity] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn has_children(&self) -> bool {
        !self.child_list().is_empty()
    }
}

/// Render a JSON value the way a cell shows it
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Pagination metadata reported by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

/// One page as returned by `fetch_page`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    pub data: Vec<Entity>,
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
