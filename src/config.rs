use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::model::entity::Entity;
use crate::services::export::{ExportFormat, FlattenPolicy, RowTransform};
use crate::services::fetch::FetchStrategy;
use crate::services::hierarchy::RowIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity for the durable column layout
    #[serde(default = "default_table_id")]
    pub table_id: String,
    /// JSON array of rows to browse; the generated sample is used when empty
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub export_dir: String,
    /// Quiet period for search and layout writes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub fetch_strategy: FetchStrategy,
    /// Selecting a row also selects its children
    #[serde(default)]
    pub cascade_selection: bool,
    /// Child field that names child rows; positions are used when unset or empty
    #[serde(default)]
    pub child_id_field: Option<String>,
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default = "default_indent")]
    pub export_indent: String,
    #[serde(default = "default_max_depth")]
    pub export_max_depth: usize,
    /// Field naming the row kind for grouped exports
    #[serde(default)]
    pub export_kind_field: Option<String>,
    /// Extra export column holding each row's number of children
    #[serde(default)]
    pub export_child_count_field: Option<String>,
    /// Page sizes offered by the page size selector
    #[serde(default = "default_page_sizes")]
    pub page_size_options: Vec<u32>,
}

fn default_table_id() -> String {
    "orders".to_string()
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_indent() -> String {
    "  ".to_string()
}

fn default_max_depth() -> usize {
    3
}

fn default_page_sizes() -> Vec<u32> {
    vec![10, 20, 50, 100]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_id: default_table_id(),
            data_path: String::new(),
            export_dir: String::new(),
            debounce_ms: default_debounce_ms(),
            fetch_strategy: FetchStrategy::default(),
            cascade_selection: false,
            child_id_field: None,
            export_format: ExportFormat::default(),
            export_indent: default_indent(),
            export_max_depth: default_max_depth(),
            export_kind_field: None,
            export_child_count_field: None,
            page_size_options: default_page_sizes(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        let home = env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".gridstate"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    pub fn layouts_dir() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("layouts"))
    }

    pub fn logs_dir() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("logs"))
    }

    pub fn exists() -> bool {
        Self::config_path().is_some_and(|path| path.exists())
    }

    /// Load the config, or defaults when the file is missing or unreadable
    pub fn load() -> Config {
        let Some(config_path) = Self::config_path() else {
            return Config::default();
        };
        if !config_path.exists() {
            return Config::default();
        }

        let parsed = fs::read_to_string(&config_path)
            .map_err(|e| e.to_string())
            .and_then(|contents| Self::parse(&contents));
        match parsed {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Config, String> {
        serde_json::from_str(contents).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save the config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let config_dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        let config_path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Directory exports are written to; the working directory if unset
    pub fn export_dir(&self) -> PathBuf {
        if self.export_dir.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.export_dir)
        }
    }

    /// Flatten policies offered by the export dialog, in display order
    pub fn flatten_policies(&self) -> Vec<FlattenPolicy> {
        vec![
            FlattenPolicy::Skip,
            FlattenPolicy::FlattenWithIndent {
                indent: self.export_indent.clone(),
                max_depth: self.export_max_depth,
            },
            FlattenPolicy::SeparateGroups {
                kind_field: self.export_kind_field.clone(),
            },
        ]
    }

    /// Child row ids: `{parent}.{field value}`, or `{parent}.{position}`
    pub fn row_identity(&self) -> RowIdentity {
        let Some(field) = self.child_id_field.clone() else {
            return RowIdentity::new();
        };
        RowIdentity::new().with_child_id(move |parent_id, position, child| {
            let key = child.text(&field);
            if key.is_empty() {
                format!("{}.{}", parent_id, position)
            } else {
                format!("{}.{}", parent_id, key)
            }
        })
    }

    pub fn export_transform(&self) -> Option<Box<RowTransform>> {
        let field = self.export_child_count_field.clone()?;
        Some(Box::new(move |entity: &Entity| {
            entity
                .clone()
                .with(&field, entity.child_list().len() as u64)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::parse(r#"{"table_id": "invoices", "debounce_ms": 250}"#).unwrap();
        assert_eq!(config.table_id, "invoices");
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.fetch_strategy, FetchStrategy::Subscription);
        assert_eq!(config.page_size_options, vec![10, 20, 50, 100]);
        assert!(!config.cascade_selection);
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let err = Config::parse(r#"{"debounce_ms": "soon"}"#).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn test_fetch_strategy_is_lowercase() {
        let config = Config::parse(r#"{"fetch_strategy": "call", "export_format": "xlsx"}"#)
            .unwrap();
        assert_eq!(config.fetch_strategy, FetchStrategy::Call);
        assert_eq!(config.export_format, ExportFormat::Xlsx);
    }

    #[test]
    fn test_child_id_field_names_children() {
        let config = Config::parse(r#"{"child_id_field": "sku"}"#).unwrap();
        let identity = config.row_identity();
        let named = Entity::new("").with("sku", "KB-1");
        assert_eq!(identity.child_id("ORD-1", 0, &named), "ORD-1.KB-1");
        assert_eq!(identity.child_id("ORD-1", 3, &Entity::new("")), "ORD-1.3");

        let positional = Config::default().row_identity();
        assert_eq!(positional.child_id("ORD-1", 0, &named), "ORD-1.0");
    }

    #[test]
    fn test_child_count_transform() {
        assert!(Config::default().export_transform().is_none());

        let config = Config::parse(r#"{"export_child_count_field": "items"}"#).unwrap();
        let transform = config.export_transform().unwrap();
        let order = Entity::new("o").with_children(vec![Entity::new(""), Entity::new("")]);
        assert_eq!(transform(&order).text("items"), "2");
    }

    #[test]
    fn test_export_dir_defaults_to_cwd() {
        assert_eq!(Config::default().export_dir(), PathBuf::from("."));
    }
}
