//! Export pipeline
//!
//! Resolves the rows for a scope, shapes them into one or more tables
//! according to the flatten policy, and writes CSV files or an XLSX workbook.
//!
//! Column contract: only the visible columns are exported, in the current
//! left-to-right order. Fields that a row transform adds are appended after
//! them in the order they are first seen.

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use unicode_width::UnicodeWidthStr;

use crate::error::{ExportError, FetchError};
use crate::model::entity::{value_text, Entity};
use crate::model::query::PageRequest;
use crate::services::data_source::DataSource;
use crate::services::hierarchy::RowIdentity;
use crate::services::selection::SelectionManager;

/// Characters a worksheet name may not contain
static SHEET_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\[\]:*?/\\]").unwrap());

/// Runs of characters not allowed in export file names
static FILE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

const MAX_SHEET_NAME: usize = 31;
const MAX_XLSX_WIDTH: usize = 50;

// ═══════════════════════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════════════════════

/// How child rows end up in the output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlattenPolicy {
    /// Top-level rows only
    #[default]
    Skip,
    /// Children follow their parent, indented in the first textual column
    FlattenWithIndent { indent: String, max_depth: usize },
    /// One output group per row kind
    SeparateGroups { kind_field: Option<String> },
}

impl FlattenPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            FlattenPolicy::Skip => "Top-level rows only",
            FlattenPolicy::FlattenWithIndent { .. } => "Flatten with indent",
            FlattenPolicy::SeparateGroups { .. } => "Separate groups",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportScope {
    #[default]
    Selected,
    CurrentPage,
    AllPages,
}

impl ExportScope {
    pub fn label(&self) -> &'static str {
        match self {
            ExportScope::Selected => "Selected rows",
            ExportScope::CurrentPage => "Current page",
            ExportScope::AllPages => "All pages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

pub type RowTransform = dyn Fn(&Entity) -> Entity + Send + Sync;

/// Everything the pipeline needs besides the rows themselves
pub struct ExportRequest<'a> {
    /// Visible column ids in display order
    pub columns: Vec<String>,
    /// Header text per column id; ids without an entry are used verbatim
    pub display_names: HashMap<String, String>,
    pub flatten: FlattenPolicy,
    pub transform: Option<&'a RowTransform>,
    pub format: ExportFormat,
    /// Declared widths for spreadsheet columns
    pub widths: BTreeMap<String, u16>,
    /// File name prefix, typically the table identity
    pub file_stem: String,
}

/// Result of a completed export
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Written {
        paths: Vec<PathBuf>,
        rows: usize,
        groups: usize,
        warning: Option<String>,
    },
    /// Nothing to export; no file was written
    NoData,
}

/// One output group: a CSV file or an XLSX worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub name: String,
    pub columns: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope Resolution
// ═══════════════════════════════════════════════════════════════════════════════

/// Where each scope reads its rows from
pub struct ScopeInputs<'a> {
    pub page: &'a [Entity],
    pub selection: &'a SelectionManager,
    pub identity: &'a RowIdentity,
    pub source: &'a dyn DataSource,
    pub request: &'a PageRequest,
    pub columns: &'a [String],
}

/// Rows for a scope, plus a warning if some had to be replaced by placeholders
pub fn resolve_scope(
    scope: ExportScope,
    inputs: &ScopeInputs<'_>,
) -> Result<(Vec<Entity>, Option<String>), ExportError> {
    match scope {
        ExportScope::Selected => {
            let resolution = inputs.selection.resolve_selected_entities(
                inputs.page,
                inputs.identity,
                inputs.source,
                inputs.columns,
            );
            // Selected children of a selected row come out with that row
            let warning = resolution.warning.clone();
            Ok((resolution.into_export_rows(), warning))
        }
        ExportScope::CurrentPage => Ok((inputs.page.to_vec(), None)),
        ExportScope::AllPages => {
            if !inputs.source.supports_full_retrieval() {
                return Err(FetchError::FullRetrievalUnsupported.into());
            }
            Ok((inputs.source.fetch_all(inputs.request)?, None))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shaping
// ═══════════════════════════════════════════════════════════════════════════════

/// A row after flattening, before it is split into groups
struct FlatRow {
    depth: usize,
    group: String,
    entity: Entity,
    /// Fields the transform added to this row
    introduced: Vec<String>,
}

/// Shape entities into output tables
pub fn build_tables(entities: &[Entity], request: &ExportRequest<'_>) -> Vec<ExportTable> {
    let mut flat = Vec::new();
    for entity in entities {
        flatten_into(&mut flat, entity, 0, &request.flatten);
    }

    let rows: Vec<FlatRow> = flat
        .into_iter()
        .map(|row| match request.transform {
            Some(transform) => {
                let entity = transform(&row.entity);
                let introduced = entity
                    .fields
                    .keys()
                    .filter(|key| !row.entity.fields.contains_key(key.as_str()))
                    .cloned()
                    .collect();
                FlatRow {
                    entity,
                    introduced,
                    ..row
                }
            }
            None => row,
        })
        .collect();

    let columns = output_columns(&request.columns, &rows);
    let headers: Vec<String> = columns
        .iter()
        .map(|id| request.display_names.get(id).cloned().unwrap_or_else(|| id.clone()))
        .collect();

    let indent = match &request.flatten {
        FlattenPolicy::FlattenWithIndent { indent, .. } => Some(indent.as_str()),
        _ => None,
    };

    let mut groups: IndexMap<String, Vec<Vec<Value>>> = IndexMap::new();
    for row in &rows {
        let mut cells: Vec<Value> = columns
            .iter()
            .map(|id| cell_value(&row.entity, id))
            .collect();
        if let Some(indent) = indent.filter(|_| row.depth > 0) {
            indent_first_text(&mut cells, &indent.repeat(row.depth));
        }
        groups.entry(row.group.clone()).or_default().push(cells);
    }

    groups
        .into_iter()
        .map(|(name, rows)| ExportTable {
            name,
            columns: columns.clone(),
            headers: headers.clone(),
            rows,
        })
        .collect()
}

fn flatten_into(out: &mut Vec<FlatRow>, entity: &Entity, depth: usize, policy: &FlattenPolicy) {
    let group = match policy {
        FlattenPolicy::SeparateGroups { kind_field } => row_kind(entity, depth, kind_field.as_deref()),
        _ => String::new(),
    };
    out.push(FlatRow {
        depth,
        group,
        entity: entity.clone(),
        introduced: Vec::new(),
    });

    let descend = match policy {
        FlattenPolicy::Skip => false,
        FlattenPolicy::FlattenWithIndent { max_depth, .. } => depth < *max_depth,
        FlattenPolicy::SeparateGroups { .. } => true,
    };
    if descend {
        for child in entity.child_list() {
            flatten_into(out, child, depth + 1, policy);
        }
    }
}

/// Declared kind (entity kind, then `kind_field`), else detected from depth
fn row_kind(entity: &Entity, depth: usize, kind_field: Option<&str>) -> String {
    entity
        .kind
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| {
            kind_field
                .map(|field| entity.text(field))
                .filter(|k| !k.is_empty())
        })
        .unwrap_or_else(|| if depth == 0 { "parent" } else { "child" }.to_string())
}

/// Visible columns, then fields only the transform produced
fn output_columns(visible: &[String], rows: &[FlatRow]) -> Vec<String> {
    let mut columns = visible.to_vec();
    for key in rows.iter().flat_map(|row| row.introduced.iter()) {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

fn cell_value(entity: &Entity, column: &str) -> Value {
    match entity.field(column) {
        Some(value) => value.clone(),
        None if column == "id" && !entity.id.is_empty() => Value::from(entity.id.clone()),
        None => Value::Null,
    }
}

fn indent_first_text(cells: &mut [Value], prefix: &str) {
    let target = cells
        .iter_mut()
        .find(|c| c.as_str().is_some_and(|text| !text.is_empty()));
    if let Some(cell) = target {
        *cell = Value::from(format!("{}{}", prefix, value_text(cell)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════════

/// CSV bytes for one table: header row, then one record per row
pub fn render_csv(table: &ExportTable) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(value_text))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(bytes)
}

/// An XLSX workbook with one worksheet per table
pub fn render_xlsx(
    tables: &[ExportTable],
    widths: &BTreeMap<String, u16>,
) -> Result<Workbook, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let mut used_names: Vec<String> = Vec::new();

    for table in tables {
        let name = unique_sheet_name(&table.name, &used_names);
        used_names.push(name.clone());

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name)?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let excel_row = (r + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                match value {
                    Value::Null => {}
                    Value::Number(n) => match n.as_f64() {
                        Some(number) => {
                            worksheet.write_number(excel_row, col as u16, number)?;
                        }
                        None => {
                            worksheet.write_string(excel_row, col as u16, n.to_string())?;
                        }
                    },
                    Value::Bool(b) => {
                        worksheet.write_boolean(excel_row, col as u16, *b)?;
                    }
                    other => {
                        worksheet.write_string(excel_row, col as u16, value_text(other))?;
                    }
                }
            }
        }
        for (col, id) in table.columns.iter().enumerate() {
            let width = widths
                .get(id)
                .map(|w| *w as usize)
                .unwrap_or_else(|| content_width(table, col));
            worksheet.set_column_width(col as u16, width as f64)?;
        }
    }

    Ok(workbook)
}

/// Widest cell (or header) in a column, plus padding, capped
fn content_width(table: &ExportTable, col: usize) -> usize {
    let header = table.headers.get(col).map(|h| h.width()).unwrap_or(0);
    let widest = table
        .rows
        .iter()
        .filter_map(|row| row.get(col))
        .map(|value| value_text(value).width())
        .max()
        .unwrap_or(0);
    (header.max(widest) + 2).min(MAX_XLSX_WIDTH)
}

/// A legal worksheet name, distinct from `used` (case-insensitively)
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned = SHEET_NAME_REGEX.replace_all(name, "_");
    let cleaned = cleaned.trim_matches('\'');
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME).collect();
    if truncated.trim().is_empty() {
        "Sheet".to_string()
    } else {
        truncated
    }
}

fn unique_sheet_name(name: &str, used: &[String]) -> String {
    let base = sanitize_sheet_name(name);
    let taken = |candidate: &str| used.iter().any(|u| u.eq_ignore_ascii_case(candidate));
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| {
            let suffix = format!(" ({})", n);
            let room = MAX_SHEET_NAME - suffix.len();
            let head: String = base.chars().take(room).collect();
            format!("{}{}", head, suffix)
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

/// `{stem}[-{group}]-{timestamp}.{ext}` with unsafe characters replaced
pub fn export_file_name(
    stem: &str,
    group: Option<&str>,
    format: ExportFormat,
    at: DateTime<Local>,
) -> String {
    let clean = |s: &str| FILE_NAME_REGEX.replace_all(s, "_").trim_matches('_').to_string();
    let mut name = clean(stem);
    if name.is_empty() {
        name = "export".to_string();
    }
    if let Some(group) = group.map(clean).filter(|g| !g.is_empty()) {
        name.push('-');
        name.push_str(&group);
    }
    format!("{}-{}.{}", name, at.format("%Y%m%d-%H%M%S"), format.extension())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape and write `entities`; an empty set is reported, not written
pub fn run_export(
    entities: &[Entity],
    request: &ExportRequest<'_>,
    dir: &Path,
    warning: Option<String>,
) -> Result<ExportOutcome, ExportError> {
    if entities.is_empty() {
        tracing::info!("export requested with no rows; nothing written");
        return Ok(ExportOutcome::NoData);
    }

    let tables = build_tables(entities, request);
    if tables.first().map_or(true, |t| t.columns.is_empty()) {
        return Err(ExportError::NoColumns);
    }
    let rows = tables.iter().map(|t| t.rows.len()).sum();

    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| ExportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let now = Local::now();
    let paths = match request.format {
        ExportFormat::Csv => {
            let grouped = tables.len() > 1;
            let mut paths = Vec::with_capacity(tables.len());
            for table in &tables {
                let group = grouped.then_some(table.name.as_str());
                let path = dir.join(export_file_name(&request.file_stem, group, ExportFormat::Csv, now));
                let bytes = render_csv(table)?;
                fs::write(&path, bytes).map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;
                paths.push(path);
            }
            paths
        }
        ExportFormat::Xlsx => {
            let path = dir.join(export_file_name(&request.file_stem, None, ExportFormat::Xlsx, now));
            let mut workbook = render_xlsx(&tables, &request.widths)?;
            workbook.save(&path)?;
            vec![path]
        }
    };

    tracing::info!(
        rows,
        groups = tables.len(),
        files = paths.len(),
        format = request.format.extension(),
        "export written"
    );

    Ok(ExportOutcome::Written {
        paths,
        rows,
        groups: tables.len(),
        warning,
    })
}
