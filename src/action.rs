//! Action enum - All possible application actions
//!
//! Components turn key events into Actions; the App applies them to the
//! table controller and its own view state.

use std::fmt;

/// All possible actions in the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ─────────────────────────────────────────────────────────────────────────
    // App Lifecycle
    // ─────────────────────────────────────────────────────────────────────────
    /// Regular tick: polls fetches, debounced writes and layout persistence
    Tick,
    /// Terminal was resized
    Resize(u16, u16),
    /// Quit without confirmation (pending writes are flushed first)
    ForceQuit,

    // ─────────────────────────────────────────────────────────────────────────
    // Row cursor
    // ─────────────────────────────────────────────────────────────────────────
    NextRow,
    PrevRow,
    FirstRow,
    LastRow,

    // ─────────────────────────────────────────────────────────────────────────
    // Paging
    // ─────────────────────────────────────────────────────────────────────────
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    /// Switch to the next configured page size
    CyclePageSize,

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────
    EnterSearchMode,
    ExitSearchMode,
    SearchInput(char),
    SearchBackspace,

    // ─────────────────────────────────────────────────────────────────────────
    // Columns
    // ─────────────────────────────────────────────────────────────────────────
    /// Move the column cursor
    FocusNextColumn,
    FocusPrevColumn,
    /// Sort by the focused column, toggling direction when already sorted
    ToggleSort,
    /// Widen (positive) or narrow (negative) the focused column
    ResizeColumn(i32),
    /// Move the focused column left (negative) or right (positive)
    MoveColumn(isize),
    ResetLayout,

    // ─────────────────────────────────────────────────────────────────────────
    // Rows
    // ─────────────────────────────────────────────────────────────────────────
    /// Expand or collapse the parent row under the cursor
    ToggleExpand,
    ExpandAll,
    CollapseAll,
    ToggleRowSelection,
    TogglePageSelection,
    ClearSelection,

    // ─────────────────────────────────────────────────────────────────────────
    // Query
    // ─────────────────────────────────────────────────────────────────────────
    /// Drop every query parameter and the selection
    ResetAll,
    /// Re-issue the last failed fetch
    Retry,
    /// Replace the query with a pasted location
    ApplyLocation(String),
    /// Date range plus a filter value for one column; empty values clear
    ApplyFilters {
        from_date: String,
        to_date: String,
        column_id: String,
        value: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Modals
    // ─────────────────────────────────────────────────────────────────────────
    OpenQuitDialog,
    OpenHelp,
    OpenExportDialog,
    OpenColumnDialog,
    OpenLocationDialog,
    OpenFilterDialog,
    CloseModal,
    /// Toggle visibility of a column from the column dialog
    ToggleColumnVisibility(String),
    /// Run the export configured in the export dialog
    RunExport,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tick => write!(f, "Tick"),
            Action::Resize(w, h) => write!(f, "Resize({}, {})", w, h),
            Action::ForceQuit => write!(f, "ForceQuit"),
            Action::NextRow => write!(f, "NextRow"),
            Action::PrevRow => write!(f, "PrevRow"),
            Action::FirstRow => write!(f, "FirstRow"),
            Action::LastRow => write!(f, "LastRow"),
            Action::NextPage => write!(f, "NextPage"),
            Action::PrevPage => write!(f, "PrevPage"),
            Action::FirstPage => write!(f, "FirstPage"),
            Action::LastPage => write!(f, "LastPage"),
            Action::CyclePageSize => write!(f, "CyclePageSize"),
            Action::EnterSearchMode => write!(f, "EnterSearchMode"),
            Action::ExitSearchMode => write!(f, "ExitSearchMode"),
            Action::SearchInput(c) => write!(f, "SearchInput('{}')", c),
            Action::SearchBackspace => write!(f, "SearchBackspace"),
            Action::FocusNextColumn => write!(f, "FocusNextColumn"),
            Action::FocusPrevColumn => write!(f, "FocusPrevColumn"),
            Action::ToggleSort => write!(f, "ToggleSort"),
            Action::ResizeColumn(delta) => write!(f, "ResizeColumn({})", delta),
            Action::MoveColumn(delta) => write!(f, "MoveColumn({})", delta),
            Action::ResetLayout => write!(f, "ResetLayout"),
            Action::ToggleExpand => write!(f, "ToggleExpand"),
            Action::ExpandAll => write!(f, "ExpandAll"),
            Action::CollapseAll => write!(f, "CollapseAll"),
            Action::ToggleRowSelection => write!(f, "ToggleRowSelection"),
            Action::TogglePageSelection => write!(f, "TogglePageSelection"),
            Action::ClearSelection => write!(f, "ClearSelection"),
            Action::ResetAll => write!(f, "ResetAll"),
            Action::Retry => write!(f, "Retry"),
            Action::ApplyLocation(location) => write!(f, "ApplyLocation({})", location),
            Action::ApplyFilters {
                from_date,
                to_date,
                column_id,
                value,
            } => write!(
                f,
                "ApplyFilters({}..{}, {}={})",
                from_date, to_date, column_id, value
            ),
            Action::OpenQuitDialog => write!(f, "OpenQuitDialog"),
            Action::OpenHelp => write!(f, "OpenHelp"),
            Action::OpenExportDialog => write!(f, "OpenExportDialog"),
            Action::OpenColumnDialog => write!(f, "OpenColumnDialog"),
            Action::OpenLocationDialog => write!(f, "OpenLocationDialog"),
            Action::OpenFilterDialog => write!(f, "OpenFilterDialog"),
            Action::CloseModal => write!(f, "CloseModal"),
            Action::ToggleColumnVisibility(id) => write!(f, "ToggleColumnVisibility({})", id),
            Action::RunExport => write!(f, "RunExport"),
        }
    }
}
