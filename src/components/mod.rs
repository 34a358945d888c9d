//! UI Components
//!
//! Each component owns its view state and turns key events into Actions.
//! Only the App touches the table controller.

pub mod browser;
pub mod column_dialog;
pub mod export_dialog;
pub mod filter_dialog;
pub mod help_dialog;
pub mod layout;
pub mod location_dialog;
pub mod quit_dialog;

pub use browser::{draw_browser, BrowserComponent, BrowserRenderContext};
pub use column_dialog::{ColumnDialog, ColumnEntry};
pub use export_dialog::ExportDialog;
pub use filter_dialog::FilterDialog;
pub use help_dialog::HelpDialog;
pub use layout::centered_popup;
pub use location_dialog::LocationDialog;
pub use quit_dialog::QuitDialog;
