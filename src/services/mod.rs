//! Services behind the table controller
//!
//! - Location parsing and the URL-backed state store
//! - Debounced writes
//! - Page fetching against a data source
//! - Row hierarchy and selection
//! - Column layout persistence
//! - CSV / XLSX export

pub mod data_source;
pub mod debounce;
pub mod export;
pub mod fetch;
pub mod hierarchy;
pub mod layout_store;
pub mod location;
pub mod selection;
pub mod url_state;

pub use data_source::{DataSource, MemorySource};
pub use export::ExportOutcome;
pub use fetch::FetchStrategy;
pub use layout_store::{JsonFileBackend, LayoutBackend};
pub use location::Location;
pub use selection::SelectionPolicy;
