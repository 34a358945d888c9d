//! Model layer
//!
//! - `query` - the typed query state mirrored into the location
//! - `entity` - rows as returned by a data source
//! - `row` - rendered rows after hierarchy materialization
//! - `column` - column definitions and the persisted layout
//! - `modal` - modal overlay management

pub mod column;
pub mod entity;
pub mod modal;
pub mod query;
pub mod row;

pub use column::ColumnDef;
pub use row::RowNode;
