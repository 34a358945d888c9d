//! Typed errors for the controller services
//!
//! The application edge (`main`, `App`, components) works with `anyhow`,
//! while each service reports failures through one of these enums so the
//! controller can turn them into in-place state instead of propagating.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a data-source call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source answered but flagged the response as unsuccessful
    #[error("data source rejected the request: {0}")]
    Rejected(String),

    /// The source could not be reached or failed while producing a result
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The worker thread went away before delivering a result
    #[error("fetch worker disconnected before responding")]
    Disconnected,

    /// The source cannot return every row in one call
    #[error("data source does not support full retrieval")]
    FullRetrievalUnsupported,
}

/// Failure of the durable column layout backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access layout file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode layout: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of an export run
///
/// An empty data set is not an error; see `ExportOutcome::NoData`.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not resolve export rows: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to build spreadsheet: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no visible columns to export")]
    NoColumns,
}
