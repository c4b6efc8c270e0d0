//! Module for reading case data
pub mod json;

use thiserror::Error;

/// Errors raised while reading a case from disk
#[derive(Error, Debug)]
pub enum IoError {
    /// The case file could not be opened
    #[error("case file not found: {0}")]
    FileNotFound(String),
    /// The case file was not valid JSON of the expected shape
    #[error("failed to deserialize case: {0}")]
    DeserializeError(String),
    /// A cell held a JSON value that is not null, a string, or a number
    #[error("unsupported cell value in table '{table}' column '{column}'")]
    UnsupportedValue { table: String, column: String },
}
