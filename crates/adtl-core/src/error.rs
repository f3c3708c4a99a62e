//! Error types for parse sessions.

use adtl_model::{RowEvaluationError, SpecificationError};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A row could not be evaluated; `fields` lists its non-empty fields.
    #[error("row {index}: {source}\n{fields}")]
    Row {
        index: usize,
        fields: String,
        #[source]
        source: RowEvaluationError,
    },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error(transparent)]
    Schema(#[from] SpecificationError),
}

pub type Result<T> = std::result::Result<T, ParseError>;
