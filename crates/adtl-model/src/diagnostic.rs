//! Non-fatal findings surfaced to the caller after a parse.

use serde::Serialize;
use serde_json::Value;

/// A diagnostic message raised while aggregating rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,

    /// Message text.
    pub message: String,

    /// Output table the finding belongs to.
    pub table: Option<String>,

    /// Associated attribute (if any).
    pub attribute: Option<String>,

    /// Input row index (if applicable).
    pub row: Option<usize>,

    /// Value that was replaced (if applicable).
    pub previous: Option<Value>,

    /// Value that replaced it (if applicable).
    pub value: Option<Value>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            table: None,
            attribute: None,
            row: None,
            previous: None,
            value: None,
        }
    }

    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    /// Create an info diagnostic.
    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    #[must_use]
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Record an overwrite from `previous` to `value`.
    #[must_use]
    pub fn with_change(mut self, previous: Value, value: Value) -> Self {
        self.previous = Some(previous);
        self.value = Some(value);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}
