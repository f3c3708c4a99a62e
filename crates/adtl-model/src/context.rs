//! Per-attribute evaluation settings.

use crate::header::DEFAULT_DATE_FORMAT;
use crate::pattern::Pattern;

/// Read-only settings for evaluating one attribute's rule.
///
/// Derived once per (table, attribute) from the header and the table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext {
    /// The attribute is a date in the target schema.
    pub is_date: bool,
    /// Source format assumed for date fields without `source_date`.
    pub default_date_format: String,
    /// Fields matching this pattern may be absent from a row.
    pub skip_pattern: Option<Pattern>,
    /// Pass unmatched or unconvertible values through instead of nulling them.
    pub return_unmatched: bool,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_date(mut self, is_date: bool) -> Self {
        self.is_date = is_date;
        self
    }

    #[must_use]
    pub fn with_default_date_format(mut self, format: impl Into<String>) -> Self {
        self.default_date_format = format.into();
        self
    }

    #[must_use]
    pub fn with_skip_pattern(mut self, pattern: Option<Pattern>) -> Self {
        self.skip_pattern = pattern;
        self
    }

    #[must_use]
    pub fn with_return_unmatched(mut self, return_unmatched: bool) -> Self {
        self.return_unmatched = return_unmatched;
        self
    }

    /// A field absent from a row is tolerated when it matches the skip pattern.
    pub fn skips(&self, field: &str) -> bool {
        self.skip_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.matches(field))
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            is_date: false,
            default_date_format: DEFAULT_DATE_FORMAT.to_string(),
            skip_pattern: None,
            return_unmatched: false,
        }
    }
}
