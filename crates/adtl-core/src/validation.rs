//! Row validation hooks and the per-table validation report.

use std::collections::BTreeMap;

use adtl_model::Row;
use serde::Serialize;

/// Column set to `true`/`false` on every validated row.
pub const VALID_COLUMN: &str = "adtl_valid";
/// Column holding the validation message of an invalid row.
pub const ERROR_COLUMN: &str = "adtl_error";

/// Validates one output row, returning the failure message if it is invalid.
///
/// Schema compilation is left to the host; any closure of the right shape
/// is a validator.
pub trait RowValidator {
    fn validate(&self, row: &Row) -> Result<(), String>;
}

impl<F> RowValidator for F
where
    F: Fn(&Row) -> Result<(), String>,
{
    fn validate(&self, row: &Row) -> Result<(), String> {
        self(row)
    }
}

/// Validation counts for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub total_valid: usize,
    /// Failure message to number of rows failing with it.
    pub validation_errors: BTreeMap<String, usize>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_valid(&mut self) {
        self.total += 1;
        self.total_valid += 1;
    }

    pub fn record_invalid(&mut self, message: &str) {
        self.total += 1;
        *self
            .validation_errors
            .entry(message.to_string())
            .or_default() += 1;
    }

    /// Share of valid rows in percent; zero for an empty table.
    pub fn percentage_valid(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total_valid as f64 * 100.0 / self.total as f64
    }

    /// Failure messages, most frequent first.
    pub fn most_common(&self) -> Vec<(&str, usize)> {
        let mut errors: Vec<_> = self
            .validation_errors
            .iter()
            .map(|(message, count)| (message.as_str(), *count))
            .collect();
        errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        errors
    }
}
