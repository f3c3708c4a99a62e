use std::path::PathBuf;

use adtl_core::ValidationReport;
use adtl_model::{Diagnostic, FieldCoverage, TableKind};

#[derive(Debug)]
pub struct ParseResult {
    pub spec_name: String,
    pub output_dir: Option<PathBuf>,
    pub tables: Vec<TableSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct TableSummary {
    pub name: String,
    pub kind: TableKind,
    pub rows: usize,
    pub validation: Option<ValidationReport>,
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CheckResult {
    pub spec_name: String,
    pub coverage: FieldCoverage,
}
