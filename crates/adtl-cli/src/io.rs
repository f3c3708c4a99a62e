//! CSV adapters: source rows in, one output file per table.

use std::fs::File;
use std::path::{Path, PathBuf};

use adtl_model::Row;
use adtl_model::value::to_text;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;

/// Header and rows of a source CSV file.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

fn normalize_header(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Read a CSV file; every cell becomes a string, empty cells included.
pub fn read_source(path: &Path) -> Result<SourceData> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .iter()
        .map(normalize_header)
        .collect();
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("read record {} of {}", index + 1, path.display()))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }
    tracing::debug!(path = %path.display(), rows = rows.len(), "read source file");
    Ok(SourceData { headers, rows })
}

/// Header of a CSV file without reading its records.
pub fn read_headers(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?;
    Ok(headers.iter().map(normalize_header).collect())
}

/// `<dir>/<spec-name>-<table>.csv`
pub fn output_path(dir: &Path, spec_name: &str, table: &str) -> PathBuf {
    dir.join(format!("{spec_name}-{table}.csv"))
}

/// Text of one output cell. Lists are joined with `, `; null is empty.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => items.iter().map(to_text).collect::<Vec<_>>().join(", "),
        Some(other) => to_text(other),
    }
}

/// Write `rows` under `columns`; keys outside `columns` are not written.
pub fn write_table(path: &Path, columns: &[String], rows: &[Row]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(columns)
        .with_context(|| format!("write header of {}", path.display()))?;
    for row in rows {
        let record: Vec<String> = columns.iter().map(|column| cell_text(row.get(column))).collect();
        writer
            .write_record(&record)
            .with_context(|| format!("write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
