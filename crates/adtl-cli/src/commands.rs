use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use adtl_cli::io::{output_path, read_headers, read_source, write_table};
use adtl_cli::validator::SchemaValidator;
use adtl_core::ParseSession;
use adtl_model::Specification;
use adtl_spec::SpecLoader;

use crate::cli::{CheckArgs, ParseArgs};
use crate::types::{CheckResult, ParseResult, TableSummary};

fn load_spec(spec: &Path, include_def: &[PathBuf]) -> Result<Specification> {
    SpecLoader::new()
        .with_include_defs(include_def.iter().cloned())
        .load(spec)
        .with_context(|| format!("load specification {}", spec.display()))
}

pub fn run_parse(args: &ParseArgs) -> Result<ParseResult> {
    let started = Instant::now();
    let spec = load_spec(&args.spec, &args.include_def)?;
    let spec_name = spec.name().to_string();
    let _span = info_span!("parse", spec = %spec_name).entered();

    let mut session = ParseSession::from_specification(spec).context("prepare parse session")?;
    let source = read_source(&args.file)?;
    let coverage = session.check_spec_fields(&source.headers);
    if !coverage.missing.is_empty() {
        warn!(
            missing = ?coverage.missing,
            "source file lacks fields the specification reads"
        );
    }
    session
        .parse_rows(source.rows)
        .with_context(|| format!("parse {}", args.file.display()))?;

    let table_names: Vec<String> = session.table_names().map(str::to_string).collect();
    for table in &table_names {
        let Some(schema) = session.schema(table).cloned() else {
            continue;
        };
        let discriminator = session
            .specification()
            .table(table)
            .and_then(|declared| declared.declaration.discriminator.clone());
        let validator = SchemaValidator::for_table(&schema, discriminator.as_deref())
            .with_context(|| format!("compile schema for table {table}"))?;
        session
            .validate(table, &validator)
            .with_context(|| format!("validate table {table}"))?;
    }

    let output_dir = if args.validate_only {
        None
    } else {
        let dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Some(dir)
    };

    let mut tables = Vec::with_capacity(table_names.len());
    for table in &table_names {
        let rows = session.read_table(table)?;
        let output = match &output_dir {
            Some(dir) => {
                let path = output_path(dir, &spec_name, table);
                let mut columns = session.fieldnames(table)?;
                if session.report().contains_key(table) {
                    columns.insert(0, adtl_core::ERROR_COLUMN.to_string());
                    columns.insert(0, adtl_core::VALID_COLUMN.to_string());
                }
                write_table(&path, &columns, rows)?;
                Some(path)
            }
            None => None,
        };
        tables.push(TableSummary {
            name: table.clone(),
            kind: session.table_kind(table)?,
            rows: rows.len(),
            validation: session.report().get(table).cloned(),
            output,
        });
    }

    info!(
        tables = tables.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parse finished"
    );
    Ok(ParseResult {
        spec_name,
        output_dir,
        tables,
        diagnostics: session.diagnostics().to_vec(),
    })
}

pub fn run_check(args: &CheckArgs) -> Result<CheckResult> {
    let spec = load_spec(&args.spec, &args.include_def)?;
    let headers = read_headers(&args.file)?;
    Ok(CheckResult {
        spec_name: spec.name().to_string(),
        coverage: spec.check_spec_fields(&headers),
    })
}
