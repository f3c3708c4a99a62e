use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use adtl_core::ValidationReport;
use adtl_model::{Diagnostic, DiagnosticLevel};

use crate::types::{CheckResult, ParseResult};

pub fn print_summary(result: &ParseResult) {
    println!("Specification: {}", result.spec_name);
    match &result.output_dir {
        Some(dir) => println!("Output: {}", dir.display()),
        None => println!("Output: none (validate only)"),
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Kind"),
        header_cell("Rows"),
        header_cell("Valid"),
        header_cell("Output"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    let mut total_rows = 0usize;
    for summary in &result.tables {
        total_rows += summary.rows;
        table.add_row(vec![
            Cell::new(&summary.name)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(summary.kind.as_str()),
            Cell::new(summary.rows),
            validity_cell(summary.validation.as_ref()),
            match &summary.output {
                Some(path) => Cell::new(path.display()),
                None => dim_cell("-"),
            },
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_validation_errors(result);
    print_diagnostics(&result.diagnostics);
}

fn print_validation_errors(result: &ParseResult) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    let mut any = false;
    for summary in &result.tables {
        let Some(report) = &summary.validation else {
            continue;
        };
        for (message, count) in report.most_common() {
            any = true;
            table.add_row(vec![
                Cell::new(&summary.name),
                Cell::new(count).fg(Color::Red),
                Cell::new(message),
            ]);
        }
    }
    if any {
        println!();
        println!("Validation errors:");
        println!("{table}");
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Table"),
        header_cell("Attribute"),
        header_cell("Row"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    for diagnostic in diagnostics {
        table.add_row(vec![
            level_cell(diagnostic.level),
            optional_cell(diagnostic.table.as_deref()),
            optional_cell(diagnostic.attribute.as_deref()),
            diagnostic.row.map_or_else(|| dim_cell("-"), Cell::new),
            Cell::new(&diagnostic.message),
        ]);
    }
    println!();
    println!("Diagnostics ({}):", diagnostics.len());
    println!("{table}");
}

pub fn print_coverage(result: &CheckResult) {
    println!("Specification: {}", result.spec_name);
    let coverage = &result.coverage;
    if coverage.missing.is_empty() {
        println!("All fields the specification reads are present.");
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("Field"), header_cell("Status")]);
    apply_table_style(&mut table);
    for field in &coverage.missing {
        table.add_row(vec![
            Cell::new(field),
            Cell::new("missing from source").fg(Color::Red),
        ]);
    }
    for field in &coverage.unused {
        table.add_row(vec![Cell::new(field), dim_cell("not used by specification")]);
    }
    if !coverage.missing.is_empty() || !coverage.unused.is_empty() {
        println!("{table}");
    }
}

fn validity_cell(report: Option<&ValidationReport>) -> Cell {
    let Some(report) = report else {
        return dim_cell("-");
    };
    let text = format!("{:.1}%", report.percentage_valid());
    if report.total_valid == report.total {
        Cell::new(text).fg(Color::Green)
    } else {
        Cell::new(text).fg(Color::Yellow)
    }
}

fn level_cell(level: DiagnosticLevel) -> Cell {
    match level {
        DiagnosticLevel::Error => Cell::new("ERROR").fg(Color::Red),
        DiagnosticLevel::Warning => Cell::new("WARN").fg(Color::Yellow),
        DiagnosticLevel::Info => Cell::new("INFO"),
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn optional_cell(value: Option<&str>) -> Cell {
    value.map_or_else(|| dim_cell("-"), Cell::new)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
