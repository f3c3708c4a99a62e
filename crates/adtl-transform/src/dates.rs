//! strftime-style date parsing and formatting.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parse `text` with a strftime `format`. Date-only formats yield midnight.
pub fn parse_datetime(text: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Format with a strftime `format`; `None` if the format cannot be rendered.
pub fn format_datetime(datetime: &NaiveDateTime, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", datetime.format(format)).ok()?;
    Some(out)
}

/// Reparse a date from `source` format into `target` format.
pub fn reformat(text: &str, source: &str, target: &str) -> Option<String> {
    let parsed = parse_datetime(text, source)?;
    format_datetime(&parsed, target)
}

pub fn iso_date(datetime: &NaiveDateTime) -> String {
    datetime.date().format("%Y-%m-%d").to_string()
}
