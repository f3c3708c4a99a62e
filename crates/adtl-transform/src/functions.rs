//! Built-in data transformations invoked through a field rule's `apply`.
//!
//! A transformation receives the field's raw value followed by the resolved
//! positional parameters. Recoverable failures are reported as
//! [`TransformError::Unmatched`]; the caller decides whether the raw value
//! passes through or the result is nulled.

use std::collections::HashMap;
use std::sync::OnceLock;

use adtl_model::value::{as_float, float_value, is_blank, to_text};
use chrono::{
    Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, TimeZone,
};
use chrono_tz::Tz;
use regex::RegexBuilder;
use serde_json::Value;

use crate::dates::{iso_date, parse_datetime};

const ISO_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The input could not be matched or converted; not necessarily fatal.
    #[error("{0}")]
    Unmatched(String),
    /// The transformation cannot run with the given inputs.
    #[error("{0}")]
    Failed(String),
}

pub type TransformResult = Result<Value, TransformError>;

/// Signature shared by all transformations: field value, then parameters.
pub type TransformFn = fn(&Value, &[Value]) -> TransformResult;

/// Name to transformation lookup.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    functions: HashMap<&'static str, TransformFn>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in transformation.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("isNotNull", is_not_null);
        registry.register("textIfNotNull", text_if_not_null);
        registry.register("wordSubstituteSet", word_substitute_set);
        registry.register("getFloat", get_float);
        registry.register("Percentage", percentage);
        registry.register("yearsElapsed", years_elapsed);
        registry.register("durationDays", duration_days);
        registry.register("startDate", start_date);
        registry.register("endDate", end_date);
        registry.register("makeDate", make_date);
        registry.register("makeDateTime", make_date_time);
        registry.register("makeDateTimeFromSeconds", make_date_time_from_seconds);
        registry.register("splitDate", split_date);
        registry.register("correctOldDate", correct_old_date);
        registry.register("startYear", start_year);
        registry.register("startMonth", start_month);
        registry
    }

    pub fn register(&mut self, name: &'static str, function: TransformFn) {
        self.functions.insert(name, function);
    }

    pub fn get(&self, name: &str) -> Option<TransformFn> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// The shared built-in registry.
pub fn builtin_registry() -> &'static TransformRegistry {
    static REGISTRY: OnceLock<TransformRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TransformRegistry::builtin)
}

fn param(params: &[Value], index: usize) -> &Value {
    params.get(index).unwrap_or(&Value::Null)
}

fn text_param(params: &[Value], index: usize, default: &'static str) -> String {
    match params.get(index) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

fn number_param(params: &[Value], index: usize, name: &str) -> Result<f64, TransformError> {
    as_float(param(params, index))
        .ok_or_else(|| TransformError::Failed(format!("{name} must be a number")))
}

fn parse_strict(text: &str, format: &str) -> Result<NaiveDateTime, TransformError> {
    parse_datetime(text, format).ok_or_else(|| {
        TransformError::Failed(format!("time data {text:?} does not match format {format:?}"))
    })
}

fn days(duration: f64) -> Result<TimeDelta, TransformError> {
    let millis = (duration * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return Err(TransformError::Failed(format!("duration out of range: {duration}")));
    }
    Ok(TimeDelta::milliseconds(millis as i64))
}

fn shift(datetime: NaiveDateTime, delta: TimeDelta) -> Result<NaiveDateTime, TransformError> {
    datetime
        .checked_add_signed(delta)
        .ok_or_else(|| TransformError::Failed("date out of range".to_string()))
}

/// Whether the value is neither null nor an empty string.
fn is_not_null(value: &Value, _params: &[Value]) -> TransformResult {
    Ok(Value::Bool(!is_blank(value)))
}

/// The first parameter when the field has data.
fn text_if_not_null(value: &Value, params: &[Value]) -> TransformResult {
    Ok(if is_blank(value) {
        Value::Null
    } else {
        param(params, 0).clone()
    })
}

/// Substitute words matched by `[pattern, replacement]` pairs, returning the
/// sorted set of replacements.
fn word_substitute_set(value: &Value, params: &[Value]) -> TransformResult {
    let text = to_text(value);
    let mut out: Vec<String> = Vec::new();
    for pair in params {
        let Some([Value::String(pattern), Value::String(replacement)]) =
            pair.as_array().map(Vec::as_slice)
        else {
            return Err(TransformError::Failed(
                "wordSubstituteSet: params item not a tuple or list".to_string(),
            ));
        };
        let regex = RegexBuilder::new(&format!(r"\b{pattern}\b"))
            .case_insensitive(true)
            .build()
            .map_err(|err| TransformError::Failed(err.to_string()))?;
        if regex.is_match(&text) {
            out.push(replacement.clone());
        }
    }
    if out.is_empty() {
        if !is_blank(value) {
            return Err(TransformError::Unmatched(format!(
                "No matches found for: '{text}'"
            )));
        }
        return Ok(Value::Null);
    }
    out.sort();
    out.dedup();
    Ok(Value::Array(out.into_iter().map(Value::String).collect()))
}

/// Extract a float from free text, honouring a decimal mark and a thousands separator.
fn get_float(value: &Value, params: &[Value]) -> TransformResult {
    if !adtl_model::value::is_truthy(value) {
        return Ok(Value::Null);
    }
    if let Value::Number(_) = value {
        return Ok(value.clone());
    }
    let mut text = to_text(value);
    if text.contains('"') || text.contains(' ') {
        text = text.trim_matches('"').replace(' ', "");
    }
    let decimal = param(params, 0).as_str().filter(|s| !s.is_empty());
    let separator = param(params, 1).as_str().filter(|s| !s.is_empty());

    let mut parts = None;
    if let Some(decimal) = decimal {
        let (integer, fraction) = text.split_once(decimal).unwrap_or((text.as_str(), ""));
        let (integer, fraction) = (integer.to_string(), fraction.to_string());
        text = format!("{integer}.{fraction}");
        parts = Some((integer, fraction));
    }
    if let Some(separator) = separator {
        if text.contains(separator) && separator != "." {
            text = text.replace(separator, "");
        } else if let Some((integer, fraction)) = &parts
            && integer.contains(separator)
        {
            text = format!("{}.{fraction}", integer.replace(separator, ""));
        }
    }

    let number = regex::Regex::new(r"[-+]?\d*\.?\d+")
        .map_err(|err| TransformError::Failed(err.to_string()))?;
    let found: Vec<&str> = number.find_iter(&text).map(|m| m.as_str()).collect();
    if let [single] = found.as_slice()
        && let Ok(parsed) = single.parse::<f64>()
    {
        return Ok(float_value(parsed));
    }
    match text.parse::<f64>() {
        Ok(parsed) => Ok(float_value(parsed)),
        Err(_) if text.is_empty() => Ok(Value::Null),
        Err(_) => Ok(Value::String(text)),
    }
}

/// Turn a fraction into a percentage; values above one are taken as percentages already.
fn percentage(value: &Value, _params: &[Value]) -> TransformResult {
    let Some(number) = as_float(value) else {
        return Ok(value.clone());
    };
    Ok(float_value(if number > 1.0 { number } else { number * 100.0 }))
}

/// Fix two-digit years at or after `epoch` into the previous century.
fn correct_old(text: &str, epoch: f64, format: &str) -> Result<NaiveDateTime, TransformError> {
    let parsed = parse_datetime(text, format).ok_or_else(|| {
        TransformError::Unmatched(format!(
            "Could not convert date {text:?} from date format {format:?}"
        ))
    })?;
    if f64::from(parsed.year()) >= epoch && format.contains('y') {
        return parsed.with_year(parsed.year() - 100).ok_or_else(|| {
            TransformError::Unmatched(format!("Could not move {text:?} back a century"))
        });
    }
    Ok(parsed)
}

/// `correctOldDate(date, epoch, format)`: ISO date with two-digit years pivoted at `epoch`.
fn correct_old_date(value: &Value, params: &[Value]) -> TransformResult {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    let epoch = number_param(params, 0, "epoch")?;
    let format = text_param(params, 1, ISO_FORMAT);
    let corrected = correct_old(&to_text(value), epoch, &format)?;
    Ok(Value::String(iso_date(&corrected)))
}

/// `yearsElapsed(birthdate, currentdate, epoch, bd_format, cd_format)`.
fn years_elapsed(value: &Value, params: &[Value]) -> TransformResult {
    let current = param(params, 0);
    if is_blank(value) || is_blank(current) {
        return Ok(Value::Null);
    }
    let epoch = number_param(params, 1, "epoch")?;
    let birth_format = text_param(params, 2, ISO_FORMAT);
    let current_format = text_param(params, 3, ISO_FORMAT);
    let birth = correct_old(&to_text(value), epoch, &birth_format)?;
    let current = parse_strict(&to_text(current), &current_format)?;
    let days = (current - birth).num_days();
    Ok(float_value(days as f64 / 365.25))
}

/// `durationDays(startdate, currentdate)`: whole days between two ISO dates.
fn duration_days(value: &Value, params: &[Value]) -> TransformResult {
    let current = param(params, 0);
    if is_blank(value) || is_blank(current) {
        return Ok(Value::Null);
    }
    let start = parse_strict(&to_text(value), ISO_FORMAT)?;
    let current = parse_strict(&to_text(current), ISO_FORMAT)?;
    Ok(Value::from((current - start).num_days()))
}

/// `startDate(enddate, duration)`: the ISO date `duration` days before `enddate`.
fn start_date(value: &Value, params: &[Value]) -> TransformResult {
    let duration = param(params, 0);
    if is_blank(value) || is_blank(duration) {
        return Ok(Value::Null);
    }
    let end = parse_strict(&to_text(value), ISO_FORMAT)?;
    let duration = number_param(params, 0, "duration")?;
    let start = shift(end, -days(duration)?)?;
    Ok(Value::String(iso_date(&start)))
}

/// `endDate(startdate, duration, format)`: the ISO date `duration` days after `startdate`.
fn end_date(value: &Value, params: &[Value]) -> TransformResult {
    let duration = param(params, 0);
    if is_blank(value) || is_blank(duration) {
        return Ok(Value::Null);
    }
    let format = text_param(params, 1, ISO_FORMAT);
    let start = parse_strict(&to_text(value), &format)?;
    let duration = number_param(params, 0, "duration")?;
    let end = shift(start, days(duration)?)?;
    Ok(Value::String(iso_date(&end)))
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn build_date(year: &Value, month: &Value, day: &Value) -> Result<NaiveDate, TransformError> {
    let unmatched = || {
        TransformError::Unmatched(format!(
            "Could not construct date from: year={}, month={}, day={}",
            to_text(year),
            to_text(month),
            to_text(day)
        ))
    };
    let (Some(y), Some(m), Some(d)) = (integer(year), integer(month), integer(day)) else {
        return Err(unmatched());
    };
    let (Ok(y), Ok(m), Ok(d)) = (i32::try_from(y), u32::try_from(m), u32::try_from(d)) else {
        return Err(unmatched());
    };
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(unmatched)
}

/// `makeDate(year, month, day)`: ISO date from components.
fn make_date(value: &Value, params: &[Value]) -> TransformResult {
    let (month, day) = (param(params, 0), param(params, 1));
    if is_blank(value) || is_blank(month) || is_blank(day) {
        return Ok(Value::Null);
    }
    let date = build_date(value, month, day)?;
    Ok(Value::String(date.format(ISO_FORMAT).to_string()))
}

/// The date in `value` parsed with `format`, placed in the named tz database zone.
fn zoned_date(value: &Value, format: &str, timezone: &str) -> Result<(NaiveDate, Tz), TransformError> {
    let zone = timezone
        .parse::<Tz>()
        .map_err(|_| TransformError::Failed(format!("unknown timezone {timezone:?}")))?;
    let text = to_text(value);
    let date = parse_datetime(&text, format).ok_or_else(|| {
        TransformError::Unmatched(format!(
            "Could not convert date {text:?} from date format {format:?}"
        ))
    })?;
    Ok((date.date(), zone))
}

/// ISO 8601 with the zone's offset, e.g. `2020-06-05T16:00:00+09:00`.
fn zoned_iso(date: NaiveDate, time: NaiveTime, zone: Tz) -> TransformResult {
    let local = date.and_time(time);
    let zoned = zone.from_local_datetime(&local).earliest().ok_or_else(|| {
        TransformError::Unmatched(format!("{local} does not exist in {}", zone.name()))
    })?;
    Ok(Value::String(zoned.to_rfc3339_opts(SecondsFormat::Secs, false)))
}

/// `makeDateTime(date, time_24hr, date_format, timezone)`.
///
/// An empty time yields the ISO date alone.
fn make_date_time(value: &Value, params: &[Value]) -> TransformResult {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    let format = text_param(params, 1, ISO_FORMAT);
    let (date, zone) = zoned_date(value, &format, &text_param(params, 2, "UTC"))?;
    let time = param(params, 0);
    if is_blank(time) {
        return Ok(Value::String(date.format(ISO_FORMAT).to_string()));
    }
    let time = to_text(time);
    let time = NaiveTime::parse_from_str(&time, "%H:%M").map_err(|_| {
        TransformError::Failed(format!("time data {time:?} does not match format \"%H:%M\""))
    })?;
    zoned_iso(date, time, zone)
}

/// `makeDateTimeFromSeconds(date, time_seconds, date_format, timezone)`.
///
/// Seconds count from midnight; only hours and minutes are kept.
fn make_date_time_from_seconds(value: &Value, params: &[Value]) -> TransformResult {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    let format = text_param(params, 1, ISO_FORMAT);
    let (date, zone) = zoned_date(value, &format, &text_param(params, 2, "UTC"))?;
    let seconds = param(params, 0);
    if is_blank(seconds) {
        return Ok(Value::String(date.format(ISO_FORMAT).to_string()));
    }
    let time = integer(seconds)
        .and_then(|seconds| u32::try_from(seconds).ok())
        .and_then(|seconds| NaiveTime::from_hms_opt(seconds / 3600, (seconds % 3600) / 60, 0))
        .ok_or_else(|| {
            TransformError::Failed(format!(
                "time_seconds must be within a day, got {}",
                to_text(seconds)
            ))
        })?;
    zoned_iso(date, time, zone)
}

/// `splitDate(date, option, epoch, format)`: the year, month or day of a date.
fn split_date(value: &Value, params: &[Value]) -> TransformResult {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    let option = to_text(param(params, 0));
    let epoch = number_param(params, 1, "epoch")?;
    let format = text_param(params, 2, ISO_FORMAT);
    let date = correct_old(&to_text(value), epoch, &format)?;
    match option.as_str() {
        "year" => Ok(Value::from(date.year())),
        "month" => Ok(Value::from(date.month())),
        "day" => Ok(Value::from(date.day())),
        other => Err(TransformError::Unmatched(format!(
            "Invalid option {other:?} for splitDate"
        ))),
    }
}

/// Shared by `startYear` and `startMonth`: the date `duration` before `currentdate`.
fn offset_start(value: &Value, params: &[Value]) -> Result<Option<NaiveDateTime>, TransformError> {
    let current = match param(params, 0) {
        Value::Array(candidates) => candidates
            .iter()
            .find(|candidate| adtl_model::value::is_truthy(candidate))
            .cloned()
            .unwrap_or(Value::Null),
        other => other.clone(),
    };
    if is_blank(&current) || is_blank(value) {
        return Ok(None);
    }
    let epoch = number_param(params, 1, "epoch")?;
    let format = text_param(params, 2, ISO_FORMAT);
    let duration_type = text_param(params, 3, "years");
    let duration = as_float(value)
        .ok_or_else(|| TransformError::Failed(format!("duration {value} is not a number")))?;

    let current = match param(params, 4).as_array().map(Vec::as_slice) {
        Some([month, day]) => {
            build_date(&current, month, day)?.and_time(chrono::NaiveTime::MIN)
        }
        _ => correct_old(&to_text(&current), epoch, &format)?,
    };

    let start = match duration_type.as_str() {
        "years" => current
            .with_year(current.year() - duration.floor() as i32)
            .or_else(|| {
                // 29 February in a non-leap target year.
                current
                    .with_day(28)
                    .and_then(|d| d.with_year(current.year() - duration.floor() as i32))
            }),
        "months" => current.checked_sub_months(Months::new(duration.floor().max(0.0) as u32)),
        "days" => current.checked_sub_signed(days(duration)?),
        other => {
            return Err(TransformError::Failed(format!(
                "duration type must be years, months or days, got {other}"
            )));
        }
    };
    start
        .map(Some)
        .ok_or_else(|| TransformError::Failed("date out of range".to_string()))
}

/// `startYear(duration, currentdate, epoch, dateformat, duration_type, provide_month_day)`.
fn start_year(value: &Value, params: &[Value]) -> TransformResult {
    Ok(offset_start(value, params)?.map_or(Value::Null, |start| Value::from(start.year())))
}

/// As `startYear`, returning the month; `years` durations leave the month unknown.
fn start_month(value: &Value, params: &[Value]) -> TransformResult {
    if text_param(params, 3, "years") == "years" {
        return Ok(Value::Null);
    }
    Ok(offset_start(value, params)?.map_or(Value::Null, |start| Value::from(start.month())))
}
