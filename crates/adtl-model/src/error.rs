use std::path::PathBuf;

use serde_json::Value;

/// Load-time failure. Raised before any row is processed.
#[derive(Debug, thiserror::Error)]
pub enum SpecificationError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse TOML document {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("specification format not supported: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("specification header requires key: {key}")]
    MissingHeaderKey { key: String },

    #[error("invalid specification header: {message}")]
    InvalidHeader { message: String },

    #[error("required 'kind' attribute within 'tables' not present for {table}")]
    MissingKind { table: String },

    #[error("invalid declaration for table {table}: {message}")]
    InvalidTable { table: String, message: String },

    #[error("groupBy needs aggregation=lastNotNull to be set for table: {table}")]
    GroupByAggregation { table: String },

    #[error("groupBy table {table} does not name its groupBy field")]
    MissingGroupByField { table: String },

    #[error("groupBy field {field} has no rule in table {table}")]
    UnmappedGroupByField { table: String, field: String },

    #[error("oneToMany table {table} requires a discriminator")]
    MissingDiscriminator { table: String },

    #[error("specification missing required '{table}' element")]
    MissingTableBody { table: String },

    #[error("table body '{table}' is not declared in the header")]
    UndeclaredTable { table: String },

    #[error("table body '{table}' has the wrong shape: expected {expected}")]
    TableShape {
        table: String,
        expected: &'static str,
    },

    #[error(
        "for expression {value} is not a dictionary of variables to list of values or a range"
    )]
    MalformedFor { value: Value },

    #[error("for expressions can only have lists or ranges for variables, got {variable} = {value}")]
    InvalidForVariable { variable: String, value: Value },

    #[error("unknown reference: {name}")]
    UnknownRef { name: String },

    #[error("reference cycle detected: {chain}")]
    RefCycle { chain: String },

    #[error("malformed rule: {message}")]
    MalformedRule { message: String },

    #[error("malformed condition: {message}")]
    MalformedCondition { message: String },

    #[error("unrecognized operand: {op}")]
    UnknownOperator { op: String },

    #[error("unknown {name} in rule")]
    UnknownCombinedType { name: String },

    #[error("excludeWhen rule should be 'none', 'false-like', or a list of values")]
    InvalidExcludeWhen,

    #[error("rule for field {field} mixes unit and date conversion")]
    ConflictingConversion { field: String },

    #[error("invalid regular expression {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot synthesize a default condition for entry {index} of table {table}: {message}")]
    DefaultIf {
        table: String,
        index: usize,
        message: String,
    },

    #[error("in table {table}, attribute {attribute}: {source}")]
    InAttribute {
        table: String,
        attribute: String,
        #[source]
        source: Box<SpecificationError>,
    },
}

impl SpecificationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed_rule(message: impl Into<String>) -> Self {
        Self::MalformedRule {
            message: message.into(),
        }
    }

    pub fn malformed_condition(message: impl Into<String>) -> Self {
        Self::MalformedCondition {
            message: message.into(),
        }
    }

    /// Attach the table/attribute location to an error raised while compiling a rule.
    pub fn in_attribute(self, table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::InAttribute {
            table: table.into(),
            attribute: attribute.into(),
            source: Box::new(self),
        }
    }
}

/// Failure while evaluating a rule or condition against a single row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowEvaluationError {
    #[error("field not found in row: {field}")]
    MissingField { field: String },

    #[error("transformation parameter refers to a missing field: {field}")]
    MissingParameterField { field: String },

    #[error("Error using a data transformation: Function {function} has not been defined.")]
    UnknownFunction { function: String },

    #[error("transformation {function} failed: {message}")]
    TransformFailed { function: String, message: String },

    #[error("could not convert {value} to a floating point: {message}")]
    UnitConversion { value: String, message: String },

    #[error("cannot compare values {left} and {right}")]
    IncomparableValues { left: Value, right: Value },

    #[error("could not return value for rule: {message}")]
    MalformedRule { message: String },
}

pub type Result<T> = std::result::Result<T, SpecificationError>;

pub type EvalResult<T> = std::result::Result<T, RowEvaluationError>;
