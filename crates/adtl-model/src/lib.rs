//! Domain model for the adtl specification interpreter.
//!
//! Holds the typed form of a resolved specification (header, table bodies,
//! rules and conditions), the per-attribute evaluation context, the error
//! taxonomy, and the value helpers shared by evaluation and aggregation.

#![deny(unsafe_code)]

pub mod condition;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod header;
pub mod pattern;
pub mod rule;
pub mod spec;
pub mod value;

pub use condition::{CompareOp, Condition, Predicate};
pub use context::EvalContext;
pub use diagnostic::{Diagnostic, DiagnosticLevel};
pub use error::{EvalResult, Result, RowEvaluationError, SpecificationError};
pub use header::{Aggregation, DEFAULT_DATE_FORMAT, Header, TableDeclaration, TableKind};
pub use pattern::Pattern;
pub use rule::{
    Apply, CombinedField, CombinedKind, CombinedRule, ExcludeWhen, FieldRule, FieldType, Rule,
    UnitConversion, ValueMap,
};
pub use spec::{Entry, FieldCoverage, Mapping, Specification, Table, TableBody};
pub use value::Row;
