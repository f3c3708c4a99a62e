//! Table aggregation and parse sessions.
//!
//! A [`ParseSession`] owns a resolved specification and one
//! [`TableAggregator`] per declared table. Input rows are fed through every
//! aggregator in turn; the accumulated tables can then be read, validated
//! by a host-supplied [`RowValidator`] and written out by the host.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod default_if;
pub mod error;
pub mod schema_source;
pub mod session;
pub mod validation;

pub use aggregator::TableAggregator;
pub use default_if::default_condition;
pub use error::{ParseError, Result};
pub use schema_source::{LocalSchemaLoader, SchemaLoader, load_schemas};
pub use session::ParseSession;
pub use validation::{ERROR_COLUMN, RowValidator, VALID_COLUMN, ValidationReport};
