//! Rule and condition evaluation.
//!
//! [`evaluate`] computes one attribute value from a source row; [`holds`]
//! decides an `if` condition. Both are pure functions of the row, the typed
//! rule or condition and the [`adtl_model::EvalContext`].

#![deny(unsafe_code)]

pub mod combine;
pub mod condition;
pub mod dates;
pub mod eval;
pub mod functions;
pub mod hash;
pub mod numeric;
pub mod units;

pub use combine::{evaluate_combined, merge_combined, reduce};
pub use condition::{cast_to, holds};
pub use eval::{evaluate, evaluate_raw};
pub use functions::{TransformError, TransformFn, TransformRegistry, builtin_registry};
pub use hash::{hash_sensitive, sha256_hex};
pub use numeric::coerce_numeric;
pub use units::{UnitError, convert};
