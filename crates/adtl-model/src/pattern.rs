use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::{Result, SpecificationError};

/// A regular expression anchored at the start of the subject.
///
/// Compiled once when the specification is loaded. Two patterns are equal
/// when their source text is equal.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern that must match from the first character.
    pub fn anchored(source: &str) -> Result<Self> {
        Self::build(source, false)
    }

    /// Same as [`Pattern::anchored`] but ignoring case.
    pub fn anchored_case_insensitive(source: &str) -> Result<Self> {
        Self::build(source, true)
    }

    fn build(source: &str, case_insensitive: bool) -> Result<Self> {
        let regex = RegexBuilder::new(&format!("^(?:{source})"))
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|err| SpecificationError::InvalidPattern {
                pattern: source.to_string(),
                source: err,
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}
