//! Reading specification and definitions documents from disk.

use std::path::Path;

use adtl_model::{Result, SpecificationError};
use serde_json::{Map, Value};

/// Serialization format of a specification document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    pub fn parse(self, text: &str, path: &Path) -> Result<Value> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|source| SpecificationError::Json {
                path: path.to_path_buf(),
                source,
            }),
            Self::Toml => toml::from_str(text).map_err(|source| SpecificationError::Toml {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Load a JSON or TOML document as a JSON tree.
pub fn load_document(path: &Path) -> Result<Value> {
    let format =
        DocumentFormat::from_path(path).ok_or_else(|| SpecificationError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
    let text = std::fs::read_to_string(path).map_err(|e| SpecificationError::io(path, e))?;
    tracing::debug!(path = %path.display(), ?format, "loaded specification document");
    format.parse(&text, path)
}

/// Load a definitions file: a flat mapping of definition name to rule fragment.
pub fn read_definitions(path: &Path) -> Result<Map<String, Value>> {
    match load_document(path)? {
        Value::Object(defs) => Ok(defs),
        other => Err(SpecificationError::InvalidHeader {
            message: format!(
                "definitions file {} must contain a mapping, found {}",
                path.display(),
                kind_name(&other)
            ),
        }),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
