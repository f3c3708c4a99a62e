//! Specification preprocessing.
//!
//! Turns a JSON or TOML specification document into a fully resolved,
//! typed [`Specification`]:
//!
//! 1. header validation (required keys, table kinds, groupBy aggregation,
//!    oneToMany discriminators),
//! 2. definitions gathered from the header, `include-def` files and any
//!    extra files supplied by the host,
//! 3. `ref` expansion of every table body,
//! 4. `for` expansion and `common` merge for `oneToMany` bodies,
//! 5. rule and condition parsing into typed trees.
//!
//! Every failure is a [`SpecificationError`] raised before any row is read.

#![deny(unsafe_code)]

pub mod for_expansion;
pub mod loader;
pub mod refs;
pub mod schema;

use std::path::{Path, PathBuf};

use adtl_model::{
    Header, Pattern, Result, Specification, SpecificationError, Table, TableKind,
};
use serde_json::{Map, Value};

pub use for_expansion::{expand_block, expand_for};
pub use loader::{DocumentFormat, load_document, read_definitions};
pub use refs::expand_refs;
pub use schema::{date_fields, expand_schema, make_fields_optional};

/// Key of the header object in a specification document.
pub const HEADER_KEY: &str = "adtl";

const REQUIRED_HEADER_KEYS: [&str; 3] = ["tables", "name", "description"];

/// Loads specifications, optionally with extra definitions files.
#[derive(Debug, Clone, Default)]
pub struct SpecLoader {
    include_defs: Vec<PathBuf>,
}

impl SpecLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definitions file merged after the specification's own definitions.
    #[must_use]
    pub fn with_include_def(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_defs.push(path.into());
        self
    }

    #[must_use]
    pub fn with_include_defs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include_defs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Read and resolve the specification at `path`.
    pub fn load(&self, path: &Path) -> Result<Specification> {
        let _span = tracing::info_span!("load_specification", path = %path.display()).entered();
        let document = load_document(path)?;
        let mut extra = Map::new();
        for include in &self.include_defs {
            extra.extend(read_definitions(include)?);
        }
        resolve(document, path.parent(), extra)
    }
}

/// Load a specification with no extra definitions files.
pub fn load_specification(path: &Path) -> Result<Specification> {
    SpecLoader::new().load(path)
}

/// Resolve an in-memory specification document.
///
/// `base_dir` anchors the header's `include-def` files and relative schema
/// paths. `extra_defs` override same-named definitions from the document.
pub fn resolve(
    document: Value,
    base_dir: Option<&Path>,
    extra_defs: Map<String, Value>,
) -> Result<Specification> {
    let Value::Object(mut document) = document else {
        return Err(SpecificationError::MissingHeaderKey {
            key: HEADER_KEY.to_string(),
        });
    };
    let raw_header = document
        .remove(HEADER_KEY)
        .ok_or_else(|| SpecificationError::MissingHeaderKey {
            key: HEADER_KEY.to_string(),
        })?;
    validate_header(&raw_header)?;
    let header: Header =
        serde_json::from_value(raw_header).map_err(|err| SpecificationError::InvalidHeader {
            message: err.to_string(),
        })?;

    let mut defs = header.defs.clone();
    for include in &header.include_def {
        let path = base_dir.map_or_else(|| PathBuf::from(include), |dir| dir.join(include));
        defs.extend(read_definitions(&path)?);
    }
    defs.extend(extra_defs);

    for name in document.keys() {
        if !name.starts_with('$') && !header.tables.contains_key(name) {
            return Err(SpecificationError::UndeclaredTable {
                table: name.clone(),
            });
        }
    }

    let mut tables = std::collections::BTreeMap::new();
    for (name, declaration) in &header.tables {
        let body = document
            .get(name)
            .ok_or_else(|| SpecificationError::MissingTableBody {
                table: name.clone(),
            })?;
        let mut body = expand_refs(body, &defs)?;
        if declaration.kind == TableKind::OneToMany {
            let common = declaration
                .common
                .as_ref()
                .map(|common| expand_refs(&Value::Object(common.clone()), &defs))
                .transpose()?;
            body = expand_entries(name, &body, common.as_ref())?;
        }
        let table = Table::from_value(name, declaration.clone(), &body)?;
        tracing::debug!(table = %name, kind = declaration.kind.as_str(), "resolved table");
        tables.insert(name.clone(), table);
    }

    let skip_pattern = header
        .skip_field_pattern
        .as_deref()
        .map(Pattern::anchored)
        .transpose()?;

    Ok(Specification {
        header,
        skip_pattern,
        tables,
        base_dir: base_dir.map(Path::to_path_buf),
    })
}

fn expand_entries(table: &str, body: &Value, common: Option<&Value>) -> Result<Value> {
    let Value::Array(blocks) = body else {
        return Err(SpecificationError::TableShape {
            table: table.to_string(),
            expected: "a list of rule blocks",
        });
    };
    let mut entries = expand_for(blocks)?;
    if let Some(Value::Object(common)) = common {
        for entry in &mut entries {
            if let Value::Object(entry) = entry {
                entry.extend(common.clone());
            }
        }
    }
    Ok(Value::Array(entries))
}

/// Check the raw header before deserializing it, so that errors name the
/// offending key or table.
fn validate_header(header: &Value) -> Result<()> {
    for key in REQUIRED_HEADER_KEYS {
        if header.get(key).is_none() {
            return Err(SpecificationError::MissingHeaderKey {
                key: key.to_string(),
            });
        }
    }
    let Some(Value::Object(tables)) = header.get("tables") else {
        return Err(SpecificationError::InvalidHeader {
            message: "'tables' must be a mapping of table name to declaration".to_string(),
        });
    };
    for (table, declaration) in tables {
        let Some(kind) = declaration.get("kind").and_then(Value::as_str) else {
            return Err(SpecificationError::MissingKind {
                table: table.clone(),
            });
        };
        match kind {
            "groupBy" => {
                let aggregation = declaration.get("aggregation").and_then(Value::as_str);
                if !matches!(aggregation, Some("lastNotNull" | "lastNotNullStrict")) {
                    return Err(SpecificationError::GroupByAggregation {
                        table: table.clone(),
                    });
                }
                if declaration.get("groupBy").and_then(Value::as_str).is_none() {
                    return Err(SpecificationError::MissingGroupByField {
                        table: table.clone(),
                    });
                }
            }
            "oneToMany" => {
                if declaration
                    .get("discriminator")
                    .and_then(Value::as_str)
                    .is_none()
                {
                    return Err(SpecificationError::MissingDiscriminator {
                        table: table.clone(),
                    });
                }
            }
            "oneToOne" | "constant" => {}
            other => {
                return Err(SpecificationError::InvalidTable {
                    table: table.clone(),
                    message: format!("unknown kind {other}"),
                });
            }
        }
    }
    Ok(())
}
