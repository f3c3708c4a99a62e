//! Loading the JSON Schemas named by table declarations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use adtl_model::{Specification, SpecificationError};
use adtl_spec::make_fields_optional;
use serde_json::Value;

/// Source of table schemas.
pub trait SchemaLoader {
    /// Load the schema at `location`; `Ok(None)` when it is deliberately not fetched.
    fn load(&self, location: &str) -> Result<Option<Value>, SpecificationError>;
}

/// Reads schemas from the filesystem, relative to the specification's directory.
///
/// Remote (`http`/`https`) locations are skipped.
#[derive(Debug, Clone, Default)]
pub struct LocalSchemaLoader {
    base_dir: Option<PathBuf>,
}

impl LocalSchemaLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    pub fn for_specification(spec: &Specification) -> Self {
        Self::new(spec.base_dir.clone())
    }
}

impl SchemaLoader for LocalSchemaLoader {
    fn load(&self, location: &str) -> Result<Option<Value>, SpecificationError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            tracing::warn!(schema = location, "remote schemas are not fetched, skipping");
            return Ok(None);
        }
        let path = self
            .base_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(location), |dir| dir.join(location));
        let text = std::fs::read_to_string(&path)
            .map_err(|source| SpecificationError::io(&path, source))?;
        let schema = serde_json::from_str(&text)
            .map_err(|source| SpecificationError::Json { path, source })?;
        Ok(Some(schema))
    }
}

/// Load every declared table schema, relaxed by the table's optional fields.
pub fn load_schemas(
    spec: &Specification,
    loader: &dyn SchemaLoader,
) -> Result<BTreeMap<String, Value>, SpecificationError> {
    let mut schemas = BTreeMap::new();
    for (name, table) in &spec.tables {
        let Some(location) = &table.declaration.schema else {
            continue;
        };
        let Some(schema) = loader.load(location)? else {
            tracing::warn!(table = %name, "could not load schema, will not validate");
            continue;
        };
        tracing::debug!(table = %name, schema = %location, "loaded schema");
        schemas.insert(
            name.clone(),
            make_fields_optional(&schema, &table.declaration.optional_fields),
        );
    }
    Ok(schemas)
}
