//! Load the entity catalog from JSON and resolve it for runtime use.

use crate::config::resolved::{Catalog, EntitySchema, FieldSpec, RelationSpec};
use crate::config::types::*;
use crate::config::validator::{path_segment, validate};
use crate::error::ConfigError;
use regex::Regex;

const BUILTIN_CATALOG: &str = include_str!("academia.json");

pub fn parse(json: &str) -> Result<CatalogConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// The catalog the server ships with.
pub fn builtin_config() -> Result<CatalogConfig, ConfigError> {
    parse(BUILTIN_CATALOG)
}

pub fn builtin_catalog() -> Result<Catalog, ConfigError> {
    resolve(&builtin_config()?)
}

/// Build the resolved catalog from config (validates first).
pub fn resolve(config: &CatalogConfig) -> Result<Catalog, ConfigError> {
    validate(config)?;

    let mut entities = Vec::with_capacity(config.entities.len());
    for e in &config.entities {
        let mut fields = Vec::with_capacity(e.fields.len());
        for f in &e.fields {
            let pattern = f
                .validation
                .pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|err| ConfigError::Validation(format!("{}.{}: invalid pattern: {}", e.name, f.name, err)))?;
            fields.push(FieldSpec {
                name: f.name.clone(),
                kind: f.kind,
                access: f.access,
                primary_key: f.primary_key,
                required: f.required,
                unique: f.unique,
                default: f.default.clone(),
                validation: f.validation.clone(),
                pattern,
            });
        }
        let pk = fields
            .iter()
            .find(|f| f.primary_key)
            .map(|f| f.name.clone())
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                reason: "no primary key".into(),
            })?;
        let relations = e
            .relations
            .iter()
            .map(|r| RelationSpec {
                name: r.name.clone(),
                target: r.target.clone(),
                kind: r.kind.clone(),
                access: r.access,
                required: r.required,
                on_delete: r.on_delete.clone(),
            })
            .collect();
        entities.push(EntitySchema {
            name: e.name.clone(),
            table: e.table.clone(),
            path_segment: path_segment(e).to_string(),
            pk,
            fields,
            relations,
        });
    }

    tracing::debug!(entities = entities.len(), "catalog resolved");
    Ok(Catalog::from_entities(entities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_resolves() {
        let catalog = builtin_catalog().unwrap();
        let user = catalog.get("user").unwrap();
        assert_eq!(user.table, "users");
        assert_eq!(user.pk, "id");
        assert!(catalog.by_path("papers").is_some());
        // password is load-only: never selected for output
        assert!(!user.select_columns().contains(&"password"));
        let note = catalog.get("note").unwrap();
        assert!(note.select_columns().contains(&"author_id"));
        assert_eq!(note.column_pg_type("paper_id"), Some("bigint"));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let config = parse(
            r#"{"entities": [{"name": "tag", "table": "tags", "fields": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "label", "type": "text", "validation": {"pattern": "(["}}]}]}"#,
        )
        .unwrap();
        assert!(matches!(resolve(&config), Err(ConfigError::Validation(_))));
    }
}
