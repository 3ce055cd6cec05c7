//! Catalog validation: referential integrity and API consistency.

use crate::config::{CatalogConfig, EntityConfig, FieldKind, RelationKind};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn path_segment(entity: &EntityConfig) -> &str {
    entity.path_segment.as_deref().unwrap_or(&entity.table)
}

pub fn validate(config: &CatalogConfig) -> Result<(), ConfigError> {
    let by_name: HashMap<&str, &EntityConfig> = config.entities.iter().map(|e| (e.name.as_str(), e)).collect();
    if by_name.len() != config.entities.len() {
        return Err(ConfigError::Validation("duplicate entity name".into()));
    }

    let mut path_segments = HashSet::new();
    let mut tables = HashSet::new();
    for e in &config.entities {
        if !path_segments.insert(path_segment(e)) {
            return Err(ConfigError::DuplicatePathSegment(path_segment(e).to_string()));
        }
        if !tables.insert(e.table.as_str()) {
            return Err(ConfigError::Validation(format!("table '{}' declared twice", e.table)));
        }
        validate_entity(e)?;
    }

    // link table -> (owner entity, local column, remote entity, remote column)
    let mut links: HashMap<&str, (&str, &str, &str, &str)> = HashMap::new();
    for e in &config.entities {
        for r in &e.relations {
            let target = by_name.get(r.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.target.clone(),
            })?;
            match &r.kind {
                RelationKind::ToOne { .. } => {}
                RelationKind::ToMany { remote_column } => {
                    let back = target.relations.iter().any(|b| {
                        b.target == e.name
                            && matches!(&b.kind, RelationKind::ToOne { column } if column == remote_column)
                    });
                    if !back {
                        return Err(ConfigError::MissingReference {
                            kind: "to_one column",
                            id: format!("{}.{}", target.name, remote_column),
                        });
                    }
                }
                RelationKind::ManyToMany {
                    link_table,
                    local_column,
                    remote_column,
                } => {
                    if local_column == remote_column {
                        return Err(ConfigError::Validation(format!(
                            "link table '{}' uses '{}' for both sides",
                            link_table, local_column
                        )));
                    }
                    let this = (e.name.as_str(), local_column.as_str(), r.target.as_str(), remote_column.as_str());
                    match links.get(link_table.as_str()) {
                        None => {
                            links.insert(link_table.as_str(), this);
                        }
                        Some(&seen) => {
                            let mirrored = (this.2, this.3, this.0, this.1);
                            if seen != this && seen != mirrored {
                                return Err(ConfigError::Validation(format!(
                                    "link table '{}' declared inconsistently by '{}.{}'",
                                    link_table, e.name, r.name
                                )));
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn validate_entity(e: &EntityConfig) -> Result<(), ConfigError> {
    let pks: Vec<_> = e.fields.iter().filter(|f| f.primary_key).collect();
    match pks.as_slice() {
        [pk] if pk.kind == FieldKind::Integer => {}
        [pk] => {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                reason: format!("'{}' must be an integer", pk.name),
            })
        }
        _ => {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                reason: format!("expected exactly one primary key, found {}", pks.len()),
            })
        }
    }

    let mut names = HashSet::new();
    for f in &e.fields {
        if !names.insert(f.name.as_str()) {
            return Err(ConfigError::Validation(format!("{}: duplicate field '{}'", e.name, f.name)));
        }
    }
    for r in &e.relations {
        if !names.insert(r.name.as_str()) {
            return Err(ConfigError::Validation(format!("{}: duplicate field '{}'", e.name, r.name)));
        }
        if let RelationKind::ToOne { column } = &r.kind {
            if !names.insert(column.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: column '{}' of relation '{}' collides with another field",
                    e.name, column, r.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{builtin_config, parse};

    #[test]
    fn builtin_catalog_is_valid() {
        let config = builtin_config().unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_unknown_relation_target() {
        let config = parse(
            r#"{"entities": [{"name": "note", "table": "notes",
                "fields": [{"name": "id", "type": "integer", "primary_key": true}],
                "relations": [{"name": "author", "target": "user", "kind": "to_one", "column": "author_id"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "entity", .. })
        ));
    }

    #[test]
    fn rejects_to_many_without_back_reference() {
        let config = parse(
            r#"{"entities": [
                {"name": "question", "table": "questions",
                 "fields": [{"name": "id", "type": "integer", "primary_key": true}],
                 "relations": [{"name": "replies", "target": "reply", "kind": "to_many", "remote_column": "question_id"}]},
                {"name": "reply", "table": "replies",
                 "fields": [{"name": "id", "type": "integer", "primary_key": true}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "to_one column", .. })
        ));
    }

    #[test]
    fn rejects_missing_primary_key() {
        let config = parse(
            r#"{"entities": [{"name": "tag", "table": "tags", "fields": [{"name": "label", "type": "text"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPrimaryKey { .. })));
    }

    #[test]
    fn rejects_inconsistent_link_tables() {
        let config = parse(
            r#"{"entities": [
                {"name": "user", "table": "users",
                 "fields": [{"name": "id", "type": "integer", "primary_key": true}],
                 "relations": [{"name": "groups", "target": "group", "kind": "many_to_many",
                                "link_table": "group_members", "local_column": "user_id", "remote_column": "group_id"}]},
                {"name": "group", "table": "groups",
                 "fields": [{"name": "id", "type": "integer", "primary_key": true}],
                 "relations": [{"name": "members", "target": "user", "kind": "many_to_many",
                                "link_table": "group_members", "local_column": "member_id", "remote_column": "user_id"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }
}
