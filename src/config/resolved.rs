//! Resolved catalog: config validated and flattened for runtime use.

use crate::config::{Access, FieldDefault, FieldKind, RelationKind, ValidationRule};
use crate::error::ApiError;
use regex::Regex;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub access: Access,
    pub primary_key: bool,
    pub required: bool,
    pub unique: bool,
    pub default: Option<FieldDefault>,
    pub validation: ValidationRule,
    /// `validation.pattern`, compiled once at resolve time.
    pub pattern: Option<Regex>,
}

impl FieldSpec {
    pub fn pg_type(&self) -> &'static str {
        self.kind.pg_type()
    }
}

#[derive(Clone, Debug)]
pub struct RelationSpec {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    pub access: Access,
    pub required: bool,
    pub on_delete: Option<String>,
}

impl RelationSpec {
    /// True for to_many and many_to_many: dumps as a list, loads from a list.
    pub fn is_collection(&self) -> bool {
        !matches!(self.kind, RelationKind::ToOne { .. })
    }

    /// ON DELETE action of the FK column: the configured one, else CASCADE when required.
    pub fn on_delete_action(&self) -> &str {
        self.on_delete
            .as_deref()
            .unwrap_or(if self.required { "CASCADE" } else { "SET NULL" })
    }

    /// FK column owned by this entity, if any.
    pub fn local_column(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::ToOne { column } => Some(column),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EntitySchema {
    pub name: String,
    pub table: String,
    pub path_segment: String,
    pub pk: String,
    pub fields: Vec<FieldSpec>,
    pub relations: Vec<RelationSpec>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Columns read back by generic selects: every dumpable field plus to_one FK columns.
    pub fn select_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.access.dumps())
            .map(|f| f.name.as_str())
            .chain(self.relations.iter().filter_map(RelationSpec::local_column))
            .collect()
    }

    /// PostgreSQL type for a stored column (field or FK).
    pub fn column_pg_type(&self, column: &str) -> Option<&'static str> {
        if let Some(f) = self.field(column) {
            return Some(f.pg_type());
        }
        self.relations
            .iter()
            .any(|r| r.local_column() == Some(column))
            .then_some("bigint")
    }
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entities: Vec<EntitySchema>,
    by_name: HashMap<String, usize>,
    by_path: HashMap<String, usize>,
}

impl Catalog {
    pub(crate) fn from_entities(entities: Vec<EntitySchema>) -> Self {
        let by_name = entities.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
        let by_path = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path_segment.clone(), i))
            .collect();
        Catalog {
            entities,
            by_name,
            by_path,
        }
    }

    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn by_path(&self, path_segment: &str) -> Option<&EntitySchema> {
        self.by_path.get(path_segment).map(|&i| &self.entities[i])
    }

    /// Entity lookup for names that come from code or a validated catalog.
    pub fn entity(&self, name: &str) -> Result<&EntitySchema, ApiError> {
        self.get(name)
            .ok_or_else(|| ApiError::Internal(format!("entity '{}' missing from catalog", name)))
    }

    /// Target schema of a relation.
    pub fn target(&self, relation: &RelationSpec) -> Result<&EntitySchema, ApiError> {
        self.entity(&relation.target)
    }
}
