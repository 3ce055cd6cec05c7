//! Request payloads into validated column values, link sets and file parts.

use crate::config::{Catalog, EntitySchema, FieldKind, RelationKind, RelationSpec};
use crate::error::{ApiError, FieldErrors};
use crate::extractors::Payload;
use crate::schema::coerce::{coerce, coerce_id};
use crate::schema::source::RowSource;
use crate::service::validation::validate_field;
use crate::service::{PasswordHasher, UploadedFile};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    Create,
    /// Partial update: only supplied fields are checked and written.
    Update,
}

#[derive(Debug, Default)]
pub struct Loaded {
    /// Column name to native value, ready for INSERT/UPDATE.
    pub columns: BTreeMap<String, Value>,
    /// Collection relation name to the full new set of related ids.
    pub links: Vec<(String, Vec<Value>)>,
    /// File field name to the uploaded part; stored by the caller.
    pub files: Vec<(String, UploadedFile)>,
}

fn push_err(errors: &mut FieldErrors, field: &str, msg: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(msg.into());
}

pub struct Loader<'a> {
    catalog: &'a Catalog,
    source: &'a dyn RowSource,
    hasher: &'a PasswordHasher,
}

impl<'a> Loader<'a> {
    pub fn new(catalog: &'a Catalog, source: &'a dyn RowSource, hasher: &'a PasswordHasher) -> Self {
        Loader {
            catalog,
            source,
            hasher,
        }
    }

    /// Validates every supplied key, collecting all field errors before failing with
    /// `arg_fmt`. Referenced rows are checked only once the payload is well-formed.
    pub async fn load(&self, entity: &EntitySchema, payload: Payload, mode: LoadMode) -> Result<Loaded, ApiError> {
        let (fields, files, from_form) = match payload {
            Payload::Empty => (Map::new(), Vec::new(), false),
            Payload::Json(Value::Object(map)) => (map, Vec::new(), false),
            Payload::Json(_) => return Err(ApiError::field("_body", "expected a JSON object")),
            Payload::Form { fields, files } => (fields, files, true),
        };

        let mut errors = FieldErrors::new();
        let mut loaded = Loaded::default();
        let mut references: Vec<(&RelationSpec, Vec<Value>)> = Vec::new();

        for (key, raw) in fields {
            if let Some(field) = entity.field(&key) {
                if !field.access.loads() || field.primary_key {
                    push_err(&mut errors, &key, "read-only field");
                    continue;
                }
                if raw.is_null() {
                    if field.required {
                        push_err(&mut errors, &key, "field may not be null");
                    } else {
                        loaded.columns.insert(key, Value::Null);
                    }
                    continue;
                }
                let value = match coerce(field.kind, &raw, from_form) {
                    Ok(v) => v,
                    Err(msg) => {
                        push_err(&mut errors, &key, msg);
                        continue;
                    }
                };
                let problems = validate_field(field, &value);
                if !problems.is_empty() {
                    errors.entry(key).or_default().extend(problems);
                    continue;
                }
                let value = match (field.kind, &value) {
                    (FieldKind::Password, Value::String(plain)) => Value::String(self.hasher.hash(plain)?),
                    _ => value,
                };
                loaded.columns.insert(key, value);
            } else if let Some(rel) = entity.relation(&key) {
                if !rel.access.loads() {
                    push_err(&mut errors, &key, "read-only field");
                    continue;
                }
                match &rel.kind {
                    RelationKind::ToOne { column } => {
                        if raw.is_null() {
                            if rel.required {
                                push_err(&mut errors, &key, "field may not be null");
                            } else {
                                loaded.columns.insert(column.clone(), Value::Null);
                            }
                            continue;
                        }
                        match coerce_id(&raw, from_form) {
                            Ok(id) => {
                                loaded.columns.insert(column.clone(), id.clone());
                                references.push((rel, vec![id]));
                            }
                            Err(msg) => push_err(&mut errors, &key, msg),
                        }
                    }
                    RelationKind::ToMany { .. } => {
                        push_err(&mut errors, &key, "set through the related entity");
                    }
                    RelationKind::ManyToMany { .. } => {
                        match collect_ids(&raw, from_form) {
                            Ok(ids) => {
                                loaded.links.push((key, ids.clone()));
                                references.push((rel, ids));
                            }
                            Err(msg) => push_err(&mut errors, &key, msg),
                        }
                    }
                }
            } else {
                push_err(&mut errors, &key, "unknown field");
            }
        }

        for (name, file) in files {
            match entity.field(&name) {
                Some(f) if f.kind == FieldKind::File && f.access.loads() => loaded.files.push((name, file)),
                Some(_) => push_err(&mut errors, &name, "not a file field"),
                None => push_err(&mut errors, &name, "unknown field"),
            }
        }

        if mode == LoadMode::Create {
            for f in entity.fields.iter().filter(|f| f.required && f.access.loads() && !f.primary_key) {
                let present = loaded.columns.contains_key(&f.name) || loaded.files.iter().any(|(n, _)| *n == f.name);
                if !present && !errors.contains_key(&f.name) {
                    push_err(&mut errors, &f.name, "missing data for required field");
                }
            }
            for r in entity.relations.iter().filter(|r| r.required && r.access.loads()) {
                if let Some(column) = r.local_column() {
                    if !loaded.columns.contains_key(column) && !errors.contains_key(&r.name) {
                        push_err(&mut errors, &r.name, "missing data for required field");
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::ArgFmt(errors));
        }

        for (rel, ids) in references {
            let target = self.catalog.target(rel)?;
            for id in &ids {
                if !self.source.exists(target, id).await? {
                    tracing::debug!(relation = %rel.name, id = %id, "referenced row missing");
                    return Err(ApiError::NotFound);
                }
            }
        }
        Ok(loaded)
    }
}

/// Collection input: a JSON array of ids, or a comma-separated form value.
fn collect_ids(raw: &Value, from_form: bool) -> Result<Vec<Value>, String> {
    let mut ids: Vec<Value> = match raw {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|i| coerce_id(i, from_form))
            .collect::<Result<_, _>>()?,
        Value::String(s) if from_form => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| coerce_id(&Value::String(p.to_string()), true))
            .collect::<Result<_, _>>()?,
        _ => return Err("must be a list of integer ids".to_string()),
    };
    ids.dedup();
    Ok(ids)
}
