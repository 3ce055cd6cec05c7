//! Apply the catalog to the database: tables, then foreign keys, then link tables.
//! Every statement is idempotent so the server can migrate on each start.

use crate::config::{Catalog, EntitySchema, FieldDefault, RelationKind};
use crate::error::ApiError;
use crate::sql::quoted;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;

fn literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// CREATE TABLE for one entity: scalar columns plus the FK columns of its to_one relations.
pub fn table_ddl(entity: &EntitySchema) -> String {
    let mut col_defs: Vec<String> = Vec::new();
    for f in &entity.fields {
        if f.primary_key {
            col_defs.push(format!("{} BIGSERIAL PRIMARY KEY", quoted(&f.name)));
            continue;
        }
        let mut def = format!("{} {}", quoted(&f.name), f.pg_type());
        if f.required {
            def.push_str(" NOT NULL");
        }
        if f.unique {
            def.push_str(" UNIQUE");
        }
        match &f.default {
            Some(FieldDefault::Now) => def.push_str(" DEFAULT now()"),
            Some(FieldDefault::Value(v)) => {
                def.push_str(" DEFAULT ");
                def.push_str(&literal(v));
            }
            None => {}
        }
        col_defs.push(def);
    }
    for r in &entity.relations {
        if let RelationKind::ToOne { column } = &r.kind {
            let mut def = format!("{} bigint", quoted(column));
            if r.required {
                def.push_str(" NOT NULL");
            }
            col_defs.push(def);
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&entity.table),
        col_defs.join(",\n  ")
    )
}

/// ALTER TABLE ... ADD CONSTRAINT for every to_one relation. Re-running fails on the
/// existing constraint; callers ignore that error.
pub fn foreign_key_ddl(catalog: &Catalog) -> Vec<String> {
    let mut out = Vec::new();
    for entity in catalog.entities() {
        for r in &entity.relations {
            let RelationKind::ToOne { column } = &r.kind else {
                continue;
            };
            let Some(target) = catalog.get(&r.target) else {
                continue;
            };
            let on_delete = r.on_delete_action();
            out.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                quoted(&entity.table),
                quoted(&format!("fk_{}_{}", entity.table, column)),
                quoted(column),
                quoted(&target.table),
                quoted(&target.pk),
                on_delete
            ));
        }
    }
    out
}

/// One CREATE TABLE per distinct link table. Both sides of a many_to_many pair name the
/// same table, so it is keyed by name and emitted once.
pub fn link_table_ddl(catalog: &Catalog) -> Vec<String> {
    let mut tables: BTreeMap<&str, String> = BTreeMap::new();
    for entity in catalog.entities() {
        for r in &entity.relations {
            let RelationKind::ManyToMany {
                link_table,
                local_column,
                remote_column,
            } = &r.kind
            else {
                continue;
            };
            if tables.contains_key(link_table.as_str()) {
                continue;
            }
            let Some(target) = catalog.get(&r.target) else {
                continue;
            };
            let (local, remote) = (quoted(local_column), quoted(remote_column));
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {t} (\n  {local} bigint NOT NULL REFERENCES {lt} ({lpk}) ON DELETE CASCADE,\n  \
                 {remote} bigint NOT NULL REFERENCES {rt} ({rpk}) ON DELETE CASCADE,\n  PRIMARY KEY ({local}, {remote})\n)",
                t = quoted(link_table),
                lt = quoted(&entity.table),
                lpk = quoted(&entity.pk),
                rt = quoted(&target.table),
                rpk = quoted(&target.pk),
            );
            tables.insert(link_table.as_str(), sql);
        }
    }
    tables.into_values().collect()
}

/// Creates every entity table, adds foreign keys, then link tables and the session table.
pub async fn apply_migrations(pool: &PgPool, catalog: &Catalog) -> Result<(), ApiError> {
    for entity in catalog.entities() {
        sqlx::query(&table_ddl(entity)).execute(pool).await?;
    }
    for sql in foreign_key_ddl(catalog) {
        if let Err(e) = sqlx::query(&sql).execute(pool).await {
            tracing::trace!(error = %e, "foreign key not added");
        }
    }
    for sql in link_table_ddl(catalog) {
        sqlx::query(&sql).execute(pool).await?;
    }
    crate::store::ensure_private_tables(pool, catalog).await?;
    tracing::info!(entities = catalog.entities().len(), "migrations applied");
    Ok(())
}
