//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and link-table statements from resolved entities.

use crate::config::EntitySchema;
use serde_json::Value;
use std::collections::BTreeMap;

/// Quote identifier for PostgreSQL (safe: only from the catalog).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `alias."column"`.
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quoted(column))
}

/// `$n::type` so text-bound values coerce to the column type.
pub fn placeholder(n: u32, pg_type: &str) -> String {
    format!("${}::{}", n, pg_type)
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    pub fn push_param(&mut self, v: Value) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }
}

/// Column list of generic selects, qualified by `alias`.
pub fn select_column_list(entity: &EntitySchema, alias: &str) -> String {
    entity
        .select_columns()
        .into_iter()
        .map(|c| qualified(alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn returning_list(entity: &EntitySchema) -> String {
    entity
        .select_columns()
        .into_iter()
        .map(quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn pk_placeholder(q: &mut QueryBuf, id: &Value) -> String {
    let n = q.push_param(id.clone());
    placeholder(n, "bigint")
}

/// SELECT by primary key.
pub fn select_by_id(entity: &EntitySchema, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = pk_placeholder(&mut q, id);
    q.sql = format!(
        "SELECT {} FROM {} main WHERE {} = {}",
        select_column_list(entity, "main"),
        quoted(&entity.table),
        qualified("main", &entity.pk),
        ph
    );
    q
}

/// `SELECT 1` by primary key, for existence checks.
pub fn exists_by_id(entity: &EntitySchema, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = pk_placeholder(&mut q, id);
    q.sql = format!(
        "SELECT 1 AS found FROM {} WHERE {} = {}",
        quoted(&entity.table),
        quoted(&entity.pk),
        ph
    );
    q
}

/// SELECT rows where column IN (values) ORDER BY pk. Used for batch-fetching related rows.
pub fn select_by_column_in(entity: &EntitySchema, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table);
    let cols = select_column_list(entity, "main");
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} main WHERE 1 = 0", cols, table);
        return q;
    }
    let pg_type = entity.column_pg_type(column).unwrap_or("text");
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| {
            let n = q.push_param(v.clone());
            placeholder(n, pg_type)
        })
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} main WHERE {} IN ({}) ORDER BY {}",
        cols,
        table,
        qualified("main", column),
        placeholders.join(", "),
        qualified("main", &entity.pk)
    );
    q
}

/// INSERT the given columns; omitted columns take their DB default.
pub fn insert(entity: &EntitySchema, columns: &BTreeMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table);
    let returning = returning_list(entity);
    if columns.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning);
        return q;
    }
    let mut cols = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    for (name, val) in columns {
        let pg_type = entity.column_pg_type(name).unwrap_or("text");
        let n = q.push_param(val.clone());
        cols.push(quoted(name));
        placeholders.push(placeholder(n, pg_type));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        returning
    );
    q
}

/// UPDATE by id: SET only the given columns. With nothing to set, selects the row instead.
pub fn update(entity: &EntitySchema, id: &Value, columns: &BTreeMap<String, Value>) -> QueryBuf {
    if columns.is_empty() {
        return select_by_id(entity, id);
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(columns.len());
    for (name, val) in columns {
        if *name == entity.pk {
            continue;
        }
        let pg_type = entity.column_pg_type(name).unwrap_or("text");
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(name), placeholder(n, pg_type)));
    }
    let ph = pk_placeholder(&mut q, id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quoted(&entity.table),
        sets.join(", "),
        quoted(&entity.pk),
        ph,
        returning_list(entity)
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &EntitySchema, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = pk_placeholder(&mut q, id);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&entity.table),
        quoted(&entity.pk),
        ph,
        returning_list(entity)
    );
    q
}

/// Link-table pairs `(local, remote)` for the given local ids.
pub fn select_links(link_table: &str, local_column: &str, remote_column: &str, local_ids: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if local_ids.is_empty() {
        q.sql = format!(
            "SELECT {l} AS local_id, {r} AS remote_id FROM {t} WHERE 1 = 0",
            l = quoted(local_column),
            r = quoted(remote_column),
            t = quoted(link_table)
        );
        return q;
    }
    let placeholders: Vec<String> = local_ids
        .iter()
        .map(|v| {
            let n = q.push_param(v.clone());
            placeholder(n, "bigint")
        })
        .collect();
    q.sql = format!(
        "SELECT {l} AS local_id, {r} AS remote_id FROM {t} WHERE {l} IN ({ph}) ORDER BY {r}",
        l = quoted(local_column),
        r = quoted(remote_column),
        t = quoted(link_table),
        ph = placeholders.join(", ")
    );
    q
}

pub fn link_exists(link_table: &str, local_column: &str, remote_column: &str, local: &Value, remote: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = pk_placeholder(&mut q, local);
    let b = pk_placeholder(&mut q, remote);
    q.sql = format!(
        "SELECT 1 AS found FROM {} WHERE {} = {} AND {} = {}",
        quoted(link_table),
        quoted(local_column),
        a,
        quoted(remote_column),
        b
    );
    q
}

pub fn insert_link(link_table: &str, local_column: &str, remote_column: &str, local: &Value, remote: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = pk_placeholder(&mut q, local);
    let b = pk_placeholder(&mut q, remote);
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
        quoted(link_table),
        quoted(local_column),
        quoted(remote_column),
        a,
        b
    );
    q
}

pub fn delete_link(link_table: &str, local_column: &str, remote_column: &str, local: &Value, remote: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = pk_placeholder(&mut q, local);
    let b = pk_placeholder(&mut q, remote);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {}",
        quoted(link_table),
        quoted(local_column),
        a,
        quoted(remote_column),
        b
    );
    q
}

/// Removes every link of one local id.
pub fn clear_links(link_table: &str, local_column: &str, local: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = pk_placeholder(&mut q, local);
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(link_table), quoted(local_column), a);
    q
}
