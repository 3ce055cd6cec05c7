//! Generic CRUD execution against PostgreSQL.

use crate::config::{Catalog, EntitySchema, FieldKind, RelationKind};
use crate::error::ApiError;
use crate::schema::{Loaded, Row, RowSource};
use crate::sql::{self, bind_params, QueryBuf, Select};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool};
use std::collections::BTreeSet;

pub struct CrudService;

impl CrudService {
    pub async fn fetch_all<'c, E>(executor: E, q: &QueryBuf) -> Result<Vec<Row>, ApiError>
    where
        E: PgExecutor<'c>,
    {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_params(sqlx::query(&q.sql), &q.params).fetch_all(executor).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn fetch_optional<'c, E>(executor: E, q: &QueryBuf) -> Result<Option<Row>, ApiError>
    where
        E: PgExecutor<'c>,
    {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_params(sqlx::query(&q.sql), &q.params)
            .fetch_optional(executor)
            .await?;
        Ok(row.as_ref().map(row_to_json))
    }

    pub async fn execute<'c, E>(executor: E, q: &QueryBuf) -> Result<u64, ApiError>
    where
        E: PgExecutor<'c>,
    {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let done = bind_params(sqlx::query(&q.sql), &q.params).execute(executor).await?;
        Ok(done.rows_affected())
    }

    /// Runs a pipeline-built collection query.
    pub async fn list(pool: &PgPool, select: Select<'_>) -> Result<Vec<Row>, ApiError> {
        Self::fetch_all(pool, &select.build()).await
    }

    pub async fn read<'c, E>(executor: E, entity: &EntitySchema, id: i64) -> Result<Option<Row>, ApiError>
    where
        E: PgExecutor<'c>,
    {
        Self::fetch_optional(executor, &sql::select_by_id(entity, &Value::from(id))).await
    }

    pub async fn exists<'c, E>(executor: E, entity: &EntitySchema, id: &Value) -> Result<bool, ApiError>
    where
        E: PgExecutor<'c>,
    {
        Ok(Self::fetch_optional(executor, &sql::exists_by_id(entity, id)).await?.is_some())
    }

    /// Fetch rows from entity where column IN (values). Used for batch-loading related rows.
    pub async fn fetch_where_column_in<'c, E>(
        executor: E,
        entity: &EntitySchema,
        column: &str,
        values: &[Value],
    ) -> Result<Vec<Row>, ApiError>
    where
        E: PgExecutor<'c>,
    {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Self::fetch_all(executor, &sql::select_by_column_in(entity, column, values)).await
    }

    /// Inserts `loaded.columns`, then writes collection relations. Returns the created row.
    pub async fn create(conn: &mut PgConnection, entity: &EntitySchema, loaded: &Loaded) -> Result<Row, ApiError> {
        let row = Self::fetch_optional(&mut *conn, &sql::insert(entity, &loaded.columns))
            .await?
            .ok_or(ApiError::Db(sqlx::Error::RowNotFound))?;
        let id = row.get(&entity.pk).cloned().unwrap_or(Value::Null);
        Self::write_links(conn, entity, &id, loaded).await?;
        Ok(row)
    }

    /// Updates the supplied columns and replaces supplied collection relations.
    pub async fn update(
        conn: &mut PgConnection,
        entity: &EntitySchema,
        id: i64,
        loaded: &Loaded,
    ) -> Result<Option<Row>, ApiError> {
        let id = Value::from(id);
        let row = Self::fetch_optional(&mut *conn, &sql::update(entity, &id, &loaded.columns)).await?;
        if row.is_some() {
            Self::write_links(conn, entity, &id, loaded).await?;
        }
        Ok(row)
    }

    /// Delete one row by id. Returns deleted row or None.
    pub async fn delete(conn: &mut PgConnection, entity: &EntitySchema, id: i64) -> Result<Option<Row>, ApiError> {
        Self::fetch_optional(conn, &sql::delete(entity, &Value::from(id))).await
    }

    /// Stored file names of every row that deleting `entity` row `id` removes through
    /// cascading foreign keys, the row itself excluded.
    pub async fn cascaded_files(
        conn: &mut PgConnection,
        catalog: &Catalog,
        entity: &EntitySchema,
        id: i64,
    ) -> Result<Vec<String>, ApiError> {
        let mut files = Vec::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        let mut pending: Vec<(&EntitySchema, Vec<Value>)> = vec![(entity, vec![Value::from(id)])];
        while let Some((parent, ids)) = pending.pop() {
            for child in catalog.entities() {
                for rel in &child.relations {
                    let Some(column) = rel.local_column() else {
                        continue;
                    };
                    if rel.target != parent.name || !rel.on_delete_action().eq_ignore_ascii_case("CASCADE") {
                        continue;
                    }
                    let rows = Self::fetch_where_column_in(&mut *conn, child, column, &ids).await?;
                    let mut next = Vec::new();
                    for row in rows {
                        let Some(pk) = row.get(&child.pk).cloned() else {
                            continue;
                        };
                        if !seen.insert((child.name.clone(), pk.to_string())) {
                            continue;
                        }
                        files.extend(stored_files(child, &row));
                        next.push(pk);
                    }
                    if !next.is_empty() {
                        pending.push((child, next));
                    }
                }
            }
        }
        Ok(files)
    }

    async fn write_links(
        conn: &mut PgConnection,
        entity: &EntitySchema,
        id: &Value,
        loaded: &Loaded,
    ) -> Result<(), ApiError> {
        for (name, ids) in &loaded.links {
            let Some(rel) = entity.relation(name) else {
                continue;
            };
            match &rel.kind {
                RelationKind::ManyToMany {
                    link_table,
                    local_column,
                    remote_column,
                } => {
                    Self::execute(&mut *conn, &sql::clear_links(link_table, local_column, id)).await?;
                    for remote in ids {
                        Self::execute(&mut *conn, &sql::insert_link(link_table, local_column, remote_column, id, remote))
                            .await?;
                    }
                }
                RelationKind::ToOne { .. } | RelationKind::ToMany { .. } => {}
            }
        }
        Ok(())
    }

    pub async fn link_exists<'c, E>(
        executor: E,
        link: (&str, &str, &str),
        local: i64,
        remote: i64,
    ) -> Result<bool, ApiError>
    where
        E: PgExecutor<'c>,
    {
        let (table, l, r) = link;
        let q = sql::link_exists(table, l, r, &Value::from(local), &Value::from(remote));
        Ok(Self::fetch_optional(executor, &q).await?.is_some())
    }

    pub async fn add_link(conn: &mut PgConnection, link: (&str, &str, &str), local: i64, remote: i64) -> Result<(), ApiError> {
        let (table, l, r) = link;
        Self::execute(conn, &sql::insert_link(table, l, r, &Value::from(local), &Value::from(remote))).await?;
        Ok(())
    }

    pub async fn remove_link(conn: &mut PgConnection, link: (&str, &str, &str), local: i64, remote: i64) -> Result<bool, ApiError> {
        let (table, l, r) = link;
        let n = Self::execute(conn, &sql::delete_link(table, l, r, &Value::from(local), &Value::from(remote))).await?;
        Ok(n > 0)
    }

    /// Flips a link; returns whether it exists afterwards.
    pub async fn toggle_link(conn: &mut PgConnection, link: (&str, &str, &str), local: i64, remote: i64) -> Result<bool, ApiError> {
        if Self::remove_link(&mut *conn, link, local, remote).await? {
            return Ok(false);
        }
        Self::add_link(conn, link, local, remote).await?;
        Ok(true)
    }
}

/// Values of the row's file columns, i.e. the names of its stored uploads.
pub fn stored_files(entity: &EntitySchema, row: &Row) -> Vec<String> {
    entity
        .fields
        .iter()
        .filter(|f| f.kind == FieldKind::File)
        .filter_map(|f| row.get(&f.name).and_then(Value::as_str).map(str::to_string))
        .collect()
}

/// `RowSource` over the pool, for the schema adapter.
pub struct PgRowSource<'a> {
    pub pool: &'a PgPool,
}

#[async_trait]
impl RowSource for PgRowSource<'_> {
    async fn rows_where_in(&self, entity: &EntitySchema, column: &str, values: &[Value]) -> Result<Vec<Row>, ApiError> {
        CrudService::fetch_where_column_in(self.pool, entity, column, values).await
    }

    async fn links(
        &self,
        link_table: &str,
        local_column: &str,
        remote_column: &str,
        local_ids: &[Value],
    ) -> Result<Vec<(Value, Value)>, ApiError> {
        if local_ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = sql::select_links(link_table, local_column, remote_column, local_ids);
        let rows = CrudService::fetch_all(self.pool, &q).await?;
        Ok(rows
            .into_iter()
            .map(|mut r| {
                (
                    r.remove("local_id").unwrap_or(Value::Null),
                    r.remove("remote_id").unwrap_or(Value::Null),
                )
            })
            .collect())
    }

    async fn exists(&self, entity: &EntitySchema, id: &Value) -> Result<bool, ApiError> {
        CrudService::exists(self.pool, entity, id).await
    }
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.ordinal())))
        .collect()
}

fn cell_to_value(row: &PgRow, idx: usize) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(idx) {
        return j;
    }
    Value::Null
}
