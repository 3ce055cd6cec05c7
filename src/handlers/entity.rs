//! Generic entity handlers: list, retrieve, create, update, destroy, collection toggles.

use crate::config::EntitySchema;
use crate::dispatch::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::response::{success, success_data, Success};
use crate::schema::{LoadMode, Loaded, Row};
use crate::service::{stored_files, CrudService, PermRule};
use crate::sql::{self, Select};
use axum::response::IntoResponse;
use serde_json::Value;

/// Link table triple `(table, column of the owning entity, column of the other side)`.
pub type Link = (&'static str, &'static str, &'static str);

/// Rule granting access to whoever `column` of the row points at.
pub fn owner_rule(column: &'static str) -> impl FnOnce(&Row) -> Option<PermRule> + Send {
    move |row| {
        Some(
            row.get(column)
                .and_then(Value::as_i64)
                .map(PermRule::User)
                .unwrap_or(PermRule::AnyOf(Vec::new())),
        )
    }
}

pub async fn fetch(ctx: &RequestContext, entity: &EntitySchema, id: i64) -> Result<Row, ApiError> {
    CrudService::read(&ctx.state.pool, entity, id)
        .await?
        .ok_or(ApiError::NotFound)
}

pub async fn list(ctx: RequestContext, entity: &str) -> ApiResult {
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    list_select(&ctx, Select::from(schema)).await
}

/// Runs the request's filter pipeline over `select` and dumps the rows.
pub async fn list_select(ctx: &RequestContext, select: Select<'_>) -> ApiResult {
    let select = sql::apply(select, ctx.catalog(), &ctx.params, &ctx.state.settings.unknown_field)?;
    let entity = select.entity();
    let rows = CrudService::list(&ctx.state.pool, select).await?;
    let data = ctx.dump_many(entity, rows).await?;
    Ok(success_data(Value::Array(data)))
}

pub async fn retrieve(ctx: RequestContext, entity: &str, id: i64) -> ApiResult {
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    let row = fetch(&ctx, schema, id).await?;
    Ok(success_data(ctx.dump_one(schema, row).await?))
}

/// Saves uploaded parts and points their columns at the stored names.
async fn store_files(ctx: &RequestContext, loaded: &mut Loaded) -> Result<Vec<String>, ApiError> {
    let mut stored = Vec::with_capacity(loaded.files.len());
    for (name, file) in std::mem::take(&mut loaded.files) {
        match ctx.state.uploads.save(&file).await {
            Ok(saved) => {
                loaded.columns.insert(name, Value::String(saved.clone()));
                stored.push(saved);
            }
            Err(e) => {
                discard_files(ctx, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

async fn discard_files(ctx: &RequestContext, stored: &[String]) {
    for name in stored {
        ctx.state.uploads.remove(name).await;
    }
}

/// Loads the payload, lets `prepare` stamp server-side columns, inserts in a transaction.
pub async fn create(
    mut ctx: RequestContext,
    entity: &str,
    prepare: impl FnOnce(&mut Loaded) + Send,
) -> ApiResult {
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    let payload = ctx.take_payload();
    let mut loaded = ctx.load(schema, payload, LoadMode::Create).await?;
    prepare(&mut loaded);
    let stored = store_files(&ctx, &mut loaded).await?;

    let mut tx = ctx.state.pool.begin().await?;
    let row = match CrudService::create(&mut tx, schema, &loaded).await {
        Ok(row) => row,
        Err(e) => {
            discard_files(&ctx, &stored).await;
            return Err(e);
        }
    };
    if let Err(e) = tx.commit().await {
        discard_files(&ctx, &stored).await;
        return Err(e.into());
    }
    tracing::info!(entity = %schema.name, id = ?row.get(&schema.pk), "created");
    Ok(success_data(ctx.dump_one(schema, row).await?))
}

/// Partial update after `rule` (derived from the current row) passes.
pub async fn update(
    ctx: RequestContext,
    entity: &str,
    id: i64,
    rule: impl FnOnce(&Row) -> Option<PermRule> + Send,
) -> ApiResult {
    update_with(ctx, entity, id, rule, |_, _| {}).await
}

/// As `update`, with `prepare` adjusting the loaded payload against the current row.
pub async fn update_with(
    mut ctx: RequestContext,
    entity: &str,
    id: i64,
    rule: impl FnOnce(&Row) -> Option<PermRule> + Send,
    prepare: impl FnOnce(&Row, &mut Loaded) + Send,
) -> ApiResult {
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    let existing = fetch(&ctx, schema, id).await?;
    if let Some(rule) = rule(&existing) {
        ctx.check(&rule).await?;
    }
    let payload = ctx.take_payload();
    let mut loaded = ctx.load(schema, payload, LoadMode::Update).await?;
    prepare(&existing, &mut loaded);
    let stored = store_files(&ctx, &mut loaded).await?;

    let mut tx = ctx.state.pool.begin().await?;
    let row = match CrudService::update(&mut tx, schema, id, &loaded).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            discard_files(&ctx, &stored).await;
            return Err(ApiError::NotFound);
        }
        Err(e) => {
            discard_files(&ctx, &stored).await;
            return Err(e);
        }
    };
    tx.commit().await?;

    let current = stored_files(schema, &row);
    let replaced: Vec<String> = stored_files(schema, &existing)
        .into_iter()
        .filter(|old| !current.contains(old))
        .collect();
    discard_files(&ctx, &replaced).await;
    Ok(success_data(ctx.dump_one(schema, row).await?))
}

pub async fn destroy(
    ctx: RequestContext,
    entity: &str,
    id: i64,
    rule: impl FnOnce(&Row) -> Option<PermRule> + Send,
) -> ApiResult {
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    let existing = fetch(&ctx, schema, id).await?;
    if let Some(rule) = rule(&existing) {
        ctx.check(&rule).await?;
    }
    let mut tx = ctx.state.pool.begin().await?;
    let mut files = CrudService::cascaded_files(&mut tx, &catalog, schema, id).await?;
    let deleted = CrudService::delete(&mut tx, schema, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;
    files.extend(stored_files(schema, &deleted));
    discard_files(&ctx, &files).await;
    tracing::info!(entity = %schema.name, id, "deleted");
    Ok(success())
}

/// Adds or removes the current user in a collection link of row `id`.
pub async fn toggle_collect_status(ctx: RequestContext, entity: &str, link: Link, id: i64) -> ApiResult {
    let user = ctx.require_user()?.id;
    let catalog = ctx.state.catalog.clone();
    let schema = catalog.entity(entity)?;
    fetch(&ctx, schema, id).await?;
    let mut tx = ctx.state.pool.begin().await?;
    let collected = CrudService::toggle_link(&mut tx, link, id, user).await?;
    tx.commit().await?;
    tracing::debug!(entity = %schema.name, id, user, collected, "collect status toggled");
    Ok(Success::new().with("collected", collected).into_response())
}
