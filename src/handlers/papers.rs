//! `/papers`: uploaded PDFs with collectors.

use crate::dispatch::{HandlerTable, RequestContext, ResourceView};
use crate::error::{ApiError, ApiResult};
use crate::handlers::entity::{self, owner_rule, Link};
use async_trait::async_trait;
use axum::{
    http::{header, HeaderValue},
    response::IntoResponse,
};
use serde_json::Value;

const COLLECTORS: Link = ("paper_collectors", "paper_id", "user_id");

pub struct PapersView;

#[async_trait]
impl ResourceView for PapersView {
    fn entity(&self) -> &'static str {
        "paper"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
            .instance_data("toggle_collect_status", toggle_collect_status)
            .instance_action("toggle_collect_status", toggle_collect_status)
            .instance_data("file", file)
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        let uploader = ctx.require_user()?.id;
        entity::create(ctx, self.entity(), move |loaded| {
            loaded.columns.insert("uploader_id".to_string(), Value::from(uploader));
        })
        .await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, owner_rule("uploader_id")).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("uploader_id")).await
    }
}

async fn toggle_collect_status(ctx: RequestContext, id: i64) -> ApiResult {
    entity::toggle_collect_status(ctx, "paper", COLLECTORS, id).await
}

/// Raw bytes of the stored upload.
async fn file(ctx: RequestContext, id: i64) -> ApiResult {
    let schema = ctx.entity("paper")?;
    let row = entity::fetch(&ctx, schema, id).await?;
    let stored = row
        .get("file")
        .and_then(Value::as_str)
        .ok_or(ApiError::NotFound)?;
    let bytes = ctx.state.uploads.read(stored).await?;

    let content_type = if stored.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    };
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{}\"", stored))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
