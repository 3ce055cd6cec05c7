//! Question, reply and comment threads. Each level lists its children through a
//! filtered `Select`, so the request's json_params still apply.

use crate::dispatch::{HandlerTable, RequestContext, ResourceView};
use crate::error::ApiResult;
use crate::handlers::entity::{self, owner_rule};
use crate::sql::Select;
use async_trait::async_trait;
use serde_json::Value;

/// Rows of `child` whose `column` points at `parent` row `id`.
async fn children(ctx: RequestContext, parent: &str, id: i64, child: &str, column: &str) -> ApiResult {
    let schema = ctx.entity(parent)?;
    entity::fetch(&ctx, schema, id).await?;
    let select = Select::from(ctx.entity(child)?).where_column(column, Value::from(id));
    entity::list_select(&ctx, select).await
}

async fn create_authored(ctx: RequestContext, name: &'static str) -> ApiResult {
    let author = ctx.require_user()?.id;
    entity::create(ctx, name, move |loaded| {
        loaded.columns.insert("author_id".to_string(), Value::from(author));
    })
    .await
}

pub struct QuestionsView;

#[async_trait]
impl ResourceView for QuestionsView {
    fn entity(&self) -> &'static str {
        "question"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new().instance_data("replies", |ctx, id| children(ctx, "question", id, "reply", "question_id"))
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        create_authored(ctx, self.entity()).await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, owner_rule("author_id")).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("author_id")).await
    }
}

pub struct RepliesView;

#[async_trait]
impl ResourceView for RepliesView {
    fn entity(&self) -> &'static str {
        "reply"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new().instance_data("comments", |ctx, id| children(ctx, "reply", id, "comment", "reply_id"))
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        create_authored(ctx, self.entity()).await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, owner_rule("author_id")).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("author_id")).await
    }
}

pub struct CommentsView;

#[async_trait]
impl ResourceView for CommentsView {
    fn entity(&self) -> &'static str {
        "comment"
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        create_authored(ctx, self.entity()).await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, owner_rule("author_id")).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("author_id")).await
    }
}
