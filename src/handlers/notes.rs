//! `/notes`

use crate::dispatch::{HandlerTable, RequestContext, ResourceView};
use crate::error::ApiResult;
use crate::handlers::entity::{self, owner_rule, Link};
use async_trait::async_trait;
use serde_json::Value;

const COLLECTORS: Link = ("note_collectors", "note_id", "user_id");

pub struct NotesView;

#[async_trait]
impl ResourceView for NotesView {
    fn entity(&self) -> &'static str {
        "note"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
            .instance_data("toggle_collect_status", toggle_collect_status)
            .instance_action("toggle_collect_status", toggle_collect_status)
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        let author = ctx.require_user()?.id;
        entity::create(ctx, self.entity(), move |loaded| {
            loaded.columns.insert("author_id".to_string(), Value::from(author));
        })
        .await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, owner_rule("author_id")).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("author_id")).await
    }
}

async fn toggle_collect_status(ctx: RequestContext, id: i64) -> ApiResult {
    entity::toggle_collect_status(ctx, "note", COLLECTORS, id).await
}
