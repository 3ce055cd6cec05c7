//! `/groups`: owned by their creator; members may list each other.

use crate::dispatch::{HandlerTable, RequestContext, ResourceView};
use crate::error::{ApiError, ApiResult};
use crate::handlers::entity::{self, owner_rule, Link};
use crate::response::success;
use crate::service::{CrudService, PermRule};
use crate::sql::Select;
use async_trait::async_trait;
use serde_json::Value;

const MEMBERS: Link = ("group_members", "group_id", "user_id");

pub struct GroupsView;

#[async_trait]
impl ResourceView for GroupsView {
    fn entity(&self) -> &'static str {
        "group"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
            .instance_action("join", join)
            .instance_action("leave", leave)
            .instance_data("members", members)
    }

    /// The creator owns the group and is always one of its members.
    async fn create(&self, ctx: RequestContext) -> ApiResult {
        let owner = Value::from(ctx.require_user()?.id);
        entity::create(ctx, self.entity(), move |loaded| {
            loaded.columns.insert("owner_id".to_string(), owner.clone());
            match loaded.links.iter_mut().find(|(name, _)| name == "members") {
                Some((_, ids)) if !ids.contains(&owner) => ids.push(owner),
                Some(_) => {}
                None => loaded.links.push(("members".to_string(), vec![owner])),
            }
        })
        .await
    }

    /// A replaced member list always keeps the owner.
    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update_with(ctx, self.entity(), id, owner_rule("owner_id"), |group, loaded| {
            let Some(owner) = group.get("owner_id").cloned() else {
                return;
            };
            if let Some((_, ids)) = loaded.links.iter_mut().find(|(name, _)| name == "members") {
                if !ids.contains(&owner) {
                    ids.push(owner);
                }
            }
        })
        .await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, owner_rule("owner_id")).await
    }
}

async fn join(ctx: RequestContext, id: i64) -> ApiResult {
    let user = ctx.require_user()?.id;
    let schema = ctx.entity("group")?;
    entity::fetch(&ctx, schema, id).await?;
    let mut tx = ctx.state.pool.begin().await?;
    CrudService::add_link(&mut tx, MEMBERS, id, user).await?;
    tx.commit().await?;
    Ok(success())
}

async fn leave(ctx: RequestContext, id: i64) -> ApiResult {
    let user = ctx.require_user()?.id;
    let schema = ctx.entity("group")?;
    let group = entity::fetch(&ctx, schema, id).await?;
    if group.get("owner_id").and_then(Value::as_i64) == Some(user) {
        return Err(ApiError::logic("the owner cannot leave the group"));
    }
    let mut tx = ctx.state.pool.begin().await?;
    let removed = CrudService::remove_link(&mut tx, MEMBERS, id, user).await?;
    tx.commit().await?;
    if !removed {
        return Err(ApiError::logic("not a member of the group"));
    }
    Ok(success())
}

/// Members of the group, visible to members only. The request's filter pipeline applies.
async fn members(ctx: RequestContext, id: i64) -> ApiResult {
    let schema = ctx.entity("group")?;
    entity::fetch(&ctx, schema, id).await?;
    ctx.check(&PermRule::GroupMember(id)).await?;
    let users = ctx.entity("user")?;
    let (table, group_column, user_column) = MEMBERS;
    let select = Select::from(users).where_linked(table, user_column, group_column, Value::from(id));
    entity::list_select(&ctx, select).await
}
