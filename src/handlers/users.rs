//! `/users`: open registration, login/logout, self-service update.

use crate::dispatch::{HandlerTable, RequestContext, ResourceView};
use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::handlers::entity;
use crate::response::{success, Success};
use crate::service::auth::{authenticate, create_session, encode_token, revoke_session};
use crate::service::{CrudService, PermRule};
use async_trait::async_trait;
use axum::response::IntoResponse;

pub struct UsersView;

#[async_trait]
impl ResourceView for UsersView {
    fn entity(&self) -> &'static str {
        "user"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
            .resource_action("login", login)
            .resource_action("logout", logout)
            .resource_data("current", current)
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, move |_| Some(PermRule::User(id))).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, move |_| Some(PermRule::User(id))).await
    }
}

/// `{username, password}` to a fresh session token plus the user.
async fn login(ctx: RequestContext) -> ApiResult {
    let mut errors = FieldErrors::new();
    let username = ctx.payload.str_field("username");
    let password = ctx.payload.str_field("password");
    for (name, value) in [("username", username), ("password", password)] {
        if value.is_none() {
            errors.insert(name.to_string(), vec!["missing data for required field".to_string()]);
        }
    }
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::ArgFmt(errors));
    };

    let state = &ctx.state;
    let user_id = authenticate(&state.pool, &state.catalog, &state.hasher, username, password).await?;
    let token = create_session(&state.pool, user_id).await?;
    let schema = state.catalog.entity("user")?;
    let row = CrudService::read(&state.pool, schema, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let data = ctx.dump_one(schema, row).await?;
    Ok(Success::new()
        .data(data)
        .with("token", encode_token(&token))
        .into_response())
}

async fn logout(ctx: RequestContext) -> ApiResult {
    let user = ctx.require_user()?;
    revoke_session(&ctx.state.pool, &user.token).await?;
    Ok(success())
}

async fn current(ctx: RequestContext) -> ApiResult {
    let id = ctx.require_user()?.id;
    entity::retrieve(ctx, "user", id).await
}
