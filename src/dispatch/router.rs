//! Registers resource views under `/<resource>[/:ph1[/:ph2]]` and runs each request
//! through the dispatch state machine.

use crate::dispatch::context::RequestContext;
use crate::dispatch::registry::{RegisteredView, ResourceView};
use crate::dispatch::route::{route, Dispatch};
use crate::error::{ApiError, ApiResult, ConfigError};
use crate::extractors::{JsonParams, Payload, Session};
use crate::state::AppState;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Instrument;

/// One route triple per view. Fails when a view names an entity the catalog lacks or two
/// views claim the same resource.
pub fn resource_routes(state: AppState, views: Vec<Arc<dyn ResourceView>>) -> Result<Router, ConfigError> {
    let mut router: Router<AppState> = Router::new();
    let mut seen = HashSet::new();
    for view in views {
        let resource = state
            .catalog
            .get(view.entity())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: view.entity().to_string(),
            })?
            .path_segment
            .clone();
        if !seen.insert(resource.clone()) {
            return Err(ConfigError::DuplicatePathSegment(resource));
        }
        let registered = Arc::new(RegisteredView::new(view, resource.clone()));
        let (v0, v1, v2) = (registered.clone(), registered.clone(), registered);
        router = router
            .route(
                &format!("/{}", resource),
                any(move |State(state): State<AppState>, req: Request| {
                    let view = v0.clone();
                    async move { serve(view, state, None, None, req).await }
                }),
            )
            .route(
                &format!("/{}/:ph1", resource),
                any(move |State(state): State<AppState>, Path(ph1): Path<String>, req: Request| {
                    let view = v1.clone();
                    async move { serve(view, state, Some(ph1), None, req).await }
                }),
            )
            .route(
                &format!("/{}/:ph1/:ph2", resource),
                any(
                    move |State(state): State<AppState>, Path((ph1, ph2)): Path<(String, String)>, req: Request| {
                        let view = v2.clone();
                        async move { serve(view, state, Some(ph1), Some(ph2), req).await }
                    },
                ),
            );
        tracing::debug!(resource = %resource, "resource registered");
    }
    Ok(router.with_state(state))
}

async fn serve(
    view: Arc<RegisteredView>,
    state: AppState,
    ph1: Option<String>,
    ph2: Option<String>,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let span = tracing::info_span!("dispatch", resource = %view.resource, method = %method);
    async move {
        match dispatch(&view, state, ph1, ph2, req).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn dispatch(
    view: &RegisteredView,
    state: AppState,
    ph1: Option<String>,
    ph2: Option<String>,
    req: Request,
) -> ApiResult {
    let target = route(req.method(), ph1.as_deref(), ph2.as_deref())?;

    let (mut parts, body) = req.into_parts();
    let JsonParams(params) = JsonParams::from_request_parts(&mut parts, &state).await?;
    let Session(user) = Session::from_request_parts(&mut parts, &state).await?;
    let payload = Payload::from_request(Request::from_parts(parts, body), &state).await?;
    tracing::debug!(target_handler = ?target, user = ?user.as_ref().map(|u| u.id), "dispatching");
    let ctx = RequestContext::new(state, user, params, payload);

    let views = &view.view;
    let table = &view.handlers;
    match target {
        Dispatch::List => views.list(ctx).await,
        Dispatch::Create => views.create(ctx).await,
        Dispatch::Retrieve(id) => views.retrieve(ctx, id).await,
        Dispatch::Update(id) => views.partial_update(ctx, id).await,
        Dispatch::Destroy(id) => views.destroy(ctx, id).await,
        Dispatch::ResourceData(name) => match table.find_resource_data(&name) {
            Some(h) => h(ctx).await,
            None => Err(ApiError::NotFound),
        },
        Dispatch::ResourceAction(name) => match table.find_resource_action(&name) {
            Some(h) => h(ctx).await,
            None => Err(ApiError::NotFound),
        },
        Dispatch::InstanceData(id, name) => match table.find_instance_data(&name) {
            Some(h) => h(ctx, id).await,
            None => Err(ApiError::NotFound),
        },
        Dispatch::InstanceAction(id, name) => match table.find_instance_action(&name) {
            Some(h) => h(ctx, id).await,
            None => Err(ApiError::NotFound),
        },
    }
}
