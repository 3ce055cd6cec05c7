//! Resource views and their named data/action handlers.

use crate::dispatch::context::RequestContext;
use crate::error::ApiResult;
use crate::handlers::entity;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub type HandlerFuture = BoxFuture<'static, ApiResult>;
pub type ResourceHandler = Arc<dyn Fn(RequestContext) -> HandlerFuture + Send + Sync>;
pub type InstanceHandler = Arc<dyn Fn(RequestContext, i64) -> HandlerFuture + Send + Sync>;

fn resource_handler<F, Fut>(f: F) -> ResourceHandler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult> + Send + 'static,
{
    Arc::new(move |ctx| -> HandlerFuture { f(ctx).boxed() })
}

fn instance_handler<F, Fut>(f: F) -> InstanceHandler
where
    F: Fn(RequestContext, i64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult> + Send + 'static,
{
    Arc::new(move |ctx, id| -> HandlerFuture { f(ctx, id).boxed() })
}

/// Named handlers of one resource, built once when the view is registered.
#[derive(Clone, Default)]
pub struct HandlerTable {
    resource_data: HashMap<&'static str, ResourceHandler>,
    resource_action: HashMap<&'static str, ResourceHandler>,
    instance_data: HashMap<&'static str, InstanceHandler>,
    instance_action: HashMap<&'static str, InstanceHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable::default()
    }

    /// `GET /<resource>/<name>`
    pub fn resource_data<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult> + Send + 'static,
    {
        self.resource_data.insert(name, resource_handler(f));
        self
    }

    /// `POST /<resource>/<name>`
    pub fn resource_action<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult> + Send + 'static,
    {
        self.resource_action.insert(name, resource_handler(f));
        self
    }

    /// `GET /<resource>/<id>/<name>`
    pub fn instance_data<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(RequestContext, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult> + Send + 'static,
    {
        self.instance_data.insert(name, instance_handler(f));
        self
    }

    /// `POST /<resource>/<id>/<name>`
    pub fn instance_action<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(RequestContext, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult> + Send + 'static,
    {
        self.instance_action.insert(name, instance_handler(f));
        self
    }

    pub fn find_resource_data(&self, name: &str) -> Option<&ResourceHandler> {
        self.resource_data.get(name)
    }

    pub fn find_resource_action(&self, name: &str) -> Option<&ResourceHandler> {
        self.resource_action.get(name)
    }

    pub fn find_instance_data(&self, name: &str) -> Option<&InstanceHandler> {
        self.instance_data.get(name)
    }

    pub fn find_instance_action(&self, name: &str) -> Option<&InstanceHandler> {
        self.instance_action.get(name)
    }
}

/// One REST resource. The CRUD methods default to the generic entity handlers without
/// permission checks; views override them to add ownership rules.
#[async_trait]
pub trait ResourceView: Send + Sync + 'static {
    /// Catalog entity served; its path segment names the resource.
    fn entity(&self) -> &'static str;

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
    }

    async fn list(&self, ctx: RequestContext) -> ApiResult {
        entity::list(ctx, self.entity()).await
    }

    async fn retrieve(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::retrieve(ctx, self.entity(), id).await
    }

    async fn create(&self, ctx: RequestContext) -> ApiResult {
        entity::create(ctx, self.entity(), |_| {}).await
    }

    async fn partial_update(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::update(ctx, self.entity(), id, |_| None).await
    }

    async fn destroy(&self, ctx: RequestContext, id: i64) -> ApiResult {
        entity::destroy(ctx, self.entity(), id, |_| None).await
    }
}

/// A view with its handler table and resolved path segment.
pub struct RegisteredView {
    pub view: Arc<dyn ResourceView>,
    pub handlers: HandlerTable,
    pub resource: String,
}

impl RegisteredView {
    pub fn new(view: Arc<dyn ResourceView>, resource: impl Into<String>) -> Self {
        RegisteredView {
            handlers: view.handlers(),
            view,
            resource: resource.into(),
        }
    }
}
