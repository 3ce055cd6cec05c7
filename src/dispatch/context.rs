//! Per-request state handed to every handler.

use crate::config::{Catalog, EntitySchema};
use crate::error::ApiError;
use crate::extractors::Payload;
use crate::schema::{Dumper, IncludeTree, LoadMode, Loaded, Loader, Row};
use crate::service::{check_perm, CurrentUser, PermRule, PgMembership, PgRowSource};
use crate::sql::FilterParams;
use crate::state::AppState;
use serde_json::Value;

pub struct RequestContext {
    pub state: AppState,
    pub user: Option<CurrentUser>,
    pub params: FilterParams,
    pub payload: Payload,
}

impl RequestContext {
    pub fn new(state: AppState, user: Option<CurrentUser>, params: FilterParams, payload: Payload) -> Self {
        RequestContext {
            state,
            user,
            params,
            payload,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    pub fn entity(&self, name: &str) -> Result<&EntitySchema, ApiError> {
        self.state.catalog.entity(name)
    }

    pub fn require_user(&self) -> Result<&CurrentUser, ApiError> {
        self.user.as_ref().ok_or(ApiError::LoginRequired)
    }

    pub async fn check(&self, rule: &PermRule) -> Result<&CurrentUser, ApiError> {
        let members = PgMembership { pool: &self.state.pool };
        check_perm(self.user.as_ref(), rule, &members).await
    }

    pub fn include_tree(&self) -> IncludeTree {
        IncludeTree::from_paths(&self.params.with)
    }

    pub fn row_source(&self) -> PgRowSource<'_> {
        PgRowSource { pool: &self.state.pool }
    }

    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }

    pub async fn load(&self, entity: &EntitySchema, payload: Payload, mode: LoadMode) -> Result<Loaded, ApiError> {
        let source = self.row_source();
        Loader::new(self.catalog(), &source, &self.state.hasher)
            .load(entity, payload, mode)
            .await
    }

    pub async fn dump_one(&self, entity: &EntitySchema, row: Row) -> Result<Value, ApiError> {
        let source = self.row_source();
        let tree = self.include_tree();
        Dumper::new(self.catalog(), &source).dump_one(entity, row, &tree).await
    }

    pub async fn dump_many(&self, entity: &EntitySchema, rows: Vec<Row>) -> Result<Vec<Value>, ApiError> {
        let source = self.row_source();
        let tree = self.include_tree();
        Dumper::new(self.catalog(), &source).dump_many(entity, rows, &tree).await
    }
}
