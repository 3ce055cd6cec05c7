//! Router assembly.

mod common;
mod cors;

pub use common::common_routes;
pub use cors::build_cors_layer;

use crate::dispatch::{resource_routes, ResourceView};
use crate::error::ConfigError;
use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

/// Common routes plus one resource per view, behind the CORS layer.
pub fn app(state: AppState, views: Vec<Arc<dyn ResourceView>>) -> Result<Router, ConfigError> {
    let cors = build_cors_layer(&state.settings);
    let resources = resource_routes(state.clone(), views)?;
    Ok(common_routes(state).merge(resources).layer(cors))
}
