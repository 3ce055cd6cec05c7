//! Academia backend: REST API for sharing academic papers, notes and discussions.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{builtin_catalog, Catalog, Settings};
pub use dispatch::{HandlerTable, RequestContext, ResourceView};
pub use error::{ApiError, ApiResult, ConfigError};
pub use handlers::default_views;
pub use migration::apply_migrations;
pub use routes::{app, common_routes};
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_private_tables, reset_database};
