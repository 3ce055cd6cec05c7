//! Shared application state for all routes.

use crate::config::{Catalog, Settings};
use crate::service::{PasswordHasher, UploadStore};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<Catalog>,
    pub settings: Arc<Settings>,
    pub uploads: UploadStore,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(pool: PgPool, catalog: Catalog, settings: Settings) -> Self {
        AppState {
            pool,
            catalog: Arc::new(catalog),
            uploads: UploadStore::new(settings.upload_dir.clone()),
            hasher: PasswordHasher::from_settings(&settings),
            settings: Arc::new(settings),
        }
    }
}
