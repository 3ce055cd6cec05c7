//! Academia backend server.
//!
//! Reads settings from the environment (a `.env` file is honoured), migrates the database
//! and serves the REST API.

use academia::{
    app, apply_migrations, builtin_catalog, default_views, ensure_database_exists, reset_database, AppState, Settings,
};
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("academia=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let catalog = builtin_catalog()?;

    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await?;

    if settings.reset_database {
        reset_database(&pool, &catalog).await?;
    }
    apply_migrations(&pool, &catalog).await?;

    let bind_addr = settings.bind_addr.clone();
    let body_limit = settings.max_upload_bytes;
    let state = AppState::new(pool, catalog, settings);
    let router = app(state, default_views())?
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("academia backend listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
