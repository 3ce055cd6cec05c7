use crate::config::Settings;
use axum::http::{header, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Any origin; the API verbs; the auth-token header plus Content-Type. Answers every
/// OPTIONS request before it reaches a route.
pub fn build_cors_layer(settings: &Settings) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([settings.auth_token_header.clone(), header::CONTENT_TYPE])
        .max_age(Duration::from_secs(settings.cors_max_age))
}
