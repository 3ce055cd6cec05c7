#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Dispatcher behaviour through the full router. None of these requests reach the
//! database: the pool is lazy and every path exercised here fails or answers earlier.

use academia::{app, builtin_catalog, AppState, HandlerTable, RequestContext, ResourceView, Settings};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

struct EchoView;

#[async_trait]
impl ResourceView for EchoView {
    fn entity(&self) -> &'static str {
        "paper"
    }

    fn handlers(&self) -> HandlerTable {
        HandlerTable::new()
            .resource_data("echo", echo)
            .resource_action("echo", echo)
            .instance_data("echo", |ctx, id| async move {
                Ok::<_, academia::ApiError>(academia::response::success_data(json!({
                    "id": id,
                    "limit": ctx.params.limit,
                })))
            })
    }
}

async fn echo(ctx: RequestContext) -> academia::ApiResult {
    let body = match &ctx.payload {
        academia::extractors::Payload::Json(v) => v.clone(),
        _ => Value::Null,
    };
    Ok(academia::response::success_data(json!({
        "limit": ctx.params.limit,
        "with": ctx.params.with,
        "logged_in": ctx.user.is_some(),
        "body": body,
    })))
}

fn state() -> AppState {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://academia@127.0.0.1:1/unused")
        .unwrap();
    AppState::new(pool, builtin_catalog().unwrap(), Settings::default())
}

fn router() -> Router {
    app(state(), vec![Arc::new(EchoView)]).unwrap()
}

async fn send(request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn ping_identifies_the_backend() {
    let (status, _, body) = send(get("/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "academia_bknd": 1}));
}

#[tokio::test]
async fn options_answers_preflight_on_every_shape() {
    for uri in ["/papers", "/papers/1", "/papers/1/file", "/papers/anything"] {
        let request = Request::builder().method("OPTIONS").uri(uri).body(Body::empty()).unwrap();
        let (status, headers, _) = send(request).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,POST,PATCH,DELETE");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "691200");
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
        assert!(allowed.contains("x-academia-auth-token"));
    }
}

#[tokio::test]
async fn named_handler_receives_decoded_params() {
    let params = general_purpose::STANDARD.encode(json!({"limit": 3, "with": ["uploader"]}).to_string());
    let (status, headers, body) = send(get(&format!("/papers/echo?json_params={}", params))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["limit"], 3);
    assert_eq!(body["data"]["with"], json!(["uploader"]));
    assert_eq!(body["data"]["logged_in"], false);
}

#[tokio::test]
async fn post_routes_to_resource_action_with_json_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/papers/echo")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"x": 1}"#))
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["body"], json!({"x": 1}));
}

#[tokio::test]
async fn instance_handler_gets_the_id() {
    let (status, _, body) = send(get("/papers/17/echo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], 17);
}

#[tokio::test]
async fn unknown_handler_is_not_found_with_cors() {
    let (status, headers, body) = send(get("/papers/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(body, json!({"status": "failed", "type": "not_found"}));

    let (status, _, _) = send(get("/papers/7/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_followed_by_segment_is_not_found() {
    let (status, _, body) = send(get("/papers/echo/extra")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["type"], "not_found");
}

#[tokio::test]
async fn wrong_verb_is_method_not_allowed() {
    for (method, uri) in [("PATCH", "/papers"), ("DELETE", "/papers"), ("PUT", "/papers/1"), ("DELETE", "/papers/echo")] {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
        assert_eq!(body["type"], "method_not_allowed");
    }
}

#[tokio::test]
async fn malformed_json_params_is_rejected() {
    let (status, _, body) = send(get("/papers/echo?json_params=***")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "bad_json_params");

    let not_an_object = general_purpose::STANDARD.encode(r#""limit""#);
    let (status, _, body) = send(get(&format!("/papers/echo?json_params={}", not_an_object))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "bad_json_params");
}

#[tokio::test]
async fn undecodable_token_is_bad_token() {
    let request = Request::builder()
        .method("GET")
        .uri("/papers/echo")
        .header("X-Academia-Auth-Token", "%%% not base64 %%%")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "bad_token");
}

#[tokio::test]
async fn invalid_json_body_is_arg_fmt() {
    let request = Request::builder()
        .method("POST")
        .uri("/papers/echo")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "arg_fmt");
    assert!(body["errors"]["_body"][0].as_str().unwrap().starts_with("invalid JSON"));
}

#[test]
fn views_must_name_known_entities_once() {
    struct Ghost;
    #[async_trait]
    impl ResourceView for Ghost {
        fn entity(&self) -> &'static str {
            "ghost"
        }
    }

    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    assert!(app(state(), vec![Arc::new(Ghost)]).is_err());
    assert!(app(state(), vec![Arc::new(EchoView), Arc::new(EchoView)]).is_err());
    assert!(app(state(), academia::default_views()).is_ok());
}
