#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end API tests against PostgreSQL. Each test migrates into its own schema.
//! Skipped unless `ACADEMIA_TEST_DATABASE_URL` is set.

use academia::sql::FilterQuery;
use academia::{app, apply_migrations, builtin_catalog, default_views, AppState, Settings};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

const TOKEN_HEADER: &str = "X-Academia-Auth-Token";

struct TestApp {
    router: Router,
    upload_dir: std::path::PathBuf,
}

async fn setup() -> Option<TestApp> {
    let url = std::env::var("ACADEMIA_TEST_DATABASE_URL").ok()?;
    let schema = format!("academia_test_{}", uuid::Uuid::new_v4().simple());

    let admin = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
    sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema))
        .execute(&admin)
        .await
        .unwrap();

    let search_path = format!("SET search_path TO \"{}\"", schema);
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .after_connect(move |conn, _meta| {
            let sql = search_path.clone();
            Box::pin(async move {
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .unwrap();

    let catalog = builtin_catalog().unwrap();
    apply_migrations(&pool, &catalog).await.unwrap();

    let upload_dir = std::env::temp_dir().join(&schema);
    let settings = Settings {
        upload_dir: upload_dir.clone(),
        password_hash_rounds: 4,
        ..Settings::default()
    };
    let state = AppState::new(pool, catalog, settings);
    Some(TestApp {
        router: app(state, default_views()).unwrap(),
        upload_dir,
    })
}

impl TestApp {
    async fn call(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.call(request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        self.json(builder.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        self.json(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn register(&self, username: &str) -> i64 {
        let (status, body) = self
            .post(
                "/users",
                None,
                json!({"username": username, "email": format!("{}@example.com", username), "password": "secret-pw"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .post("/users/login", None, json!({"username": username, "password": "secret-pw"}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn upload_paper(&self, token: &str, title: &str) -> Value {
        let boundary = "academia-test-boundary";
        let multipart = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"paper.PDF\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF-1.4 test\r\n--{b}--\r\n",
            b = boundary,
            title = title
        );
        let request = Request::builder()
            .method("POST")
            .uri("/papers")
            .header(TOKEN_HEADER, token)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(multipart))
            .unwrap();
        let (status, body) = self.json(request).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(TOKEN_HEADER, token)
            .body(Body::empty())
            .unwrap();
        self.json(request).await
    }
}

fn params(v: Value) -> String {
    general_purpose::URL_SAFE.encode(v.to_string())
}

fn usernames(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn registration_hides_password_and_login_mints_a_token() {
    let Some(t) = setup().await else { return };
    t.register("alice").await;

    let (status, body) = t
        .post("/users/login", None, json!({"username": "alice", "password": "wrong"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], "incorrect_credential");

    let (status, body) = t
        .post("/users/login", None, json!({"username": "nobody", "password": "secret-pw"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], "incorrect_credential");

    let (status, body) = t
        .post("/users/login", None, json!({"username": "alice", "password": "secret-pw"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"].get("password").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = t.get("/users/current", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["username"], "alice");

    let (status, _) = t.post("/users/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = t.get("/users/current", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], "auth_failed");
}

#[tokio::test]
async fn registration_reports_field_errors() {
    let Some(t) = setup().await else { return };
    let (status, body) = t
        .post("/users", None, json!({"username": "bad name!", "email": "nope", "id": 4}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "arg_fmt");
    let errors = body["errors"].as_object().unwrap();
    for field in ["username", "email", "password", "id"] {
        assert!(errors.contains_key(field), "{field}: {body}");
    }
}

#[tokio::test]
async fn filter_and_order_examples() {
    let Some(t) = setup().await else { return };
    for name in ["alice", "bob", "carol"] {
        t.register(name).await;
    }

    let q = params(json!({"query": ["and", ["eq", "username", "alice"], ["gte", "join_date", "2020-01-01"]]}));
    let (status, body) = t.get(&format!("/users?json_params={}", q), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usernames(&body), vec!["alice"]);

    let q = params(json!({"order": [["join_date", false]], "limit": 2}));
    let (_, body) = t.get(&format!("/users?json_params={}", q), None).await;
    assert_eq!(usernames(&body), vec!["carol", "bob"]);

    let q = params(json!({"order": [["username", true]], "offset": 1, "limit": 5}));
    let (_, body) = t.get(&format!("/users?json_params={}", q), None).await;
    assert_eq!(usernames(&body), vec!["bob", "carol"]);

    let q = params(json!({"query": ["between", "username", "a", "b"]}));
    let (status, body) = t.get(&format!("/users?json_params={}", q), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "unknown_query_oper");
    assert_eq!(body["oper"], "between");
}

#[tokio::test]
async fn sql_filter_agrees_with_in_memory_evaluation() {
    let Some(t) = setup().await else { return };
    for name in ["alice", "bob", "carol", "dave"] {
        t.register(name).await;
    }
    let (_, all) = t.get("/users", None).await;
    let rows: Vec<_> = all["data"].as_array().unwrap().iter().map(|r| r.as_object().unwrap().clone()).collect();

    let queries = [
        json!(["or", ["eq", "username", "alice"], ["contains", "email", "bob"]]),
        json!(["not", ["eq", "username", "carol"]]),
        json!(["and", ["gt", "username", "b"], ["lte", "username", "carol"]]),
        json!(["ne", "username", "dave"]),
        json!(["gt", "id", 2]),
        json!(["gte", "join_date", "2000-01-01"]),
        json!(["lt", "join_date", "2000-01-01T00:00:00+02:00"]),
    ];
    for query in queries {
        let parsed = FilterQuery::parse(&query).unwrap();
        let mut expected: Vec<String> = rows
            .iter()
            .filter(|r| parsed.matches(r))
            .map(|r| r["username"].as_str().unwrap().to_string())
            .collect();
        expected.sort();

        let q = params(json!({"query": query, "order": [["username", true]]}));
        let (status, body) = t.get(&format!("/users?json_params={}", q), None).await;
        assert_eq!(status, StatusCode::OK, "{query}");
        assert_eq!(usernames(&body), expected, "{query}");
    }

    for query in [
        json!(["eq", "id", 1.5]),
        json!(["eq", "id", "abc"]),
        json!(["gte", "join_date", "yesterday"]),
        json!(["lt", "join_date", "infinity"]),
    ] {
        let q = params(json!({"query": query}));
        let (status, body) = t.get(&format!("/users?json_params={}", q), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body["type"], "bad_json_params", "{query}");
    }
}

#[tokio::test]
async fn ids_beyond_the_stored_range_are_not_found() {
    let Some(t) = setup().await else { return };
    let id = t.register("alice").await;
    let token = t.login("alice").await;

    for uri in ["/users/3000000000", "/users/9223372036854775807"] {
        let (status, body) = t.get(uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["type"], "not_found");
    }
    let (status, _) = t
        .post("/groups", Some(&token), json!({"name": "lab", "members": [id, 3000000000i64]}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let q = params(json!({"query": ["lt", "id", 3000000000i64]}));
    let (status, body) = t.get(&format!("/users?json_params={}", q), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usernames(&body), vec!["alice"]);
}

#[tokio::test]
async fn paper_upload_collect_toggle_and_download() {
    let Some(t) = setup().await else { return };
    t.register("alice").await;
    let token = t.login("alice").await;

    let data = t.upload_paper(&token, "Attention").await;
    let paper = data["id"].as_i64().unwrap();
    assert_eq!(data["title"], "Attention");
    assert!(data["file"].as_str().unwrap().ends_with(".pdf"));
    assert!(data["uploader"].is_number());

    let uri = format!("/papers/{}/toggle_collect_status", paper);
    let (status, body) = t.get(&uri, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["collected"], true);
    let (_, body) = t.get(&uri, Some(&token)).await;
    assert_eq!(body["collected"], false);

    let (status, body) = t.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], "login_required");

    let request = Request::builder()
        .method("GET")
        .uri(format!("/papers/{}/file", paper))
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = t.call(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(bytes, b"%PDF-1.4 test");
}

#[tokio::test]
async fn nested_inclusion_expands_relations() {
    let Some(t) = setup().await else { return };
    t.register("alice").await;
    let token = t.login("alice").await;

    let (status, body) = t
        .post("/groups", Some(&token), json!({"name": "reading club"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let group = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 1);

    let q = params(json!({"with": ["members.groups", "owner"]}));
    let (_, body) = t.get(&format!("/groups/{}?json_params={}", group, q), None).await;
    assert_eq!(body["data"]["owner"]["username"], "alice");
    assert_eq!(body["data"]["members"][0]["username"], "alice");
    assert_eq!(body["data"]["members"][0]["groups"][0]["id"], group);
    assert_eq!(body["data"]["members"][0]["groups"][0]["name"], "reading club");
}

#[tokio::test]
async fn ownership_guards_updates_and_membership_guards_listing() {
    let Some(t) = setup().await else { return };
    t.register("alice").await;
    t.register("bob").await;
    let alice = t.login("alice").await;
    let bob = t.login("bob").await;

    let (_, body) = t.post("/groups", Some(&alice), json!({"name": "lab"})).await;
    let group = body["data"]["id"].as_i64().unwrap();

    let patch = |token: &str| {
        Request::builder()
            .method("PATCH")
            .uri(format!("/groups/{}", group))
            .header(TOKEN_HEADER, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"description": "renamed"}).to_string()))
            .unwrap()
    };
    let (status, body) = t.json(patch(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["type"], "perm_denied");
    let (status, body) = t.json(patch(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "renamed");

    let members = format!("/groups/{}/members", group);
    let (status, _) = t.get(&members, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.post(&format!("/groups/{}/join", group), Some(&bob), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = t.get(&members, Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    let mut names = usernames(&body);
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);

    let (status, body) = t.post(&format!("/groups/{}/leave", group), Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "logic");
}

#[tokio::test]
async fn replacing_members_keeps_the_owner() {
    let Some(t) = setup().await else { return };
    let alice_id = t.register("alice").await;
    let bob_id = t.register("bob").await;
    let alice = t.login("alice").await;

    let (_, body) = t.post("/groups", Some(&alice), json!({"name": "lab"})).await;
    let group = body["data"]["id"].as_i64().unwrap();

    for members in [json!([]), json!([bob_id])] {
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/groups/{}", group))
            .header(TOKEN_HEADER, &alice)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"members": members}).to_string()))
            .unwrap();
        let (status, body) = t.json(request).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let ids = body["data"]["members"].as_array().unwrap();
        assert!(ids.contains(&json!(alice_id)), "{body}");
    }

    let (status, body) = t.get(&format!("/groups/{}/members", group), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let mut names = usernames(&body);
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn deleting_a_user_removes_files_of_cascaded_papers() {
    let Some(t) = setup().await else { return };
    let alice_id = t.register("alice").await;
    let token = t.login("alice").await;
    let first = t.upload_paper(&token, "First").await;
    let second = t.upload_paper(&token, "Second").await;
    let stored: Vec<_> = [&first, &second]
        .iter()
        .map(|p| t.upload_dir.join(p["file"].as_str().unwrap()))
        .collect();
    assert!(stored.iter().all(|p| p.exists()));

    let (status, body) = t.delete(&format!("/users/{}", alice_id), &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(stored.iter().all(|p| !p.exists()));

    let (status, _) = t.get(&format!("/papers/{}", first["id"]), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
