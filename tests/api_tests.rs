//! Integration tests for the connector's HTTP surface
//!
//! These drive the router in-process the same way the service runs it, with
//! a pre-seeded context so no upstream calls are needed: the staff session
//! is unexpired and the policy table is fresh.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use clap::Parser;
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot`

use ils_connector::config::ServiceConfig;
use ils_connector::policy::{LibraryRec, LocationRec, PolicyTable};
use ils_connector::sirsi::session::SirsiSession;
use ils_connector::{build_router, ServiceContext};

fn test_config() -> ServiceConfig {
    ServiceConfig::parse_from([
        "ils-connector",
        "--sirsiurl", "http://sirsi.example.com",
        "--sirsiscript", "http://sirsi.example.com/scripts",
        "--sirsiuser", "staff",
        "--sirsipass", "secret",
        "--sirsiclient", "TEST_CLIENT",
        "--solr", "http://solr.example.com",
        "--smtphost", "smtp.example.com",
        "--smtpsender", "noreply@example.com",
        "--smtpdevmode",
        "--jwtkey", "test-caller-signing-key",
        "--userjwtkey", "test-user-signing-key",
        "--virgo", "https://search.example.com",
        "--pda", "http://pda.example.com",
        "--userinfo", "http://userinfo.example.com",
        "--hsilliad", "https://hsl.example.com",
        "--cremail", "reserves@example.com",
        "--lawemail", "lawreserves@example.com",
    ])
}

/// Context with a live session and a fresh policy table, so the session and
/// refresh preconditions pass without upstream traffic
async fn seeded_context() -> Arc<ServiceContext> {
    let ctx = Arc::new(ServiceContext::new(test_config()).expect("context should build"));

    *ctx.session.write().await = SirsiSession {
        staff_key: "42".into(),
        session_token: "test-session-token".into(),
        refresh_at: Utc::now() + Duration::hours(1),
    };

    let mut table = PolicyTable {
        refresh_at: Utc::now() + Duration::hours(1),
        ..Default::default()
    };
    table.libraries.push(LibraryRec {
        id: 1,
        key: "UVA-LIB".into(),
        description: "UVA Library".into(),
        on_shelf: true,
        circulating: true,
    });
    table.locations.push(LocationRec {
        id: 7,
        key: "STACKS".into(),
        description: "Stacks".into(),
        online: false,
        shadowed: false,
        on_shelf: true,
        circulating: true,
        scannable: true,
    });
    *ctx.policy.write().await = table;

    ctx
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}

#[tokio::test]
async fn test_version_endpoint() {
    let app = build_router(seeded_context().await);
    let response = app.oneshot(get("/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    assert!(body["version"].is_string());
    assert!(body["build"].is_string());
}

#[tokio::test]
async fn test_availability_list_returns_policy_table() {
    let app = build_router(seeded_context().await);
    let response = app.oneshot(get("/availability/list")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    let libraries = body["availability_list"]["libraries"].as_array().unwrap();
    assert_eq!(libraries.len(), 1);
    assert_eq!(libraries[0]["key"], "UVA-LIB");
    assert_eq!(libraries[0]["on_shelf"], true);

    let locations = body["availability_list"]["locations"].as_array().unwrap();
    assert_eq!(locations[0]["key"], "STACKS");
    assert_eq!(locations[0]["scannable"], true);
}

#[tokio::test]
async fn test_patron_routes_require_caller_token() {
    let app = build_router(seeded_context().await);
    let request = Request::builder()
        .method("POST")
        .uri("/requests/renew")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"computing_id":"mst3k","barcodes":[]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_caller_token_rejected() {
    let app = build_router(seeded_context().await);
    let request = Request::builder()
        .method("POST")
        .uri("/requests/renew")
        .header("Authorization", "Bearer not-a-jwt")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"computing_id":"mst3k","barcodes":[]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_caller_token_reaches_handler() {
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[derive(serde::Serialize)]
    struct Claims<'a> {
        #[serde(rename = "userId")]
        user_id: &'a str,
        barcode: &'a str,
        profile: &'a str,
        #[serde(rename = "homeLibrary")]
        home_library: &'a str,
        exp: i64,
    }
    let token = encode(
        &Header::default(),
        &Claims {
            user_id: "mst3k",
            barcode: "X00001",
            profile: "FACULTY",
            home_library: "CLEMONS",
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        },
        &EncodingKey::from_secret("test-caller-signing-key".as_bytes()),
    )
    .unwrap();

    let app = build_router(seeded_context().await);
    // an empty renew list never touches the upstream
    let request = Request::builder()
        .method("POST")
        .uri("/requests/renew")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"computing_id":"mst3k","barcodes":[]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["renewed"], 0);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_course_reserve_search_rejects_bad_type() {
    let app = build_router(seeded_context().await);
    let response = app
        .oneshot(get("/course_reserves/search?type=bogus&query=chem"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fill_hold_requires_station_token() {
    let app = build_router(seeded_context().await);
    let request = Request::builder()
        .method("POST")
        .uri("/requests/fill_hold/X001")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
