//! ILS connector
//!
//! An HTTP gateway between discovery/patron front-ends and the Sirsi ILS web
//! services, with side trips to the catalog index, the user-directory
//! service, the PDA ordering service, and the mail relay. Shared state is a
//! single [`ServiceContext`]: two upstream HTTP clients, the staff session,
//! and the policy table.

pub mod accounts;
pub mod availability;
pub mod config;
pub mod dibs;
pub mod error;
pub mod fill_hold;
pub mod mail;
pub mod marc;
pub mod metadata;
pub mod middleware;
pub mod policy;
pub mod requests;
pub mod reserves;
pub mod sirsi;
pub mod solr;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::ServiceConfig;
use crate::mail::Mailer;
use crate::policy::PolicyTable;
use crate::sirsi::session::SirsiSession;

/// Timeout for ordinary upstream calls
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for known-slow endpoints (batch user and full item expansions)
const SLOW_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared service state, one per process
pub struct ServiceContext {
    pub version: &'static str,
    pub config: ServiceConfig,
    pub http_client: reqwest::Client,
    pub slow_http_client: reqwest::Client,
    pub session: RwLock<SirsiSession>,
    pub policy: RwLock<PolicyTable>,
    pub mailer: Mailer,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        tracing::info!("create http clients for external service calls");
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_UPSTREAM_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(100)
            .build()?;
        let slow_http_client = reqwest::Client::builder()
            .timeout(SLOW_UPSTREAM_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(100)
            .build()?;

        Ok(Self {
            version: env!("CARGO_PKG_VERSION"),
            mailer: Mailer::new(config.smtp.clone()),
            config,
            http_client,
            slow_http_client,
            session: RwLock::new(SirsiSession::default()),
            policy: RwLock::new(PolicyTable::default()),
        })
    }
}

/// GET / and /version
async fn get_version(State(ctx): State<Arc<ServiceContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "version": ctx.version,
        "build": option_env!("ILS_BUILD_TAG").unwrap_or("unknown"),
    }))
}

/// Browsers ask for this; answer quietly
async fn ignore_favicon() -> StatusCode {
    StatusCode::OK
}

/// GET /healthcheck
async fn health_check(State(ctx): State<Arc<ServiceContext>>) -> Json<serde_json::Value> {
    let mut out = serde_json::Map::new();

    let session = ctx.session.read().await.clone();
    if session.is_active() {
        let uri = format!("/user/staff/key/{}", session.staff_key);
        match ctx.sirsi_get(&ctx.http_client, &uri).await {
            Ok(_) => {
                out.insert("sirsi".into(), json!({"healthy": true}));
            }
            Err(e) => {
                out.insert(
                    "sirsi".into(),
                    json!({"healthy": false, "message": e.to_string()}),
                );
            }
        }
    }

    let user_url = format!("{}/healthcheck", ctx.config.user_info_url);
    match ctx
        .send_request("user-ws", ctx.http_client.get(user_url))
        .await
    {
        Ok(_) => {
            out.insert("userinfo".into(), json!({"healthy": true}));
        }
        Err(e) => {
            out.insert(
                "userinfo".into(),
                json!({"healthy": false, "message": e.to_string()}),
            );
        }
    }

    Json(serde_json::Value::Object(out))
}

/// Build the application router. Preconditions are layered per route group:
/// session-ensure for everything that talks to the ILS, caller-JWT for
/// patron-initiated operations, policy refresh where handlers read the
/// table.
pub fn build_router(ctx: Arc<ServiceContext>) -> Router {
    use axum::middleware::from_fn_with_state;

    use crate::middleware::{
        refresh_data_middleware, sirsi_session_middleware, virgo_jwt_middleware,
    };

    let open = Router::new()
        .route("/", get(get_version))
        .route("/version", get(get_version))
        .route("/favicon.ico", get(ignore_favicon))
        .route("/healthcheck", get(health_check));

    // staff-session only
    let staff = Router::new()
        .route("/course_reserves/validate", post(reserves::validate_course_reserves))
        .route("/course_reserves/search", get(reserves::search_course_reserves))
        .route("/metadata/:cat_key/update_rights", post(metadata::update_metadata_rights))
        .route("/users/check_password", post(accounts::check_password))
        .route("/users/change_password", post(accounts::change_password))
        .route(
            "/users/change_password_with_token",
            post(accounts::change_password_with_token),
        )
        .route("/users/forgot_password", post(accounts::forgot_password))
        .route("/users/register", post(accounts::register_new_user))
        .route("/users/activate/:token", get(accounts::activate_user))
        .route("/users/sirsi_staff_login", post(accounts::staff_login))
        .route("/users/:compute_id", get(users::get_user_info))
        .route("/users/:compute_id/bills", get(users::get_user_bills))
        .route("/users/:compute_id/holds", get(users::get_user_holds))
        .route("/requests/fill_hold/:barcode", post(fill_hold::fill_hold))
        .route_layer(from_fn_with_state(ctx.clone(), sirsi_session_middleware));

    // staff session + policy table
    let staff_with_data = Router::new()
        .route("/availability/list", get(availability::get_availability_list))
        .route("/users/:compute_id/checkouts", get(users::get_user_checkouts))
        .route(
            "/users/:compute_id/checkouts.csv",
            get(users::get_user_checkouts_csv),
        )
        .route_layer(from_fn_with_state(ctx.clone(), refresh_data_middleware))
        .route_layer(from_fn_with_state(ctx.clone(), sirsi_session_middleware));

    // staff session + caller token
    let patron = Router::new()
        .route("/dibs/indibs/:barcode", put(dibs::set_barcode_in_dibs))
        .route("/dibs/nodibs/:barcode", put(dibs::set_barcode_not_in_dibs))
        .route("/dibs/checkin", post(dibs::checkin_dibs))
        .route("/dibs/checkout", post(dibs::checkout_dibs))
        .route("/requests/hold", post(requests::create_hold))
        .route("/requests/hold/:id", delete(requests::delete_hold))
        .route("/requests/scan", post(requests::create_scan))
        .route("/requests/renew", post(requests::renew_checkouts))
        .route_layer(from_fn_with_state(ctx.clone(), virgo_jwt_middleware))
        .route_layer(from_fn_with_state(ctx.clone(), sirsi_session_middleware));

    // staff session + caller token + policy table
    let patron_with_data = Router::new()
        .route("/availability/:cat_key", get(availability::get_availability))
        .route("/course_reserves", post(reserves::create_course_reserves))
        .route_layer(from_fn_with_state(ctx.clone(), refresh_data_middleware))
        .route_layer(from_fn_with_state(ctx.clone(), virgo_jwt_middleware))
        .route_layer(from_fn_with_state(ctx.clone(), sirsi_session_middleware));

    Router::new()
        .merge(open)
        .merge(staff)
        .merge(staff_with_data)
        .merge(patron)
        .merge(patron_with_data)
        .with_state(ctx)
}
