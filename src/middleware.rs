//! Request preconditions
//!
//! Three middlewares run ahead of the handlers that need them: caller-JWT
//! validation (401 on failure), upstream session ensure (403 when login
//! fails), and the policy-table refresh (never fails the request; a broken
//! refresh collapses the TTL and the request proceeds with stale data).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::ServiceContext;

/// Claims carried by a caller (discovery front-end) token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirgoClaims {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub profile: String,
    #[serde(rename = "homeLibrary", default)]
    pub home_library: String,
    #[serde(rename = "canPlaceReserve", default)]
    pub can_place_reserve: bool,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub exp: i64,
}

/// The raw signed token, kept for bearer-forwarded calls (PDA check)
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Validate the caller's bearer token and stash the claims in request
/// extensions. Handlers read them with `Extension<VirgoClaims>`.
pub async fn virgo_jwt_middleware(
    State(ctx): State<Arc<ServiceContext>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let uri = request.uri().clone();
    tracing::info!("authorize user jwt access to {uri}");

    let auth_header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = match bearer_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::info!("user jwt auth failed; missing or malformed bearer token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let key = DecodingKey::from_secret(ctx.config.secrets.virgo_jwt_key.as_bytes());
    let claims = match decode::<VirgoClaims>(&token, &key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::error!("jwt signature is invalid: {e}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(BearerToken(token));
    Ok(next.run(request).await)
}

/// Extract the token from an Authorization header. The front-end sometimes
/// sends the literal string "undefined"; treat it as absent.
pub fn bearer_token(authorization: &str) -> Option<String> {
    let mut parts = authorization.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() && token != "undefined" => {
            Some(token.to_string())
        }
        _ => None,
    }
}

/// Make sure the upstream staff session is live before the handler runs
pub async fn sirsi_session_middleware(
    State(ctx): State<Arc<ServiceContext>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    tracing::info!("ensure sirsi session exists for {}", request.uri());
    if let Err(e) = ctx.ensure_session().await {
        tracing::error!("{e}");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}

/// Refresh the policy table when stale; never blocks the request
pub async fn refresh_data_middleware(
    State(ctx): State<Arc<ServiceContext>>,
    request: Request,
    next: Next,
) -> Response {
    ctx.refresh_policy_if_stale().await;
    next.run(request).await
}
