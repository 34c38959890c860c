//! Account lifecycle endpoints
//!
//! Password checks and changes, self-registration with activation, and the
//! staff login passthrough used by hold-filling stations. Patron-scoped
//! operations authenticate as the patron and use that session for the
//! follow-up call; the connector's own staff session is only used where the
//! upstream requires staff privileges.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult, RequestError};
use crate::sirsi::{Role, SirsiKey, SirsiMessageList, SirsiSignInResponse};
use crate::ServiceContext;

// ---------------------------------------------------------------------------
// password check

#[derive(Debug, Deserialize)]
pub struct CheckPasswordRequest {
    // the front end sends the compute id under "barcode"
    #[serde(rename = "barcode")]
    pub compute_id: String,
    pub password: String,
}

/// POST /users/check_password
pub async fn check_password(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<CheckPasswordRequest>,
) -> ApiResult<String> {
    tracing::info!("check password for {}", req.compute_id);
    let payload = json!({
        "alternateID": req.compute_id,
        "password": req.password,
    });
    match ctx
        .sirsi_post(&ctx.http_client, "/user/patron/authenticate", &payload)
        .await
    {
        Ok(_) => Ok("valid".to_string()),
        Err(err) if err.is_unauthorized() => {
            // some accounts keep the compute id in the barcode field
            tracing::info!("alt id password check failed; try barcode");
            let barcode_payload = json!({
                "barcode": req.compute_id,
                "password": req.password,
            });
            match ctx
                .sirsi_post(&ctx.http_client, "/user/patron/authenticate", &barcode_payload)
                .await
            {
                Ok(_) => Ok("valid".to_string()),
                Err(err) if err.is_unauthorized() => {
                    tracing::info!("check pass for barcode {} failed: {err}", req.compute_id);
                    Err(ApiError::Unauthorized("invalid".to_string()))
                }
                Err(err) => {
                    tracing::error!("check pass for barcode {} failed: {err}", req.compute_id);
                    Err(ApiError::Internal("invalid".to_string()))
                }
            }
        }
        Err(err) => {
            tracing::error!("check pass for {} failed: {err}", req.compute_id);
            Err(ApiError::Internal("invalid".to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// password change

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "current_pin")]
    pub current_pin: String,
    #[serde(rename = "new_pin")]
    pub new_pin: String,
    #[serde(rename = "barcode")]
    pub compute_id: String,
}

/// POST /users/change_password
pub async fn change_password(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<String> {
    tracing::info!("change password for {}; first sign in...", req.compute_id);
    let login = json!({
        "login": req.compute_id,
        "password": req.current_pin,
    });
    let raw = match ctx
        .sirsi_post(&ctx.http_client, "/user/patron/login", &login)
        .await
    {
        Ok(raw) => raw,
        Err(err) if err.is_unauthorized() => {
            return Err(ApiError::Unauthorized("incorrect password".to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    let signin: SirsiSignInResponse = serde_json::from_slice(&raw)?;

    tracing::info!("{} signed in; change password...", req.compute_id);
    let change = json!({
        "currentPin": req.current_pin,
        "newPin": req.new_pin,
    });
    let result = ctx
        .sirsi_post_as(
            &ctx.http_client,
            "/user/patron/changeMyPin",
            &change,
            Role::Patron,
            &signin.session_token,
        )
        .await;

    match result {
        Ok(_) => Ok("password changed".to_string()),
        Err(err) => {
            tracing::warn!("{} password change failed: {err}", req.compute_id);
            Err(first_message_error(&err))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenPasswordRequest {
    #[serde(rename = "reset_password_token")]
    pub token: String,
    #[serde(rename = "new_password")]
    pub new_password: String,
}

/// POST /users/change_password_with_token
pub async fn change_password_with_token(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<TokenPasswordRequest>,
) -> ApiResult<String> {
    let payload = json!({
        "resetPinToken": req.token,
        "newPin": req.new_password,
    });
    let result = ctx
        .sirsi_post_as(
            &ctx.http_client,
            "/user/patron/changeMyPin",
            &payload,
            Role::Patron,
            "",
        )
        .await;

    match result {
        Ok(_) => Ok("token password changed".to_string()),
        Err(err) => {
            tracing::warn!("token password change failed: {err}");
            Err(first_message_error(&err))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(rename = "userBarcode")]
    pub user_barcode: String,
}

/// POST /users/forgot_password
pub async fn forgot_password(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<String> {
    tracing::info!("user {} forgot password", req.user_barcode);
    let payload = json!({
        "login": req.user_barcode,
        "resetPinUrl": format!("{}/signin?token=<RESET_PIN_TOKEN>", ctx.config.virgo_url),
    });
    ctx.sirsi_post(&ctx.http_client, "/user/patron/resetMyPin", &payload)
        .await?;
    Ok("ok".to_string())
}

/// Surface the upstream's first message as an unauthorized response, or the
/// raw error when the body is unstructured
fn first_message_error(err: &RequestError) -> ApiError {
    match serde_json::from_str::<SirsiMessageList>(&err.message) {
        Ok(parsed) if !parsed.message_list.is_empty() => {
            ApiError::Unauthorized(parsed.message_list[0].message.clone())
        }
        _ => ApiError::Internal(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// registration and activation

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

/// The upstream's flat registration payload
#[derive(Debug, Serialize)]
pub struct SirsiRegistration {
    #[serde(rename = "patron-firstName")]
    pub first_name: String,
    #[serde(rename = "patron-lastName")]
    pub last_name: String,
    #[serde(rename = "patron-pin")]
    pub password: String,
    #[serde(rename = "patronAddress3-EMAIL")]
    pub email: String,
    #[serde(rename = "patronAddress1-PHONE")]
    pub phone: String,
    #[serde(rename = "patronAddress1-LINE1")]
    pub address_line1: String,
    #[serde(rename = "patronAddress1-LINE2")]
    pub address_line2: String,
    // city, state
    #[serde(rename = "patronAddress1-LINE3")]
    pub address_line3: String,
    #[serde(rename = "patronAddress1-ZIP")]
    pub zip: String,
    #[serde(rename = "patron-preferredAddress")]
    pub preferred_address: String,
    #[serde(rename = "activationUrl")]
    pub activation_url: String,
}

impl SirsiRegistration {
    pub fn from_request(req: &RegisterRequest, virgo_url: &str) -> Self {
        Self {
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            password: req.password.clone(),
            email: req.email.clone(),
            phone: req.phone.clone(),
            address_line1: req.address1.clone(),
            address_line2: req.address2.clone(),
            address_line3: format!("{}, {}", req.city, req.state),
            zip: req.zip.clone(),
            preferred_address: "3".to_string(),
            activation_url: format!("{virgo_url}/api/activateTempAccount/"),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        if self.first_name.is_empty() {
            errors.push("first name is required");
        }
        if self.last_name.is_empty() {
            errors.push("last name is required");
        }
        if self.password.is_empty() {
            errors.push("password is required");
        }
        if self.email.is_empty() {
            errors.push("email is required");
        }
        if self.phone.is_empty() {
            errors.push("phone is required");
        }
        if self.address_line1.is_empty() {
            errors.push("address1 is required");
        }
        if self.address_line3 == ", " {
            errors.push("city/state is required");
        }
        if self.zip.is_empty() {
            errors.push("zip is required");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join(","))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SirsiRegistrationResponse {
    #[serde(default)]
    patron: SirsiKey,
    #[serde(default)]
    barcode: String,
}

/// POST /users/register
pub async fn register_new_user(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<String> {
    tracing::info!("register new user {} {}", req.first_name, req.last_name);
    let payload = SirsiRegistration::from_request(&req, &ctx.config.virgo_url);
    payload.validate().map_err(ApiError::BadRequest)?;

    let raw = match ctx
        .sirsi_post(&ctx.http_client, "/user/patron/register", &payload)
        .await
    {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("registration failed: {err}");
            return Err(
                match serde_json::from_str::<SirsiMessageList>(&err.message) {
                    Ok(parsed) if !parsed.message_list.is_empty() => {
                        ApiError::BadRequest(parsed.message_list[0].message.clone())
                    }
                    _ => ApiError::Internal(err.to_string()),
                },
            );
        }
    };

    let reg: SirsiRegistrationResponse = serde_json::from_slice(&raw)?;

    // flag the new account with its temp barcode and circ-history rule
    tracing::info!(
        "update temp user {} ({}) registration with temp barcode and circ history",
        reg.patron.key,
        reg.barcode
    );
    let update = json!({
        "@resource": "/user/patron",
        "@key": reg.patron.key,
        "alternateID": reg.barcode,
        "keepCircHistory": "CIRCRULE",
        "preferredAddress": "3",
    });
    let extra = [
        (
            "Accept",
            "application/vnd.sirsidynix.roa.resource.v2+json".to_string(),
        ),
        (
            "Content-Type",
            "application/vnd.sirsidynix.roa.resource.v2+json".to_string(),
        ),
        ("SD-Working-LibraryID", ctx.config.sirsi.library.clone()),
    ];
    if let Err(err) = ctx
        .sirsi_put(
            &ctx.http_client,
            &format!("/user/patron/key/{}", reg.patron.key),
            &update,
            &extra,
        )
        .await
    {
        tracing::warn!("unable to update temp user {}: {err}", reg.patron.key);
    }

    Ok("registration success".to_string())
}

#[derive(Debug, Default, Deserialize)]
struct SirsiActivateResponse {
    #[serde(default)]
    success: bool,
}

/// GET /users/activate/:token
pub async fn activate_user(
    State(ctx): State<Arc<ServiceContext>>,
    Path(token): Path<String>,
) -> ApiResult<String> {
    tracing::info!("activate new account");
    let payload = json!({ "activationToken": token });
    let raw = ctx
        .sirsi_post(&ctx.http_client, "/user/patron/activate", &payload)
        .await?;

    let parsed: SirsiActivateResponse = serde_json::from_slice(&raw)?;
    if !parsed.success {
        tracing::info!("activation returned success=false");
        return Err(ApiError::Upstream(RequestError::new(422, "failed".to_string())));
    }
    Ok("activated".to_string())
}

// ---------------------------------------------------------------------------
// staff login passthrough

#[derive(Debug, Deserialize)]
pub struct StaffLoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /users/sirsi_staff_login
///
/// Exchanges station credentials for an upstream session token; the
/// fill-hold endpoint expects that token back in its request header.
pub async fn staff_login(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<StaffLoginRequest>,
) -> ApiResult<Json<SirsiSignInResponse>> {
    tracing::info!("staff {} login request", req.username);
    let payload = json!({
        "login": req.username,
        "password": req.password,
    });
    let raw = match ctx
        .sirsi_post(&ctx.http_client, "/user/staff/login", &payload)
        .await
    {
        Ok(raw) => raw,
        Err(err) if err.is_unauthorized() => {
            tracing::error!("staff login failed: {err}");
            return Err(ApiError::Unauthorized(
                "invalid username or password".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let parsed: SirsiSignInResponse = serde_json::from_slice(&raw)?;
    tracing::info!("{} logged in successfully", req.username);
    Ok(Json(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> RegisterRequest {
        RegisterRequest {
            first_name: "First".into(),
            last_name: "Last".into(),
            password: "secret".into(),
            email: "user@example.com".into(),
            phone: "555-1234".into(),
            address1: "123 Main St".into(),
            address2: String::new(),
            city: "Charlottesville".into(),
            state: "VA".into(),
            zip: "22903".into(),
        }
    }

    #[test]
    fn test_registration_payload() {
        let payload = SirsiRegistration::from_request(&full_request(), "https://search.example.com");
        assert_eq!(payload.address_line3, "Charlottesville, VA");
        assert_eq!(payload.preferred_address, "3");
        assert_eq!(
            payload.activation_url,
            "https://search.example.com/api/activateTempAccount/"
        );
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_registration_validation() {
        let mut req = full_request();
        req.email = String::new();
        req.zip = String::new();
        let payload = SirsiRegistration::from_request(&req, "https://search.example.com");
        let err = payload.validate().unwrap_err();
        assert!(err.contains("email is required"));
        assert!(err.contains("zip is required"));
    }

    #[test]
    fn test_registration_serializes_flat_field_names() {
        let payload = SirsiRegistration::from_request(&full_request(), "https://search.example.com");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["patron-firstName"], "First");
        assert_eq!(value["patronAddress3-EMAIL"], "user@example.com");
        assert_eq!(value["patronAddress1-LINE3"], "Charlottesville, VA");
    }
}
