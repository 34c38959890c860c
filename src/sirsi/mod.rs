//! Sirsi web-services client
//!
//! Wire primitives shared by every upstream call, plus thin GET/POST/PUT/
//! DELETE helpers that apply the standard header set. The transport itself
//! (timing, error classification) lives in [`transport`]; the staff session
//! in [`session`]; the prompt-override retry engine in [`retry`].

pub mod retry;
pub mod session;
pub mod transport;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::ServiceContext;

/// A typed reference to another Sirsi resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SirsiKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default)]
    pub key: String,
}

impl SirsiKey {
    pub fn new(resource: &str, key: &str) -> Self {
        Self {
            resource: Some(resource.to_string()),
            key: key.to_string(),
        }
    }
}

/// Wrapper for resources that only project a description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SirsiDescription {
    #[serde(default)]
    pub description: String,
}

/// One entry of an upstream messageList
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SirsiMessage {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiMessageList {
    #[serde(rename = "messageList", default)]
    pub message_list: Vec<SirsiMessage>,
}

/// The structured error body Sirsi returns for refused operations. When
/// `data_map.prompt_type` is non-empty the operation can be retried with the
/// prompt code echoed back (see [`retry`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiError {
    #[serde(rename = "messageList", default)]
    pub message_list: Vec<SirsiMessage>,
    #[serde(rename = "promptRequired", default)]
    pub prompt_required: bool,
    #[serde(rename = "dataMap", default)]
    pub data_map: SirsiErrorDataMap,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiErrorDataMap {
    #[serde(rename = "promptType", default)]
    pub prompt_type: String,
    #[serde(rename = "recommendedAction", default)]
    pub recommended_action: String,
}

/// Staff login payload
#[derive(Debug, Serialize)]
pub struct SirsiStaffLoginReq {
    pub login: String,
    pub password: String,
}

/// Response to staff and patron sign-ins
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SirsiSignInResponse {
    #[serde(rename = "staffKey", default)]
    pub staff_key: String,
    #[serde(rename = "sessionToken", default)]
    pub session_token: String,
    #[serde(default)]
    pub name: String,
}

/// Preferred role sent on upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Staff,
    Patron,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "STAFF",
            Role::Patron => "PATRON",
        }
    }
}

impl ServiceContext {
    /// Standard header set for a Sirsi call. Per-endpoint overrides (DIBS,
    /// TrackSys, fill-hold) are layered on by the caller.
    pub(crate) fn sirsi_headers(&self, role: Role, session_token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-sirs-clientID",
            HeaderValue::from_str(&self.config.sirsi.client_id)
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert("x-sirs-locale", HeaderValue::from_static("en_US"));
        headers.insert("SD-Originating-App-Id", HeaderValue::from_static("Virgo"));
        headers.insert("SD-Preferred-Role", HeaderValue::from_static(role.as_str()));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        if !session_token.is_empty() {
            if let Ok(tok) = HeaderValue::from_str(session_token) {
                headers.insert("x-sirs-sessionToken", tok);
            }
        }
        headers
    }

    fn sirsi_url(&self, uri: &str) -> String {
        format!("{}{}", self.config.sirsi.web_services_url, uri)
    }

    /// GET against the web-services base with the standard staff headers
    pub async fn sirsi_get(
        &self,
        client: &reqwest::Client,
        uri: &str,
    ) -> Result<Vec<u8>, RequestError> {
        let token = self.session_token().await;
        let req = client
            .request(Method::GET, self.sirsi_url(uri))
            .headers(self.sirsi_headers(Role::Staff, &token));
        self.send_request("sirsi", req).await
    }

    /// DELETE against the web-services base with the standard staff headers
    pub async fn sirsi_delete(
        &self,
        client: &reqwest::Client,
        uri: &str,
    ) -> Result<Vec<u8>, RequestError> {
        let token = self.session_token().await;
        let req = client
            .request(Method::DELETE, self.sirsi_url(uri))
            .headers(self.sirsi_headers(Role::Staff, &token));
        self.send_request("sirsi", req).await
    }

    /// POST against the web-services base with the standard staff headers
    pub async fn sirsi_post<T: Serialize>(
        &self,
        client: &reqwest::Client,
        uri: &str,
        payload: &T,
    ) -> Result<Vec<u8>, RequestError> {
        let token = self.session_token().await;
        self.sirsi_post_as(client, uri, payload, Role::Staff, &token)
            .await
    }

    /// POST with an explicit role and session token. Patron-scoped calls
    /// (changeMyPin) and proxied staff sessions (fill-hold) use this.
    pub async fn sirsi_post_as<T: Serialize>(
        &self,
        client: &reqwest::Client,
        uri: &str,
        payload: &T,
        role: Role,
        session_token: &str,
    ) -> Result<Vec<u8>, RequestError> {
        let req = client
            .request(Method::POST, self.sirsi_url(uri))
            .headers(self.sirsi_headers(role, session_token))
            .json(payload);
        self.send_request("sirsi", req).await
    }

    /// PUT of an entire resource with the standard staff headers plus any
    /// endpoint-specific extras
    pub async fn sirsi_put<T: Serialize>(
        &self,
        client: &reqwest::Client,
        uri: &str,
        payload: &T,
        extra_headers: &[(&str, String)],
    ) -> Result<Vec<u8>, RequestError> {
        let token = self.session_token().await;
        let mut headers = self.sirsi_headers(Role::Staff, &token);
        for (name, value) in extra_headers {
            if let (Ok(n), Ok(v)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(n, v);
            }
        }
        let req = client
            .request(Method::PUT, self.sirsi_url(uri))
            .headers(headers)
            .json(payload);
        self.send_request("sirsi", req).await
    }

    /// Check a failed response for a structured messageList body. When one is
    /// present the failure is an application refusal and should be surfaced
    /// with the upstream's own text; otherwise it is a system error.
    pub fn handle_sirsi_error_response(
        &self,
        err: &RequestError,
    ) -> Result<SirsiError, RequestError> {
        if err.message.contains("messageList") {
            tracing::info!("extract message list from failed sirsi response {}", err);
            serde_json::from_str::<SirsiError>(&err.message)
                .map_err(|parse_err| RequestError::internal(parse_err.to_string()))
        } else {
            Err(err.clone())
        }
    }
}

/// Strip the leading `u` from a catalog key; Sirsi calls use the numeric part
pub fn clean_cat_key(cat_key: &str) -> &str {
    cat_key.strip_prefix('u').unwrap_or(cat_key)
}

/// True when the catalog key has the `u<digits>` shape the ILS understands
pub fn is_sirsi_cat_key(cat_key: &str) -> bool {
    cat_key
        .strip_prefix('u')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
