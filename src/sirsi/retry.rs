//! Prompt-override retry engine
//!
//! The ILS refuses privileged circulation transitions until the caller
//! echoes back each prompt code it raised, one `SD-Prompt-Return` header per
//! code. This module turns that conversation into a single bounded call:
//! resubmit with the accumulated override list until the call succeeds, the
//! error carries no prompt, or the attempt budget runs out.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;

use crate::error::RequestError;
use crate::sirsi::{Role, SirsiError};
use crate::ServiceContext;

/// Maximum attempts per logical operation
pub const MAX_OVERRIDE_ATTEMPTS: usize = 5;

const PROMPT_RETURN_HEADER: &str = "SD-Prompt-Return";

/// Inspect a failed attempt and, when recoverable, push the next override
/// onto the list. Returns true when the caller should retry.
pub fn accumulate_override(overrides: &mut Vec<String>, err_body: &str, postfix: &str) -> bool {
    let parsed: SirsiError = match serde_json::from_str(err_body) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let prompt = parsed.data_map.prompt_type;
    if prompt.is_empty() {
        return false;
    }
    if postfix.is_empty() {
        overrides.push(prompt);
    } else {
        overrides.push(format!("{prompt}/{postfix}"));
    }
    true
}

impl ServiceContext {
    /// POST `payload` to `uri`, replaying with accumulated prompt-return
    /// codes until the upstream accepts or the failure is unrecoverable.
    ///
    /// `session_token` lets workflows proxy a staff station's own session
    /// instead of the connector's. `extra_headers` carries per-endpoint
    /// client-id and working-library overrides.
    pub async fn sirsi_post_with_overrides<T: Serialize>(
        &self,
        uri: &str,
        payload: &T,
        session_token: &str,
        extra_headers: &[(&str, String)],
        base_overrides: &[String],
        override_postfix: &str,
    ) -> Result<Vec<u8>, RequestError> {
        let mut overrides: Vec<String> = base_overrides.to_vec();
        let url = format!("{}{}", self.config.sirsi.web_services_url, uri);
        let mut last_err = RequestError::internal("override retry never attempted");

        for attempt in 1..=MAX_OVERRIDE_ATTEMPTS {
            let mut headers = self.sirsi_headers(Role::Staff, session_token);
            for (name, value) in extra_headers {
                if let (Ok(n), Ok(v)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    headers.insert(n, v);
                }
            }
            append_prompt_returns(&mut headers, &overrides);

            let req = self
                .http_client
                .request(Method::POST, url.as_str())
                .headers(headers)
                .json(payload);

            match self.send_request("sirsi", req).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    tracing::info!(
                        "attempt {attempt} of {uri} failed with {}: {}",
                        err.status,
                        err.message
                    );
                    let recoverable =
                        accumulate_override(&mut overrides, &err.message, override_postfix);
                    last_err = err;
                    if !recoverable {
                        break;
                    }
                }
            }
        }

        Err(last_err)
    }
}

fn append_prompt_returns(headers: &mut HeaderMap, overrides: &[String]) {
    for code in overrides {
        if let Ok(value) = HeaderValue::from_str(code) {
            headers.append(PROMPT_RETURN_HEADER, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt_body(prompt_type: &str) -> String {
        format!(
            r#"{{"messageList":[{{"code":"hatErrorResponse.252","message":"blocked"}}],"promptRequired":true,"dataMap":{{"promptType":"{prompt_type}"}}}}"#
        )
    }

    #[test]
    fn test_accumulate_appends_prompt() {
        let mut overrides = vec!["CKOBLOCKS".to_string()];
        let again = accumulate_override(&mut overrides, &prompt_body("CIRC_HOLDS_OVRCD"), "");
        assert!(again);
        assert_eq!(overrides, vec!["CKOBLOCKS", "CIRC_HOLDS_OVRCD"]);
    }

    #[test]
    fn test_accumulate_applies_postfix() {
        let mut overrides = Vec::new();
        let again = accumulate_override(
            &mut overrides,
            &prompt_body("CIRC_NONCHARGEABLE_OVRCD"),
            "DIBSDIBS",
        );
        assert!(again);
        assert_eq!(overrides, vec!["CIRC_NONCHARGEABLE_OVRCD/DIBSDIBS"]);
    }

    #[test]
    fn test_empty_prompt_is_unrecoverable() {
        let mut overrides = vec!["CKOBLOCKS".to_string()];
        let again = accumulate_override(&mut overrides, &prompt_body(""), "");
        assert!(!again);
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn test_unparseable_body_is_unrecoverable() {
        let mut overrides = Vec::new();
        assert!(!accumulate_override(&mut overrides, "<html>gateway error</html>", ""));
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_prompt_headers_appended_per_code() {
        let mut headers = HeaderMap::new();
        let codes = vec!["CKOBLOCKS".to_string(), "/OK".to_string()];
        append_prompt_returns(&mut headers, &codes);
        let values: Vec<_> = headers.get_all(PROMPT_RETURN_HEADER).iter().collect();
        assert_eq!(values.len(), 2);
    }
}
