//! Upstream transport
//!
//! One funnel for every outbound HTTP call. Classifies transport failures
//! into HTTP-ish statuses, preserves application-error bodies verbatim, and
//! logs timing keyed by the upstream service tag.

use std::time::Instant;

use crate::error::RequestError;
use crate::ServiceContext;

/// User-Agent required by the ILS; requests without it are rejected with 403
pub const UPSTREAM_USER_AGENT: &str = "Rust_ILS_Connector";

impl ServiceContext {
    /// Execute a prepared request and return the raw body bytes.
    ///
    /// Transport failures map to 408 (timeout), 503 (refused/unreachable) or
    /// 400 (anything else). A response with status outside {200, 201} is an
    /// application failure; its entire body is preserved as the error
    /// message so callers can extract the upstream's structured messages.
    pub async fn send_request(
        &self,
        service: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, RequestError> {
        let request = request.header(reqwest::header::USER_AGENT, UPSTREAM_USER_AGENT);
        let (client, built) = request.build_split();
        let built = built.map_err(|e| RequestError::internal(e.to_string()))?;

        let method = built.method().clone();
        let url = built.url().clone();
        tracing::info!("{service} {method} request: {url}");
        let start = Instant::now();

        let response = match client.execute(built).await {
            Ok(resp) => resp,
            Err(err) => {
                let (status, message) = if err.is_timeout() {
                    (408, format!("{url} timed out"))
                } else if err.is_connect() {
                    (503, format!("{url} refused connection"))
                } else {
                    (400, err.to_string())
                };
                return Err(RequestError::new(status, message));
            }
        };

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        if status.as_u16() != 200 && status.as_u16() != 201 {
            return Err(RequestError::new(
                status.as_u16(),
                String::from_utf8_lossy(&body).to_string(),
            ));
        }

        tracing::info!(
            "{service} {method} request processed in {} (ms)",
            start.elapsed().as_millis()
        );
        Ok(body.to_vec())
    }
}
