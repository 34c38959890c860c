//! Staff session manager
//!
//! The connector holds a single staff session against the ILS. The session
//! is established lazily, refreshed when its hour is up, and terminated with
//! an explicit logout on shutdown. Writes go through the `RwLock` write
//! guard; concurrent callers hitting an expired token serialize on the write
//! path and the second caller observes the fresh token without logging in
//! again.

use chrono::{DateTime, Duration, Utc};

use crate::error::RequestError;
use crate::sirsi::{Role, SirsiSignInResponse, SirsiStaffLoginReq};
use crate::ServiceContext;

/// Session lifetime granted by a successful login
const SESSION_TTL_MINUTES: i64 = 60;

/// Process-wide staff session state
#[derive(Debug, Clone)]
pub struct SirsiSession {
    pub staff_key: String,
    pub session_token: String,
    pub refresh_at: DateTime<Utc>,
}

impl Default for SirsiSession {
    fn default() -> Self {
        Self {
            staff_key: String::new(),
            session_token: String::new(),
            refresh_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl SirsiSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.refresh_at
    }

    pub fn is_active(&self) -> bool {
        !self.session_token.is_empty() && !self.is_expired()
    }
}

impl ServiceContext {
    /// Current session token, empty when no session is live
    pub(crate) async fn session_token(&self) -> String {
        self.session.read().await.session_token.clone()
    }

    /// Make sure a usable staff session exists, logging in if needed
    pub async fn ensure_session(&self) -> Result<(), RequestError> {
        {
            let session = self.session.read().await;
            if session.is_active() {
                return Ok(());
            }
        }

        let mut session = self.session.write().await;
        // another request may have logged in while we waited for the lock
        if session.is_active() {
            return Ok(());
        }
        let fresh = self.sirsi_login().await?;
        *session = fresh;
        Ok(())
    }

    /// Authenticate the connector's staff account
    async fn sirsi_login(&self) -> Result<SirsiSession, RequestError> {
        tracing::info!("attempting sirsi login for {}", self.config.sirsi.user);
        let payload = SirsiStaffLoginReq {
            login: self.config.sirsi.user.clone(),
            password: self.config.sirsi.password.clone(),
        };

        // no token yet; send the login with an empty session header
        let resp = self
            .sirsi_post_as(&self.http_client, "/user/staff/login", &payload, Role::Staff, "")
            .await
            .map_err(|e| RequestError::new(e.status, format!("sirsi login failed: {}", e.message)))?;

        let parsed: SirsiSignInResponse = serde_json::from_slice(&resp)
            .map_err(|e| RequestError::internal(format!("unable to parse login response: {e}")))?;

        let session = SirsiSession {
            staff_key: parsed.staff_key,
            session_token: parsed.session_token,
            refresh_at: Utc::now() + Duration::minutes(SESSION_TTL_MINUTES),
        };
        tracing::info!("sirsi login success; refresh at {}", session.refresh_at);
        Ok(session)
    }

    /// Log out of the upstream session if one is live; always clears the
    /// local state. Called from the shutdown hook.
    pub async fn terminate_session(&self) {
        let mut session = self.session.write().await;
        if session.is_active() {
            tracing::info!("terminate active sirsi session");
            let empty = serde_json::json!({});
            let result = self
                .sirsi_post_as(
                    &self.http_client,
                    "/user/staff/logout",
                    &empty,
                    Role::Staff,
                    &session.session_token,
                )
                .await;
            match result {
                Ok(_) => tracing::info!("sirsi session ended"),
                Err(e) => tracing::error!("unable to end session: {e}"),
            }
        } else {
            tracing::info!("no active sirsi session; ok to terminate");
        }
        *session = SirsiSession::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_expired() {
        let session = SirsiSession::default();
        assert!(session.is_expired());
        assert!(!session.is_active());
    }

    #[test]
    fn test_fresh_session_active() {
        let session = SirsiSession {
            staff_key: "42".into(),
            session_token: "tok".into(),
            refresh_at: Utc::now() + Duration::minutes(30),
        };
        assert!(!session.is_expired());
        assert!(session.is_active());
    }

    #[test]
    fn test_token_without_ttl_not_active() {
        let session = SirsiSession {
            staff_key: "42".into(),
            session_token: "tok".into(),
            refresh_at: Utc::now() - Duration::seconds(1),
        };
        assert!(!session.is_active());
    }
}
