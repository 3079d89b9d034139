//! Login and refresh wire types, plus the direct refresh call
//!
//! The refresh call goes straight to a `Transport`, never through the refresh
//! coordinator, so a rejected refresh cannot re-enter refresh handling.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use transport::{RequestDescriptor, Transport};

use crate::error::{Error, Result};

/// Payload of a successful `POST /auth/refresh`.
///
/// The server may rotate the refresh credential; when it doesn't,
/// `refresh_token` is absent and the stored one stays valid.
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("token", &"[REDACTED]")
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Payload of a completed login (password, or password + second factor).
#[derive(Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .finish()
    }
}

/// Login accepted the password but the account needs a second factor.
#[derive(Debug, Clone, Deserialize)]
pub struct TwoFactorChallenge {
    pub user_id: u64,
    #[serde(default)]
    pub temp_token: Option<String>,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(LoginResponse),
    TwoFactorRequired(TwoFactorChallenge),
}

/// Interpret the unwrapped payload of `POST /auth/login`.
///
/// The server answers either `{token, refresh_token, user}` or
/// `{requires_2fa: true, temp_token, user_id}`.
pub fn parse_login_payload(payload: Value) -> Result<LoginOutcome> {
    if payload.get("requires_2fa").and_then(Value::as_bool) == Some(true) {
        let challenge: TwoFactorChallenge = serde_json::from_value(payload)
            .map_err(|e| Error::TokenExchange(format!("invalid two-factor challenge: {e}")))?;
        return Ok(LoginOutcome::TwoFactorRequired(challenge));
    }

    serde_json::from_value(payload)
        .map(LoginOutcome::Authenticated)
        .map_err(|e| Error::TokenExchange(format!("invalid login response: {e}")))
}

/// The request shape of a refresh call against `path` (normally `REFRESH_PATH`).
pub fn refresh_descriptor(path: &str, refresh: &str) -> RequestDescriptor {
    RequestDescriptor::post(path, Some(serde_json::json!({ "refresh_token": refresh })))
}

/// Exchange a refresh credential for a new bearer credential.
///
/// 401/403 from the endpoint means the refresh credential is revoked or
/// expired and maps to `InvalidCredentials`; a missing response maps to
/// `Http`; anything else is a `TokenExchange` failure.
pub async fn refresh_token(
    transport: &dyn Transport,
    path: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    let descriptor = refresh_descriptor(path, refresh);
    let payload = match transport.send(&descriptor).await {
        Ok(payload) => payload,
        Err(failure) => {
            return Err(match failure.status {
                None => Error::Http(format!("token refresh request failed: {}", failure.message)),
                Some(status @ (401 | 403)) => Error::InvalidCredentials(format!(
                    "refresh token rejected ({status}): {}",
                    failure.message
                )),
                Some(status) => Error::TokenExchange(format!(
                    "token refresh returned {status}: {}",
                    failure.message
                )),
            });
        }
    };

    serde_json::from_value(payload)
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
