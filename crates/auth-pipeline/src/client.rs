//! Console API client
//!
//! Facade over the refresh coordinator: generic verbs for any endpoint plus
//! typed helpers for the session endpoints. Login calls go through the
//! coordinator too, so a rejected login is handled like any other
//! unrecoverable 401.

use std::sync::Arc;

use serde_json::{Value, json};
use session_auth::{
    CURRENT_USER_PATH, LOGIN_PATH, LOGOUT_PATH, LoginOutcome, LoginResponse,
    VERIFY_2FA_LOGIN_PATH, WS_TICKET_PATH, parse_login_payload,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use transport::RequestDescriptor;

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::session::SessionEvent;

pub struct ApiClient {
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Value> {
        self.coordinator.execute(descriptor).await
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let mut descriptor = RequestDescriptor::get(path);
        descriptor.query.extend_from_slice(query);
        self.send(descriptor).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.send(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(RequestDescriptor::delete(path)).await
    }

    /// Password login. Credentials are stored only when the server completes
    /// the login; a two-factor challenge is returned to the caller to finish
    /// with `verify_two_factor_login`.
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<LoginOutcome> {
        let payload = self
            .post(
                LOGIN_PATH,
                Some(json!({ "username": username, "password": password, "remember": remember })),
            )
            .await?;
        let outcome = parse_login_payload(payload).map_err(|e| Error::InvalidResponse(e.to_string()))?;

        match &outcome {
            LoginOutcome::Authenticated(login) => {
                self.establish(login).await?;
                info!(username, "logged in");
            }
            LoginOutcome::TwoFactorRequired(challenge) => {
                info!(username, user_id = challenge.user_id, "second factor required");
            }
        }
        Ok(outcome)
    }

    pub async fn verify_two_factor_login(&self, user_id: u64, code: &str) -> Result<LoginResponse> {
        let payload = self
            .post(
                VERIFY_2FA_LOGIN_PATH,
                Some(json!({ "user_id": user_id, "code": code })),
            )
            .await?;

        match parse_login_payload(payload).map_err(|e| Error::InvalidResponse(e.to_string()))? {
            LoginOutcome::Authenticated(login) => {
                self.establish(&login).await?;
                info!(user_id, "logged in with second factor");
                Ok(login)
            }
            LoginOutcome::TwoFactorRequired(_) => Err(Error::InvalidResponse(
                "server asked for another second factor".into(),
            )),
        }
    }

    /// Tell the server, then forget the stored credentials no matter what it
    /// answered.
    pub async fn logout(&self) {
        if let Err(e) = self.post(LOGOUT_PATH, None).await {
            warn!(error = %e, "logout request failed, clearing local credentials anyway");
        }
        self.coordinator.clear_credentials().await;
        info!("logged out");
    }

    pub async fn current_user(&self) -> Result<Value> {
        self.get(CURRENT_USER_PATH, &[]).await
    }

    /// Short-lived ticket for opening an authenticated WebSocket.
    pub async fn ws_ticket(&self) -> Result<String> {
        let payload = self.post(WS_TICKET_PATH, None).await?;
        payload
            .get("ticket")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::InvalidResponse("ws-ticket response has no ticket".into()))
    }

    /// Whether a bearer credential is held. Says nothing about whether the
    /// server still accepts it.
    pub async fn is_authenticated(&self) -> bool {
        self.coordinator.current_credential().await.is_some()
    }

    async fn establish(&self, login: &LoginResponse) -> Result<()> {
        if login.refresh_token.is_none() {
            warn!("login response has no refresh token, the session cannot be renewed");
        }
        self.coordinator
            .install_credentials(login.token.clone(), login.refresh_token.clone())
            .await
            .map_err(|e| Error::Storage(e.to_string()))
    }
}
