//! Session-invalid signal
//!
//! Raised on a broadcast channel when the session cannot be recovered, so the
//! collaborators that own navigation and user notification can react. The
//! coordinator raises it at most once per session.

/// Why the session was declared dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The login (or two-factor login) call itself returned 401
    LoginRejected,
    /// The refresh endpoint rejected the refresh credential, or could not be reached
    RefreshRejected,
    /// A request replayed with a fresh credential was rejected again
    RetryRejected,
    /// 401 with no refresh credential stored
    MissingRefreshCredential,
}

impl InvalidationReason {
    pub fn label(&self) -> &'static str {
        match self {
            InvalidationReason::LoginRejected => "login_rejected",
            InvalidationReason::RefreshRejected => "refresh_rejected",
            InvalidationReason::RetryRejected => "retry_rejected",
            InvalidationReason::MissingRefreshCredential => "missing_refresh_credential",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated { reason: InvalidationReason },
}
