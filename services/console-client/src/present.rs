//! User-facing text for pipeline failures

use auth_pipeline::{Error, InvalidationReason};

/// One-line message for a failed command.
pub fn describe(err: &Error) -> String {
    match err {
        Error::Transport(detail) => {
            format!("Network error, please check your connection ({detail})")
        }
        Error::Client { message, .. } => message.clone(),
        Error::Server { status, message } => format!("Server error ({status}): {message}"),
        Error::SessionExpired(_) => "Session expired, please log in again".into(),
        Error::RefreshAborted => "Session renewal was interrupted, please retry".into(),
        Error::InvalidResponse(detail) => format!("Unexpected response from server: {detail}"),
        Error::Storage(detail) => format!("Could not save credentials: {detail}"),
    }
}

/// Like `describe`, for the login commands: a rejected login is a bad
/// password or code, not an expired session.
pub fn describe_login(err: &Error) -> String {
    match err {
        Error::SessionExpired(message) => format!("Login failed: {message}"),
        other => describe(other),
    }
}

/// Whether an invalidation should be reported as an expired session.
pub fn is_expiry(reason: InvalidationReason) -> bool {
    !matches!(reason, InvalidationReason::LoginRejected)
}
