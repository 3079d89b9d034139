//! Error types for pipeline operations

/// Classified failure of one logical request.
///
/// An expired credential that the coordinator recovers from never shows up
/// here; `SessionExpired` means recovery was impossible or failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Transport(String),

    #[error("request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("credential refresh was abandoned before it settled")]
    RefreshAborted,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

/// Failure classes, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response reached the client
    TransportError,
    /// 4xx other than 401
    ClientError,
    /// 5xx
    ServerError,
    /// 401 with a refresh path available; absorbed by the coordinator
    UnauthorizedRecoverable,
    /// 401 with no way back, failed refresh, or a replay that was rejected again
    SessionExpired,
    /// Local failure: unreadable payload or credential storage
    Internal,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::TransportError => "transport_error",
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::UnauthorizedRecoverable => "unauthorized_recoverable",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // The abandoned refresh never produced a response
            Error::Transport(_) | Error::RefreshAborted => ErrorKind::TransportError,
            Error::Client { .. } => ErrorKind::ClientError,
            Error::Server { .. } => ErrorKind::ServerError,
            Error::SessionExpired(_) => ErrorKind::SessionExpired,
            Error::InvalidResponse(_) | Error::Storage(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status behind this error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Client { status, .. } | Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
