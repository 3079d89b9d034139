//! Failure classification
//!
//! Splits failed outcomes into the expired-credential case the coordinator
//! handles and the non-auth failures surfaced to callers untouched.

use transport::Failure;

use crate::error::{Error, ErrorKind};

/// The not-authenticated status that triggers refresh handling.
pub const UNAUTHORIZED: u16 = 401;

/// Classify a failure by its HTTP status (`None` = no response received).
///
/// 401 is the only recoverable class; every other 4xx is a client error and
/// 5xx a server error. Non-error statuses never reach here, but anything below
/// 500 that isn't 401 is treated as a client error.
pub fn classify_status(status: Option<u16>) -> ErrorKind {
    match status {
        None => ErrorKind::TransportError,
        Some(UNAUTHORIZED) => ErrorKind::UnauthorizedRecoverable,
        Some(s) if s >= 500 => ErrorKind::ServerError,
        Some(_) => ErrorKind::ClientError,
    }
}

/// Turn a non-recoverable failure into the caller-facing error.
///
/// A 401 reaching this function has already been ruled unrecoverable, so it
/// surfaces as `SessionExpired`.
pub fn into_error(failure: Failure) -> Error {
    match (classify_status(failure.status), failure.status) {
        (ErrorKind::ServerError, Some(status)) => Error::Server {
            status,
            message: failure.message,
        },
        (ErrorKind::ClientError, Some(status)) => Error::Client {
            status,
            message: failure.message,
        },
        (ErrorKind::UnauthorizedRecoverable, _) => Error::SessionExpired(failure.message),
        _ => Error::Transport(failure.message),
    }
}
