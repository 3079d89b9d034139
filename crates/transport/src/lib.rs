//! Request transport for the console API
//!
//! Defines the replayable `RequestDescriptor`, the `Outcome` of sending one,
//! and the `Transport` trait that decouples the auth pipeline from the HTTP
//! stack. `HttpTransport` is the reqwest-backed implementation; tests in the
//! pipeline crates substitute scripted transports behind the same trait.

pub mod descriptor;
pub mod http;

pub use descriptor::RequestDescriptor;
pub use http::HttpTransport;
pub use reqwest::{Method, header};

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// A failed request as seen by the client.
///
/// `status` is `None` when no response reached the client (connect error,
/// timeout, unreadable body). `body` holds the decoded JSON error body when
/// the server sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub message: String,
}

impl Failure {
    /// Transport-level failure: nothing came back from the server.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// Failure carrying an HTTP status.
    ///
    /// The message is the server's `error` field when the body follows the
    /// `{"success": false, "error": "..."}` envelope, otherwise a generic
    /// description of the status.
    pub fn from_status(status: u16, body: Option<Value>) -> Self {
        let message = body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self {
            status: Some(status),
            body,
            message,
        }
    }

    /// Whether the server rejected the bearer credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

/// Result of sending one request: the unwrapped payload or a failure.
pub type Outcome = Result<Value, Failure>;

/// Sends a request descriptor and reports its outcome.
///
/// Implementations never retry and never touch credentials; the descriptor is
/// sent exactly as given. Uses `Pin<Box<dyn Future>>` so the pipeline can hold
/// an `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;
}
