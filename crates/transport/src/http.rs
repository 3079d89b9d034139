//! reqwest-backed transport
//!
//! Sends descriptors to `{base_url}{path}` and unwraps the console API's
//! response envelope: `{"success": true, "data": ...}` yields `data`, any other
//! 2xx JSON body is returned as-is, and non-2xx statuses become `Failure`s
//! carrying the decoded body. No retries happen here.

use crate::{Failure, Outcome, RequestDescriptor, Transport};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
        Box::pin(async move {
            let mut request = self
                .client
                .request(descriptor.method.clone(), self.url(&descriptor.path))
                .headers(descriptor.headers.clone())
                .timeout(self.timeout);
            if !descriptor.query.is_empty() {
                request = request.query(&descriptor.query);
            }
            if let Some(body) = &descriptor.body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(request_id = %descriptor.id, error = %e, "request did not reach the server");
                    return Err(Failure::transport(e.to_string()));
                }
            };

            let status = response.status();
            let bytes = match response.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(request_id = %descriptor.id, error = %e, "failed to read response body");
                    return Err(Failure::transport(format!("response read error: {e}")));
                }
            };
            let body: Option<Value> = if bytes.is_empty() {
                None
            } else {
                serde_json::from_slice(&bytes).ok()
            };

            debug!(
                request_id = %descriptor.id,
                method = %descriptor.method,
                path = %descriptor.path,
                status = status.as_u16(),
                "response received"
            );

            if status.is_success() {
                Ok(unwrap_envelope(body.unwrap_or(Value::Null)))
            } else {
                Err(Failure::from_status(status.as_u16(), body))
            }
        })
    }
}

/// Strip the `{"success": true, "data": ...}` envelope.
pub fn unwrap_envelope(body: Value) -> Value {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        body.get("data").cloned().unwrap_or(Value::Null)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use reqwest::header::{AUTHORIZATION, HeaderValue};
    use tokio::net::TcpListener;

    /// Start a mock console API on an ephemeral port.
    async fn start_mock_api() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{addr}/api");

        let handle = tokio::spawn(async move {
            let app = axum::Router::new()
                .route(
                    "/api/hosts",
                    get(|| async {
                        Json(serde_json::json!({"success": true, "data": [{"id": 1}]}))
                    }),
                )
                .route(
                    "/api/raw",
                    get(|| async { Json(serde_json::json!({"items": 3})) }),
                )
                .route(
                    "/api/echo",
                    post(
                        |headers: HeaderMap,
                         axum::extract::RawQuery(query): axum::extract::RawQuery,
                         Json(body): Json<serde_json::Value>| async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            Json(serde_json::json!({
                                "success": true,
                                "data": {
                                    "authorization": auth,
                                    "query": query.unwrap_or_default(),
                                    "body": body,
                                }
                            }))
                        },
                    ),
                )
                .route(
                    "/api/auth/me",
                    get(|| async {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({"success": false, "error": "token expired"})),
                        )
                    }),
                )
                .route(
                    "/api/broken",
                    get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "plain text failure") }),
                );
            axum::serve(listener, app).await.unwrap();
        });

        (url, handle)
    }

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(reqwest::Client::new(), base_url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn success_envelope_is_unwrapped() {
        let (url, _server) = start_mock_api().await;
        let t = transport(&url);

        let payload = t.send(&RequestDescriptor::get("/hosts")).await.unwrap();
        assert_eq!(payload, serde_json::json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn body_without_envelope_passes_through() {
        let (url, _server) = start_mock_api().await;
        let t = transport(&url);

        let payload = t.send(&RequestDescriptor::get("/raw")).await.unwrap();
        assert_eq!(payload["items"], 3);
    }

    #[tokio::test]
    async fn headers_query_and_body_are_forwarded() {
        let (url, _server) = start_mock_api().await;
        let t = transport(&url);

        let descriptor = RequestDescriptor::post("/echo", Some(serde_json::json!({"k": "v"})))
            .with_query("page", "2")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer at_1"));
        let payload = t.send(&descriptor).await.unwrap();

        assert_eq!(payload["authorization"], "Bearer at_1");
        assert_eq!(payload["query"], "page=2");
        assert_eq!(payload["body"]["k"], "v");
    }

    #[tokio::test]
    async fn unauthorized_status_carries_server_message() {
        let (url, _server) = start_mock_api().await;
        let t = transport(&url);

        let failure = t.send(&RequestDescriptor::get("/auth/me")).await.unwrap_err();
        assert_eq!(failure.status, Some(401));
        assert!(failure.is_unauthorized());
        assert_eq!(failure.message, "token expired");
    }

    #[tokio::test]
    async fn non_json_error_body_still_reports_status() {
        let (url, _server) = start_mock_api().await;
        let t = transport(&url);

        let failure = t.send(&RequestDescriptor::get("/broken")).await.unwrap_err();
        assert_eq!(failure.status, Some(500));
        assert!(failure.body.is_none());
        assert_eq!(failure.message, "request failed with status 500");
    }

    #[tokio::test]
    async fn dead_server_is_a_transport_failure() {
        let t = transport("http://127.0.0.1:1/api");

        let failure = t.send(&RequestDescriptor::get("/hosts")).await.unwrap_err();
        assert_eq!(failure.status, None);
        assert!(!failure.message.is_empty());
    }

    #[test]
    fn url_joins_base_and_path() {
        let t = transport("http://localhost:8080/api/");
        assert_eq!(t.base_url(), "http://localhost:8080/api");
        assert_eq!(t.url("/auth/me"), "http://localhost:8080/api/auth/me");
        assert_eq!(t.url("hosts"), "http://localhost:8080/api/hosts");
    }

    #[test]
    fn envelope_with_false_success_is_returned_whole() {
        let body = serde_json::json!({"success": false, "error": "nope"});
        assert_eq!(unwrap_envelope(body.clone()), body);
        assert_eq!(
            unwrap_envelope(serde_json::json!({"success": true})),
            Value::Null
        );
    }
}
