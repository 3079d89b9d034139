//! Pipeline metrics
//!
//! Recorded through the `metrics` facade; the binary decides whether a
//! Prometheus recorder is installed. Without one these calls are no-ops.
//!
//! - `client_requests_total` (counter): label `outcome`
//! - `client_token_refresh_total` (counter): label `outcome`
//! - `client_refresh_waiters_total` (counter)
//! - `client_session_invalidated_total` (counter): label `reason`

use crate::error::ErrorKind;
use crate::session::InvalidationReason;

/// Record a finished logical request; `None` means it succeeded.
pub fn record_request(failure: Option<ErrorKind>) {
    let outcome = failure.map_or("ok", |kind| kind.label());
    metrics::counter!("client_requests_total", "outcome" => outcome).increment(1);
}

/// Record a settled refresh cycle: `success`, `failure`, or `aborted`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request queued behind an in-flight refresh.
pub fn record_waiter_queued() {
    metrics::counter!("client_refresh_waiters_total").increment(1);
}

pub fn record_invalidation(reason: InvalidationReason) {
    metrics::counter!("client_session_invalidated_total", "reason" => reason.label()).increment(1);
}
