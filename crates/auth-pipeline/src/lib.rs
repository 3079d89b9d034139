//! Authenticated request pipeline for the console API
//!
//! Requests flow attacher -> transport -> coordinator:
//! - `attacher` stamps the stored bearer credential onto each descriptor
//! - `classify` sorts failures into recoverable 401s and everything else
//! - `coordinator` runs single-flight refresh and replays queued requests
//! - `client` wraps it all in an API-shaped facade
//!
//! When the session cannot be recovered, credentials are cleared and a
//! `SessionEvent` is broadcast once.

pub mod attacher;
pub mod classify;
pub mod client;
pub mod coordinator;
mod error;
pub mod metrics;
pub mod session;

#[cfg(test)]
mod testutil;

pub use client::ApiClient;
pub use coordinator::{CoordinatorConfig, DEFAULT_REFRESH_TIMEOUT, RefreshCoordinator};
pub use error::{Error, ErrorKind, Result};
pub use session::{InvalidationReason, SessionEvent};
