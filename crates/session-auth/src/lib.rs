//! Session credentials for the console API
//!
//! Provides credential storage (the persistent key-value store holding the
//! bearer and refresh credentials), the login/refresh wire types, and the
//! direct refresh call used by the refresh coordinator. Nothing in this crate
//! decides *when* to refresh; that is the pipeline's job.
//!
//! Credential flow:
//! 1. `ApiClient::login` posts to `LOGIN_PATH`, payload parsed by `parse_login_payload()`
//! 2. Both credentials stored via `CredentialStorage::set()` under `TOKEN_KEY` / `REFRESH_TOKEN_KEY`
//! 3. On an expired credential the coordinator calls `token::refresh_token()` once
//! 4. Rotated credentials saved via `CredentialStorage::set()`, or cleared on failure

pub mod constants;
pub mod error;
pub mod storage;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use storage::{CredentialStorage, FileStorage, MemoryStorage};
pub use token::{
    LoginOutcome, LoginResponse, RefreshResponse, TwoFactorChallenge, parse_login_payload,
    refresh_descriptor, refresh_token,
};
