//! Console API auth constants
//!
//! Storage keys shared with the web console (so a credential file written by
//! one client is readable by another) and the auth endpoint paths, relative to
//! the API base URL.

/// Storage key of the bearer credential
pub const TOKEN_KEY: &str = "token";

/// Storage key of the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Username/password login
pub const LOGIN_PATH: &str = "/auth/login";

/// Second step of a login when the account has two-factor auth enabled
pub const VERIFY_2FA_LOGIN_PATH: &str = "/auth/verify-2fa-login";

/// Exchanges a refresh credential for a new bearer credential
pub const REFRESH_PATH: &str = "/auth/refresh";

pub const LOGOUT_PATH: &str = "/auth/logout";

pub const CURRENT_USER_PATH: &str = "/auth/me";

/// One-time ticket for opening an SSH websocket session
pub const WS_TICKET_PATH: &str = "/auth/ws-ticket";
