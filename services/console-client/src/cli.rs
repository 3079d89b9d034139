//! Command-line interface

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "console-client", about = "Console API client with transparent session renewal")]
pub struct Cli {
    /// Path to the TOML configuration file (default: $CONFIG_PATH or console-client.toml).
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    /// Print client metrics after the command finishes.
    #[arg(long, global = true)]
    pub metrics: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with username and password.
    Login {
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
        /// Ask the server for a long-lived session.
        #[arg(long)]
        remember: bool,
    },
    /// Finish a login that asked for a second factor.
    #[command(name = "verify-2fa")]
    VerifyTwoFactor { user_id: u64, code: String },
    /// Sign out and forget stored credentials.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// Issue a WebSocket ticket.
    WsTicket,
    Get {
        path: String,
        /// Query parameter, repeatable.
        #[arg(short, long, value_name = "KEY=VALUE")]
        query: Vec<String>,
    },
    Post {
        path: String,
        /// JSON request body.
        #[arg(short, long)]
        body: Option<String>,
    },
    Put {
        path: String,
        /// JSON request body.
        #[arg(short, long)]
        body: Option<String>,
    },
    Delete { path: String },
    /// Send concurrent GETs to one path; an expired session is renewed once.
    Burst {
        path: String,
        #[arg(default_value_t = 10)]
        count: usize,
    },
}

pub fn parse_query(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("query must be KEY=VALUE, got: {pair}"),
        })
        .collect()
}

pub fn parse_body(body: Option<&str>) -> Result<Option<Value>> {
    body.map(|raw| serde_json::from_str(raw).context("request body must be valid JSON"))
        .transpose()
}
