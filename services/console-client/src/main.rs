//! Console API client
//!
//! Command-line front end for the authenticated request pipeline:
//! 1. Loads config and the on-disk credential store
//! 2. Sends every request through the refresh coordinator
//! 3. Renews an expired session once, no matter how many requests hit it

mod cli;
mod config;
mod metrics;
mod present;

use anyhow::{Context, Result, bail};
use auth_pipeline::{ApiClient, Error as PipelineError, RefreshCoordinator, SessionEvent};
use clap::Parser;
use serde_json::Value;
use session_auth::{FileStorage, LoginOutcome};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpTransport;

use crate::cli::{Cli, Command, parse_body, parse_query};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Install before any request so the first counters are captured
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        credentials = %config.storage.credentials_path.display(),
        "starting console-client"
    );

    let client = Arc::new(build_client(&config).await?);
    let mut events = client.subscribe();

    let result = run(client.clone(), cli.command).await;

    report_session_events(&mut events);
    if let Some(handle) = prometheus {
        for sample in metrics::samples(&handle.render()) {
            println!("{sample}");
        }
    }

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "command failed");
        let text = match e.downcast_ref::<PipelineError>() {
            Some(err) => present::describe(err),
            None => format!("{e:#}"),
        };
        eprintln!("{text}");
        std::process::exit(1);
    }
    Ok(())
}

async fn build_client(config: &Config) -> Result<ApiClient> {
    let storage = FileStorage::load(config.storage.credentials_path.clone())
        .await
        .context("failed to open credential store")?;
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = HttpTransport::new(http, config.api.base_url.clone(), config.request_timeout());
    let coordinator = RefreshCoordinator::new(
        Arc::new(transport),
        Arc::new(storage),
        config.coordinator_config(),
    );
    Ok(ApiClient::new(Arc::new(coordinator)))
}

async fn run(client: Arc<ApiClient>, command: Command) -> Result<()> {
    match command {
        Command::Login {
            username,
            password,
            remember,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let outcome = match client.login(&username, &password, remember).await {
                Ok(outcome) => outcome,
                Err(e) => bail!(present::describe_login(&e)),
            };
            match outcome {
                LoginOutcome::Authenticated(login) => {
                    let name = login
                        .user
                        .as_ref()
                        .and_then(|user| user["username"].as_str())
                        .unwrap_or(&username);
                    println!("logged in as {name}");
                }
                LoginOutcome::TwoFactorRequired(challenge) => {
                    println!(
                        "second factor required, run: console-client verify-2fa {} <code>",
                        challenge.user_id
                    );
                }
            }
        }
        Command::VerifyTwoFactor { user_id, code } => {
            if let Err(e) = client.verify_two_factor_login(user_id, &code).await {
                bail!(present::describe_login(&e));
            }
            println!("logged in");
        }
        Command::Logout => {
            client.logout().await;
            println!("logged out");
        }
        Command::Whoami => print_json(&client.current_user().await?)?,
        Command::WsTicket => println!("{}", client.ws_ticket().await?),
        Command::Get { path, query } => {
            let query = parse_query(&query)?;
            print_json(&client.get(&path, &query).await?)?;
        }
        Command::Post { path, body } => {
            let body = parse_body(body.as_deref())?;
            print_json(&client.post(&path, body).await?)?;
        }
        Command::Put { path, body } => {
            let body = parse_body(body.as_deref())?;
            print_json(&client.put(&path, body).await?)?;
        }
        Command::Delete { path } => print_json(&client.delete(&path).await?)?,
        Command::Burst { path, count } => burst(client, path, count).await?,
    }
    Ok(())
}

/// Fire `count` concurrent GETs at `path` and summarize the outcomes.
async fn burst(client: Arc<ApiClient>, path: String, count: usize) -> Result<()> {
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let client = client.clone();
            let path = path.clone();
            tokio::spawn(async move { client.get(&path, &[]).await })
        })
        .collect();

    let mut failures: Vec<PipelineError> = Vec::new();
    for handle in handles {
        if let Err(e) = handle.await.context("burst request task failed")? {
            failures.push(e);
        }
    }

    println!("{}/{count} succeeded", count - failures.len());
    let mut seen: Vec<String> = Vec::new();
    for failure in &failures {
        let text = present::describe(failure);
        if !seen.contains(&text) {
            println!("  {} failed: {text}", failure.kind().label());
            seen.push(text);
        }
    }
    if let Some(first) = failures.into_iter().next() {
        return Err(first.into());
    }
    Ok(())
}

/// Log every session-invalid signal raised while the command ran.
fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(SessionEvent::Invalidated { reason }) = events.try_recv() {
        if present::is_expiry(reason) {
            warn!(reason = reason.label(), "session ended, stored credentials were cleared");
        } else {
            info!(reason = reason.label(), "login rejected");
        }
    }
}

fn read_password() -> Result<String> {
    eprint!("password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to format response")?
    );
    Ok(())
}
