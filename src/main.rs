//! plcweb-bulk - run a file of Web API calls against a PLC as one bulk
//! operation.
//!
//! ```text
//! plcweb-bulk [OPTIONS] <calls.json | ->
//! ```
//!
//! The input is a JSON array of `{"method": .., "params": .., "id": ..}`
//! objects (`params` and `id` optional). One JSON line is printed per
//! outcome, in input order; logs and the summary go to stderr. Every
//! option can also be given through its `PLCWEB_*` environment variable,
//! see `--help`.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plcweb_bulk::config::ConfigArgs;
use plcweb_bulk::{ApiRequest, ClientConfig, Outcome, WebApiClient};

/// One entry of the input file.
#[derive(Debug, Deserialize)]
struct CallEntry {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<String>,
}

impl From<CallEntry> for ApiRequest {
    fn from(entry: CallEntry) -> Self {
        let call = ApiRequest::with_params(entry.method, entry.params);
        match entry.id {
            Some(id) => call.with_id(id),
            None => call,
        }
    }
}

/// Run a file of Web API calls against a PLC as one bulk operation.
#[derive(Parser, Debug)]
#[command(name = "plcweb-bulk", version, about)]
struct Args {
    /// JSON array of calls, or `-` to read from stdin.
    input: String,

    #[command(flatten)]
    config: ConfigArgs,

    /// Log in as this user before sending the calls.
    ///
    /// Environment variable: `PLCWEB_USER`
    #[arg(long, env = "PLCWEB_USER", requires = "password")]
    user: Option<String>,

    /// Password for `--user`.
    ///
    /// Environment variable: `PLCWEB_PASSWORD`
    #[arg(long, env = "PLCWEB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

fn read_calls(input: &str) -> Result<Vec<ApiRequest>> {
    let raw = if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read calls from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let entries: Vec<CallEntry> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse calls in {}", input))?;
    Ok(entries.into_iter().map(ApiRequest::from).collect())
}

fn outcome_line(outcome: &Outcome) -> Value {
    match outcome {
        Outcome::Success { id, result } => json!({"id": id, "result": result}),
        Outcome::Fault { id, error } => json!({
            "id": id,
            "error": {"code": error.code, "kind": error.kind().as_str(), "message": error.message},
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the results
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "plcweb_bulk=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::load(&args.config).context("Failed to load configuration")?;
    let calls = read_calls(&args.input)?;
    let total = calls.len();
    tracing::info!(
        "Sending {} calls to {} (max {} bytes per request)",
        total,
        config.base_url,
        config.max_request_size
    );

    let client = WebApiClient::from_config(config).context("Failed to create client")?;

    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        client.login(user, password).await.context("Login failed")?;
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling bulk operation");
            on_ctrl_c.cancel();
        }
    });

    let result = client
        .run_bulk_with_cancel(calls, &cancel)
        .await
        .context("Bulk operation failed")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in result.outcomes() {
        writeln!(out, "{}", outcome_line(outcome))?;
    }
    out.flush()?;

    if !result.missing().is_empty() {
        tracing::warn!("No reply for: {}", result.missing().join(", "));
    }
    eprintln!(
        "{} calls: {} succeeded, {} failed, {} unanswered",
        total,
        result.success_count(),
        result.fault_count(),
        result.missing().len()
    );

    if client.transport().auth_token().is_some() {
        if let Err(e) = client.logout().await {
            tracing::warn!("Logout failed: {}", e);
        }
    }

    Ok(())
}
