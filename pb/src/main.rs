//! Postback - media server control panel client
//!
//! CLI entry point for issuing coordinated requests.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use postback::cli::{Cli, Command, parse_param};
use postback::config::Config;
use postback::coordinator::{CallError, Outcome, handler};
use postback::rpc::RpcProxy;
use postback::session::{Running, Session};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("postback")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("postback.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.server.base_url = base_url;
    }

    info!(
        "Postback loaded config: base-url={}, contact-timeout-ms={}",
        config.server.base_url, config.coordinator.contact_timeout_ms
    );

    let session = Session::connect(config)?;

    match cli.command {
        Command::Get { paths } => cmd_get(&session, &paths).await,
        Command::Poll {
            path,
            interval_ms,
            count,
        } => cmd_poll(&session, &path, Duration::from_millis(interval_ms), count).await,
        Command::Rpc { method, params } => cmd_rpc(&session, &method, &params).await,
    }
}

/// Fetch every path through one coordinator and print the answers in order
async fn cmd_get(session: &Session, paths: &[String]) -> Result<()> {
    let running = session.start()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome)>();

    for (index, path) in paths.iter().enumerate() {
        let target = session.config().server.target(path)?;
        let tx = tx.clone();
        running.handle.submit(
            target,
            handler(move |_, outcome| {
                let _ = tx.send((index, outcome.clone()));
            }),
        )?;
    }
    drop(tx);

    let mut outcomes: Vec<Option<Outcome>> = vec![None; paths.len()];
    let mut received = 0;
    // Channel closes early if the coordinator reloads with calls still queued
    while received < paths.len()
        && let Some((index, outcome)) = rx.recv().await
    {
        outcomes[index] = Some(outcome);
        received += 1;
    }

    let mut failures = 0;
    for (path, outcome) in paths.iter().zip(outcomes) {
        match outcome {
            Some(Ok(response)) => {
                println!("==> {} ({})", path, response.status);
                println!("{}", response.text());
            }
            Some(Err(err)) => {
                failures += 1;
                eprintln!("==> {}: {}", path, err);
            }
            None => {
                failures += 1;
                eprintln!("==> {}: {}", path, CallError::Shutdown);
            }
        }
    }

    log_metrics(&running).await;
    if let Some(reason) = running.finish().await? {
        warn!(%reason, "Coordinator reloaded during get");
    }

    if failures > 0 {
        return Err(eyre!("{} of {} requests failed", failures, paths.len()));
    }
    Ok(())
}

/// Poll one path, restarting the coordinator whenever contact is lost
async fn cmd_poll(session: &Session, path: &str, interval: Duration, count: Option<u32>) -> Result<()> {
    let mut running = session.start()?;
    let mut answered = 0u32;

    loop {
        // Cache-busting query so intermediaries never serve a stale status
        let target = session
            .config()
            .server
            .target(path)?
            .with_query(&[("d", Uuid::now_v7().to_string())]);

        match running.handle.call(target).await {
            Ok(response) => {
                answered += 1;
                println!("{}", response.text());
            }
            Err(CallError::ContactLost | CallError::Shutdown) => {
                eprintln!("Lost contact with {}, waiting for reload", session.config().server.base_url);
                let reason = running.wait().await?;
                info!(?reason, generation = session.generation(), "Restarting coordinator");
                running = session.start()?;
                continue;
            }
            Err(err) => eprintln!("Poll failed: {}", err),
        }

        if count.is_some_and(|limit| answered >= limit) {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    log_metrics(&running).await;
    running.finish().await?;
    Ok(())
}

/// Make one JSON-RPC call and pretty-print the result
async fn cmd_rpc(session: &Session, method: &str, params: &[String]) -> Result<()> {
    let proxy = RpcProxy::from_config(&session.config().server)?;
    let params = params.iter().map(|p| parse_param(p)).collect();

    let running = session.start()?;
    let result = proxy.call(&running.handle, method, params).await;
    running.finish().await?;

    let value = result.context(format!("RPC call {} to {} failed", method, proxy.url()))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn log_metrics(running: &Running) {
    match running.handle.metrics().await {
        Ok(metrics) => info!(?metrics, "Coordinator metrics"),
        Err(e) => warn!("Failed to read coordinator metrics: {}", e),
    }
}
