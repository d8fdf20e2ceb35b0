mod config;
mod database;
mod monitoring;
mod pool;
mod web;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::{Database, open_database};
use crate::monitoring::{HttpNotifier, ProbeExecutor, Scheduler, StateChangeDetector};
use crate::web::AppState;
use crate::web::remote::RemoteChecks;

#[derive(Debug, Parser)]
#[command(name = "srvmon", version, about = "Host availability monitor")]
struct Cli {
    /// Config file path, created with defaults when missing
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Inline TOML configuration, takes precedence over --config
    #[arg(long, value_name = "TOML")]
    confstr: Option<String>,

    /// Probe one target, report the result and exit
    #[arg(long, value_name = "TARGET")]
    check: Option<String>,

    /// Open the configured database, run migrations and exit
    #[arg(long)]
    init: bool,
}

fn build_executor(checks: &config::Checks) -> anyhow::Result<ProbeExecutor> {
    ProbeExecutor::new(checks.timeout_secs, &checks.http_method, checks.ping_retry_count)
}

fn shared_credentials(auth: &config::Auth) -> Option<(String, String)> {
    auth.enabled.then(|| (auth.username.clone(), auth.password.clone()))
}

#[actix_web::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logger::init();

    let config = match &cli.confstr {
        Some(raw) => Config::from_toml_str(raw)?,
        None => Config::from_config(cli.config.as_ref())?,
    };
    debug!("{config}");

    if let Some(target) = &cli.check {
        return single_check(&config, target).await;
    }

    let database =
        open_database(&config.database).await.context("failed to open database")?;
    if cli.init {
        info!("Database schema initialized");
        return Ok(ExitCode::SUCCESS);
    }

    serve(config, database).await?;
    Ok(ExitCode::SUCCESS)
}

/// One-shot probe for the --check flag. Exit status reflects the result;
/// nothing is persisted.
async fn single_check(config: &Config, target: &str) -> anyhow::Result<ExitCode> {
    let executor = build_executor(&config.checks)?;
    let outcome = executor.dispatch(target).await;

    if let Some(err) = &outcome.error {
        error!("Check of {target} failed: {err}");
    }
    info!("Up: {}, rtt: {}ns", outcome.up, outcome.rtt);

    Ok(if outcome.up { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn serve(config: Config, database: Arc<dyn Database>) -> anyhow::Result<()> {
    let executor = Arc::new(build_executor(&config.checks)?);
    let notifier = Arc::new(HttpNotifier::new(shared_credentials(&config.auth))?);
    let detector = Arc::new(StateChangeDetector::new(Arc::clone(&database), notifier));

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        Arc::clone(&database),
        Arc::clone(&executor),
        detector,
        &config.checks,
        shutdown.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let remote = RemoteChecks::new(&config.web, &config.auth, config.checks.timeout_secs)?;
    let state = Data::new(AppState { database, executor, remote, config: config.clone() });

    let server = HttpServer::new({
        let state = state.clone();
        move || App::new().app_data(state.clone()).configure(web::routes)
    })
    .client_request_timeout(Duration::from_secs(config.listen.read_timeout_secs))
    .disable_signals()
    .bind((config.listen.address.as_str(), config.listen.port))
    .with_context(|| {
        format!("failed to bind {}:{}", config.listen.address, config.listen.port)
    })?
    .run();

    let server_handle = server.handle();
    let mut server_task = tokio::spawn(server);
    info!("Listening on {}:{}", config.listen.address, config.listen.port);

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
        _ = sigterm.recv() => info!("Termination signal received, shutting down"),
        result = &mut server_task => {
            shutdown.cancel();
            let _ = scheduler_task.await;
            result?.context("http server failed")?;
            return Ok(());
        }
    }

    // Stop scheduling, drain in-flight checks, then close the listener.
    shutdown.cancel();
    let _ = scheduler_task.await;
    server_handle.stop(true).await;
    server_task.await?.context("http server failed")?;

    Ok(())
}
