use drive_broker::{
    cron, routes,
    state::AppState,
    telemetry::{setup_sentry, setup_tracing, DEFAULT_LOG_FILTER},
};
use std::path::Path;

use tracing::info;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Initialize Sentry for error tracking
    let _sentry_guard = init_error_reporting(None);

    // Create and run the tokio runtime
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?
        .block_on(async { run_application().await })
}

/// Load `.env` (or `env_file`) first so a `SENTRY_DSN` kept there is seen.
fn init_error_reporting(env_file: Option<&Path>) -> Option<sentry::ClientInitGuard> {
    match env_file {
        Some(path) => dotenv::from_path(path).ok(),
        None => dotenv::dotenv().ok().map(|_| ()),
    };
    setup_sentry()
}

async fn run_application() -> color_eyre::Result<()> {
    setup_tracing(DEFAULT_LOG_FILTER)?;

    let app_state = AppState::from_env()?;

    // Spawn application tasks
    info!("Spawning application tasks");
    let futures = spawn_application_tasks(app_state);

    // Wait for all tasks to complete
    for result in futures::future::try_join_all(futures).await? {
        result?;
    }

    Ok(())
}

/// Spawn all application background tasks
fn spawn_application_tasks(
    app_state: AppState,
) -> Vec<tokio::task::JoinHandle<color_eyre::Result<()>>> {
    let mut futures = vec![];

    if is_feature_enabled("SERVER") {
        info!(addr = %app_state.settings.bind_addr(), "Server Enabled");
        futures.push(tokio::spawn(routes::run_server(app_state.clone())));
    } else {
        info!("Server Disabled");
    }

    // Sweeps abandoned authorization attempts
    if is_feature_enabled("CRON") {
        info!("Cron Enabled");
        futures.push(tokio::spawn(cron::run_cron(app_state.clone())));
    } else {
        info!("Cron Disabled");
    }

    info!("All application tasks spawned successfully");
    futures
}

/// Check if a feature is enabled based on environment variables
fn is_feature_enabled(feature: &str) -> bool {
    std::env::var(format!("{}_DISABLED", feature)).unwrap_or_else(|_| "false".to_string()) != "true"
}
