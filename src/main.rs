use std::{path::Path, time::Duration};

use clap::Parser;
use sweeper::{
    AppState, build_app,
    config::{self, SweeperConfig},
    observability,
    session::start_session_cleanup_worker,
};
use tokio_util::task::TaskTracker;

/// How long shutdown waits for in-flight deletion runs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const DEFAULT_CONFIG_PATH: &str = "sweeper.toml";

/// CLI arguments for Sweeper
#[derive(Parser, Debug)]
#[command(version, about = "Bulk-delete low-engagement posts", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./sweeper.toml; if that does not exist
    /// a built-in config driven by TWITTER_KEY, TWITTER_SECRET and PORT is used)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the web server (default)
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => run_check_config(args.config.as_deref()),
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

/// Load the config from an explicit path, `./sweeper.toml`, or the built-in
/// default, in that order. Exits the process on failure.
fn load_config(explicit_path: Option<&str>) -> SweeperConfig {
    let result = match explicit_path {
        Some(path) => SweeperConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            SweeperConfig::from_file(DEFAULT_CONFIG_PATH)
        }
        None => SweeperConfig::from_str(config::default_config_toml()),
    };

    match result {
        Ok(config) => config,
        Err(e) => {
            let source = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);
            eprintln!("Failed to load config ({source}): {e}");
            std::process::exit(1);
        }
    }
}

fn run_check_config(explicit_path: Option<&str>) {
    let config = load_config(explicit_path);

    println!("Configuration OK");
    println!("  listen:       {}", config.server.display_url());
    println!("  callback:     {}", config.twitter.callback_url);
    println!("  api base:     {}", config.twitter.api_base_url);
    println!(
        "  page size:    {} (max pages: {})",
        config.sweep.page_size,
        match config.sweep.page_limit() {
            Some(limit) => limit.to_string(),
            None => "unlimited".to_string(),
        }
    );
    println!("  dry run:      {}", config.sweep.dry_run);
    println!("  wait for run: {}", config.sweep.wait_for_deletions);
}

async fn run_server(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);

    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    let bind_addr = config.server.bind_addr();
    let display_url = config.server.display_url();
    let cleanup_interval = config.session.cleanup_interval();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application");
            std::process::exit(1);
        }
    };

    let cleanup = tokio::spawn(start_session_cleanup_worker(
        state.sessions.clone(),
        cleanup_interval,
    ));

    let task_tracker = state.task_tracker.clone();
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(address = %bind_addr, "Server listening on {display_url}");

    // Graceful shutdown: wait for SIGINT/SIGTERM, then wait for deletion runs
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker))
        .await
        .expect("Server error");

    cleanup.abort();
}

async fn shutdown_signal(task_tracker: TaskTracker) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        in_flight = task_tracker.len(),
        "Shutdown signal received, waiting for deletion runs to complete..."
    );

    // `wait` only resolves once the tracker is closed
    task_tracker.close();

    match tokio::time::timeout(SHUTDOWN_GRACE, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All deletion runs completed"),
        Err(_) => tracing::warn!("Timeout waiting for deletion runs, some were cut short"),
    }

    tracing::info!("Shutdown complete");
}
