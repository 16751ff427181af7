use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod app;
mod config;
mod db;
mod error;
mod models;
mod source;
mod supervisor;
mod workers;

#[cfg(test)]
mod testing;

use app::App;
use config::Config;
use error::{AppError, Result};

const USAGE: &str = "Usage: comment-tracker [--config PATH] [--workers N]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info and above unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    // Load configuration
    let config_path = flag_value(&args, "--config")?.map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;

    // Check for --workers override
    if let Some(workers) = flag_value(&args, "--workers")? {
        config.worker_count = workers
            .parse()
            .map_err(|_| AppError::Config(format!("invalid --workers value: {workers}")))?;
        config.validate()?;
    }

    info!(
        workers = config.worker_count,
        db = %config.db_path,
        "Starting monitor of comment stream"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let report = App::new(config)?.run(shutdown).await?;
    info!(
        restarts = report.restarts,
        aborted = report.aborted,
        "All units stopped, exiting"
    );

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    args.get(pos + 1)
        .map(|v| Some(v.as_str()))
        .ok_or_else(|| AppError::Config(format!("{flag} needs a value\n{USAGE}")))
}

/// Cancels `shutdown` on Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Keyboard interrupt (Ctrl-C) received, ending units and exiting"),
        _ = terminate => info!("Terminate signal received, ending units and exiting"),
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reads_flag_values() {
        let argv = args(&["comment-tracker", "--workers", "5", "--config", "/tmp/c.toml"]);
        assert_eq!(flag_value(&argv, "--workers").unwrap(), Some("5"));
        assert_eq!(flag_value(&argv, "--config").unwrap(), Some("/tmp/c.toml"));
        assert_eq!(flag_value(&argv, "--other").unwrap(), None);
    }

    #[test]
    fn flag_without_value_is_an_error() {
        let argv = args(&["comment-tracker", "--workers"]);
        assert!(matches!(flag_value(&argv, "--workers"), Err(AppError::Config(_))));
    }
}
