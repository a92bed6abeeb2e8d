use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lxc_scheduler::agent::HttpAgentClient;
use lxc_scheduler::config::Config;
use lxc_scheduler::load::PrometheusMetricsSource;
use lxc_scheduler::scheduler::Scheduler;
use lxc_scheduler::AppState;

#[derive(Parser, Debug)]
#[command(name = "lxc-scheduler")]
#[command(author, version, about = "Places LXC containers on the least-loaded LXD host", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "LXC_SCHEDULER_CONFIG", default_value = "lxc-scheduler.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the API listen port
    #[arg(short, long, env = "LXC_SCHEDULER_PORT")]
    port: Option<u16>,

    /// Override the database file path
    #[arg(short, long, env = "LXC_SCHEDULER_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.api_port = port;
    }
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lxc-scheduler v{}", env!("CARGO_PKG_VERSION"));

    let db = lxc_scheduler::db::init(&config.database).await?;

    let metrics_source = PrometheusMetricsSource::new(&config.metrics)
        .context("Failed to build metrics client")?;
    let agent = HttpAgentClient::from_config(&config.agent).context("Failed to build agent client")?;

    if config.agent.dispatch {
        tracing::info!(port = config.agent.port, "Dispatching container operations to host agents");
    } else {
        tracing::info!("Agent dispatch disabled, recording intent only");
    }

    let scheduler = Scheduler::new(
        db.clone(),
        Arc::new(metrics_source),
        Arc::new(agent),
        config.agent.clone(),
    );

    let metrics_handle = lxc_scheduler::api::metrics::init_metrics()?;
    let state = Arc::new(AppState::new(config.clone(), scheduler).with_metrics(metrics_handle));

    let app = lxc_scheduler::api::create_router(state);

    // Start API server
    let api_addr = config.server.listen_addr();
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
