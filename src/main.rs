use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymflow::api::rate_limit::spawn_cleanup_task;
use gymflow::config::Config;
use gymflow::engine::{OutboxSettings, OutboxWorker};
use gymflow::identity::HttpIdentityProvider;
use gymflow::notifications::NotificationSenders;
use gymflow::startup::run_startup_checks;
use gymflow::AppState;

#[derive(Parser, Debug)]
#[command(name = "gymflow")]
#[command(author, version, about = "Gym management backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "GYMFLOW_CONFIG", default_value = "gymflow.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

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

    tracing::info!("Starting Gymflow v{}", env!("CARGO_PKG_VERSION"));

    gymflow::utils::ensure_dir(&config.server.data_dir)?;

    let db = gymflow::db::init(&config.server.data_dir).await?;

    if config.demo.enabled {
        gymflow::db::seed_demo_data(&db, &config.demo).await?;
        tracing::warn!(
            coach_id = %config.demo.coach_id,
            "Demo mode enabled: unauthenticated requests act as the demo coach"
        );
    }

    let report = run_startup_checks(&config, &db).await;
    if !report.all_critical_passed {
        anyhow::bail!("Startup checks failed: {}", report.summary);
    }

    let notifiers = Arc::new(NotificationSenders::from_config(&config.notifications)?);

    let mut state = AppState::new(config.clone(), db.clone(), notifiers.clone());
    if let Some(provider) = HttpIdentityProvider::from_config(&config.identity)? {
        state = state.with_identity(Arc::new(provider));
    }
    let state = Arc::new(state);

    let shutdown = CancellationToken::new();

    let outbox = OutboxWorker::new(
        db.clone(),
        notifiers,
        OutboxSettings::from(&config.notifications),
        state.outbox_wake.clone(),
        shutdown.clone(),
    );
    let outbox_handle = tokio::spawn(outbox.run());

    let cleanup_handle = spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
        shutdown.clone(),
    );

    let app = gymflow::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = outbox_handle.await;
    let _ = cleanup_handle.await;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
