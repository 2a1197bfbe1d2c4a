use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "chime-gateway", version, about = "Cron-driven HTTP job scheduler")]
struct Cli {
    /// Path to the TOML config file (overrides CHIME_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config flag > CHIME_CONFIG env > ~/.chime/chime.toml
    let config_path = cli.config.or_else(|| std::env::var("CHIME_CONFIG").ok());
    let config = chime_core::config::ChimeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        chime_core::config::ChimeConfig::default()
    });

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // run schema migrations (idempotent)
    chime_store::db::init_db(&db)?;
    info!("database migrations complete");

    // build subsystems, each on its own connection for thread safety
    let jobs = chime_store::JobStore::new(rusqlite::Connection::open(db_path)?);
    let executions = chime_store::ExecutionStore::new(rusqlite::Connection::open(db_path)?);

    let dispatcher = chime_scheduler::HttpDispatcher::new(&config.dispatch);
    let alerts = chime_scheduler::AlertLog::new();
    let scheduler = chime_scheduler::Scheduler::new(
        jobs.clone(),
        executions.clone(),
        dispatcher,
        alerts.clone(),
    );
    scheduler.load_active_jobs()?;

    let state = Arc::new(app::AppState::new(jobs, executions, scheduler, alerts));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Chime gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.shutdown();
    info!("shutdown complete");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives so the server can drain.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = ctrl_c.await;
        }
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
