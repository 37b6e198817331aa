mod auth;
mod catalog;
mod cli;
mod routes;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use cluster_proto::Solver;
use coordinator_core::ClusterState;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::CatalogEntry;
use crate::cli::Cli;

/// Shared, `Clone`-able handle every handler extracts via `State<AppState>`.
/// Cheap to clone: everything behind it is an `Arc` or small config value.
#[derive(Clone)]
pub struct AppState {
    cluster: Arc<Mutex<ClusterState>>,
    worker_token: Arc<str>,
    console_user: Arc<str>,
    console_pass: Arc<str>,
    assets_dir: Arc<PathBuf>,
    catalog: Arc<Vec<CatalogEntry>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let catalog =
        catalog::load(&cli.solvers_dir).context("failed to load solver catalog directory")?;
    info!(count = catalog.len(), dir = %cli.solvers_dir.display(), "loaded solver catalog");

    // Default to the first catalog entry, mirroring the source's startup
    // bootstrap; the cluster still starts `stopped` until an operator
    // issues `run`.
    let cluster = match catalog.first() {
        Some(entry) => {
            let solver = Solver::parse(&entry.text).context("default solver failed to parse")?;
            ClusterState::bootstrap(solver)
        }
        None => ClusterState::new(),
    };

    let state = AppState {
        cluster: Arc::new(Mutex::new(cluster)),
        worker_token: Arc::from(cli.worker_token.as_str()),
        console_user: Arc::from(cli.console_user.as_str()),
        console_pass: Arc::from(cli.console_pass.as_str()),
        assets_dir: Arc::new(cli.assets_dir.clone()),
        catalog: Arc::new(catalog),
    };

    let app = Router::new()
        .route("/worker/status", post(routes::worker_status))
        .route("/console_update", post(routes::console_update))
        .route("/", get(routes::index))
        .route("/view.js", get(routes::view_js))
        .route("/style.css", get(routes::style_css))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(bind = %cli.bind, "coordinator listening");

    axum::serve(listener, app).await.context("http server error")?;
    Ok(())
}
