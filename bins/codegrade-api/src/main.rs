mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use chrono::{DateTime, Utc};
use codegrade_common::config::EvaluatorConfig;
use codegrade_common::problems::{ProblemRegistry, DEFAULT_PROBLEMS_DIR};
use codegrade_engine::Evaluator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub evaluator: Evaluator,
    pub problems: ProblemRegistry,
    pub started_at: DateTime<Utc>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // LOG_FORMAT=json for log shippers, plain text otherwise
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Codegrade API booting...");

    let config = EvaluatorConfig::load_from_env()?;
    let evaluator = Evaluator::from_config(&config).context("Failed to initialise sandbox")?;

    let problems_dir = std::env::var("PROBLEMS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROBLEMS_DIR));
    let problems = ProblemRegistry::load_dir(&problems_dir)?;

    info!(
        backend = evaluator.backend_name(),
        problems = problems.len(),
        "Evaluator ready"
    );

    let state = Arc::new(AppState {
        evaluator,
        problems,
        started_at: Utc::now(),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
