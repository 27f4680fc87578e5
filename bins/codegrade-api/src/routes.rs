use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/problems", get(handlers::list_problems))
        .route("/problems/:id", get(handlers::get_problem))
        .route("/evaluate", post(handlers::evaluate))
        .route("/metrics", get(handlers::export_metrics))
}
