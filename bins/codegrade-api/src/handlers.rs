// HTTP route handlers for the Codegrade API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use codegrade_common::problems::ProblemSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default, alias = "problemId")]
    pub problem_id: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub problems: usize,
    pub uptime_seconds: i64,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(StatusResponse {
        status: "ok",
        backend: state.evaluator.backend_name(),
        problems: state.problems.len(),
        uptime_seconds: uptime.num_seconds(),
    })
}

/// GET /problems - Summaries only, never test case contents
pub async fn list_problems(State(state): State<Arc<AppState>>) -> Json<Vec<ProblemSummary>> {
    Json(state.problems.summaries())
}

/// GET /problems/:id - Problem with hidden cases stripped
pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.problems.get(&id) {
        Some(problem) => Json(problem.public_view()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Problem '{}' not found", id)),
    }
}

/// POST /evaluate - Run a full evaluation synchronously
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> Response {
    if payload.problem_id.trim().is_empty() || payload.code.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing problem_id or code");
    }

    let Some(problem) = state.problems.get(payload.problem_id.trim()) else {
        warn!(problem_id = %payload.problem_id, "Evaluation requested for unknown problem");
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Problem '{}' not found", payload.problem_id.trim()),
        );
    };

    let start = Instant::now();
    let report = state.evaluator.evaluate(&payload.code, problem).await;
    let elapsed = start.elapsed();

    metrics::record_evaluation(&report.grade, elapsed.as_secs_f64());
    info!(
        problem_id = %problem.id,
        evaluation_id = %report.evaluation_id,
        grade = %report.grade,
        execution_ms = elapsed.as_millis() as u64,
        "Evaluation served"
    );

    (StatusCode::OK, Json(report)).into_response()
}

/// GET /metrics - Prometheus text format
pub async fn export_metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}
