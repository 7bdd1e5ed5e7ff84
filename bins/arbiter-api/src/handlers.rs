// HTTP route handlers for the Arbiter API

use arbiter_common::redis;
use arbiter_common::types::{GradeRequest, SubmissionRecord, Verdict};
use arbiter_engine::GradeError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics::{self, InflightGuard};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: Uuid,
    pub verdict: Verdict,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageInfo {
    pub language: String,
    pub version: String,
    pub default_entry_point: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// HTTP status and metric label for a submission that produced no verdict
pub fn rejection(e: &GradeError) -> (StatusCode, &'static str) {
    match e {
        GradeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        GradeError::UnsupportedLanguage(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_language"),
        GradeError::NoTestCases => (StatusCode::INTERNAL_SERVER_ERROR, "no_test_cases"),
        GradeError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
        GradeError::Catalog(_) | GradeError::Aggregate(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

/// POST /submit - Grade a submission against a catalog problem
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GradeRequest>,
) -> Response {
    let _inflight = InflightGuard::enter();
    let start = Instant::now();

    let result = state.grader.grade_request(&request, &state.catalog).await;
    metrics::GRADING_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

    let verdict = match result {
        Ok(verdict) => verdict,
        Err(e) => {
            let (status, reason) = rejection(&e);
            metrics::REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
            warn!(
                problem_id = %request.problem_id,
                language = %request.language,
                error = %e,
                "Submission rejected"
            );
            return error_response(status, e.to_string());
        }
    };

    metrics::SUBMISSIONS_TOTAL
        .with_label_values(&[verdict.overall_status.as_str()])
        .inc();

    let record = SubmissionRecord::new(&request, verdict);
    info!(
        submission_id = %record.id,
        problem_id = %record.problem_id,
        language = %record.language,
        status = %record.status,
        runtime_ms = record.runtime_millis,
        "Submission graded"
    );

    // A failed write is logged but never turns a verdict into an error
    if let Some(conn) = &state.redis {
        let mut conn = conn.clone();
        if let Err(e) = redis::store_record(&mut conn, &record).await {
            error!(submission_id = %record.id, error = %e, "Failed to store submission record");
        }
    }

    (
        StatusCode::OK,
        Json(SubmitResponse {
            submission_id: record.id,
            verdict: record.verdict,
        }),
    )
        .into_response()
}

/// GET /submissions/{submission_id} - Fetch a stored submission record
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Response {
    let submission_uuid = match Uuid::parse_str(&submission_id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format"),
    };

    let Some(conn) = &state.redis else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "No submission store configured",
        );
    };

    let mut conn = conn.clone();
    match redis::get_record(&mut conn, &submission_uuid).await {
        Ok(Some(record)) => {
            info!(submission_id = %submission_id, status = %record.status, "Submission record retrieved");
            (StatusCode::OK, Json(record)).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Submission not found"),
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Failed to fetch submission record");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query submission: {}", e),
            )
        }
    }
}

/// GET /languages - Gradable languages
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages = state.grader.harness().languages();
    let body: Vec<LanguageInfo> = state
        .grader
        .supported_languages()
        .into_iter()
        .filter_map(|lang| languages.get_config(&lang).ok().map(|config| (lang, config)))
        .map(|(lang, config)| LanguageInfo {
            language: lang.to_string(),
            version: config.version.clone(),
            default_entry_point: config.default_entry_point.clone(),
        })
        .collect();

    Json(body)
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
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
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
