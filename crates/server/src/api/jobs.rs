//! Job run API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use seatbatch_core::{
    JobError, JobRun, JobRunFilter, JobStatus, JobStatusReport, LaunchKind, LaunchRequest,
};

use crate::state::AppState;

/// Maximum allowed limit for job run queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job run queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for launching a job run
#[derive(Debug, Default, Deserialize)]
pub struct LaunchParams {
    /// Block until the run settles and return its final status
    #[serde(default)]
    pub wait: bool,
}

/// Query parameters for listing job runs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub concert_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for an accepted launch
#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub job_run_id: String,
    pub kind: LaunchKind,
    /// Final state, present when the launch waited for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<JobStatusReport>,
}

/// Response for listing job runs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobRun>,
    pub limit: i64,
    pub offset: i64,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map orchestrator errors to HTTP responses.
pub fn job_error_response(err: JobError) -> ApiError {
    let status = match &err {
        JobError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
        JobError::JobNotFound(_) => StatusCode::NOT_FOUND,
        JobError::JobAlreadyRunning { .. }
        | JobError::JobAlreadyComplete { .. }
        | JobError::NotRunning { .. } => StatusCode::CONFLICT,
        JobError::VerificationFailed { .. }
        | JobError::Store(_)
        | JobError::Catalog(_)
        | JobError::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Launch, resume, or verify a job run
pub async fn launch_job(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LaunchParams>,
    Json(request): Json<LaunchRequest>,
) -> Result<(StatusCode, Json<LaunchResponse>), ApiError> {
    let orchestrator = state.orchestrator();
    let launched = orchestrator
        .launch(request)
        .await
        .map_err(job_error_response)?;

    if launched.kind == LaunchKind::Verified {
        return Ok((
            StatusCode::OK,
            Json(LaunchResponse {
                job_run_id: launched.job_run_id,
                kind: launched.kind,
                report: None,
            }),
        ));
    }

    if params.wait {
        let report = orchestrator
            .wait(&launched.job_run_id)
            .await
            .map_err(job_error_response)?;
        return Ok((
            StatusCode::OK,
            Json(LaunchResponse {
                job_run_id: launched.job_run_id,
                kind: launched.kind,
                report: Some(report),
            }),
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(LaunchResponse {
            job_run_id: launched.job_run_id,
            kind: launched.kind,
            report: None,
        }),
    ))
}

/// List job runs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobRunFilter::new().with_limit(limit).with_offset(offset);
    if let Some(status) = params.status.as_deref() {
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, e))?;
        filter = filter.with_status(status);
    }
    if let Some(concert_id) = params.concert_id {
        filter = filter.with_concert(concert_id);
    }

    let jobs = state
        .orchestrator()
        .list_runs(&filter)
        .map_err(job_error_response)?;

    Ok(Json(ListJobsResponse {
        jobs,
        limit,
        offset,
    }))
}

/// Get a job run with its partitions
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusReport>, ApiError> {
    state
        .orchestrator()
        .status(&id)
        .await
        .map(Json)
        .map_err(job_error_response)
}

/// Request cancellation of an executing job run
pub async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .orchestrator()
        .stop(&id)
        .await
        .map_err(job_error_response)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Stop requested for job run {}", id),
        }),
    ))
}
