//! Watch task handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use watchpool_core::TaskId;

use crate::http::responses::{
    CreateTaskRequest, ErrorResponse, ListTasksQuery, ResizeQuery, ResizeResponse,
    StopTaskQuery, StopTaskResponse, TaskResponse,
};
use crate::pool::PoolError;
use crate::registry::OrchestratorError;
use crate::state::AppState;

/// Create a watch task and start its pool in the background.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    let delay = state.delay_or_default(req.delay_ms);
    match state
        .orchestrator
        .create_and_start(&req.target, req.count, delay)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(TaskResponse::from(record))).into_response(),
        Err(e) => error_response(e),
    }
}

/// List task records.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Response {
    match state.orchestrator.tasks(query.only_working).await {
        Ok(records) => {
            let body: Vec<TaskResponse> = records.into_iter().map(TaskResponse::from).collect();
            Json(body).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Fetch one task record.
pub async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Response {
    let task_id = TaskId::new(id);
    match state.orchestrator.task(task_id).await {
        Ok(Some(record)) => Json(TaskResponse::from(record)).into_response(),
        Ok(None) => error_response(OrchestratorError::NotFound(task_id)),
        Err(e) => error_response(e),
    }
}

/// Stop a task's pool and mark its record completed.
pub async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<StopTaskQuery>,
) -> Response {
    let task_id = TaskId::new(id);
    let delay = state.delay_or_default(query.delay_ms);
    match state.orchestrator.stop_by_task_id(task_id, delay).await {
        Ok(true) => Json(StopTaskResponse { id, stopped: true }).into_response(),
        Ok(false) => error_response(OrchestratorError::NotFound(task_id)),
        Err(e) => error_response(e),
    }
}

/// Add workers to a running task.
pub async fn increase_workers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<ResizeQuery>,
) -> Response {
    resize(&state, id, i64::from(query.count), query.delay_ms).await
}

/// Remove workers from a running task.
pub async fn decrease_workers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<ResizeQuery>,
) -> Response {
    resize(&state, id, -i64::from(query.count), query.delay_ms).await
}

async fn resize(state: &AppState, id: u64, delta: i64, delay_ms: Option<i64>) -> Response {
    let delay = state.delay_or_default(delay_ms);
    match state.orchestrator.resize(TaskId::new(id), delta, delay).await {
        Ok(changed) => {
            info!(task_id = id, delta, changed, "Resize request handled");
            Json(ResizeResponse { id, changed }).into_response()
        }
        Err(e) => error_response(e),
    }
}

fn error_response(err: OrchestratorError) -> Response {
    let status = match &err {
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Invalid(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Pool(PoolError::InvalidState { .. }) => StatusCode::CONFLICT,
        OrchestratorError::Pool(PoolError::TargetUnavailable { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OrchestratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(error = %err, status = status.as_u16(), "Request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
