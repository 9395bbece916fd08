//! Text command submission and result polling.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use super::error::ApiError;
use super::routes::AppState;
use super::types::SubmitTaskResponse;
use crate::task::{TaskRecord, TaskStatus};
use crate::util::preview;

/// Accept a free-text travel command for background extraction.
pub async fn process_text_command(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(body) = payload?;
    let text = validate_text(&body)?;

    tracing::debug!(text = preview(&text, 80), "Text command received");

    let task_id = state.executor.submit(text).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            message: "Task accepted for processing".to_string(),
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

/// Return the current record of a task.
pub async fn get_command_result(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    // An id that is not a UUID cannot name any task.
    let task_id = Uuid::parse_str(task_id.trim())
        .map_err(|_| ApiError::NotFound(format!("Task {} not found", task_id)))?;

    let record = state
        .executor
        .store()
        .get(task_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(record))
}

/// Pull the `text` field out of a submission body.
///
/// The text is returned verbatim; only blank strings are rejected.
fn validate_text(body: &Value) -> Result<String, ApiError> {
    let object = body
        .as_object()
        .ok_or_else(|| ApiError::validation("Request body must be a JSON object", "malformed_body"))?;

    match object.get("text") {
        None | Some(Value::Null) => Err(ApiError::validation(
            "Missing required field: text",
            "missing_field",
        )),
        Some(Value::String(text)) if text.trim().is_empty() => Err(ApiError::validation(
            "Field 'text' must not be empty",
            "empty_text",
        )),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(ApiError::validation(
            "Field 'text' must be a string",
            "wrong_type",
        )),
    }
}
