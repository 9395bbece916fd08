//! API request and response types.

use serde::Serialize;
use uuid::Uuid;

use crate::task::TaskStatus;

/// Response after accepting a text command.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitTaskResponse {
    pub message: String,

    /// Identifier to poll with
    pub task_id: Uuid,

    /// Always `pending` at submission
    pub status: TaskStatus,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub version: String,
    pub service: String,
}

/// Non-sensitive configuration summary.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigInfoResponse {
    pub environment: String,
    pub debug_mode: bool,
    pub cors_origins: Vec<String>,
    pub llm: LlmInfo,
    pub tasks: TaskInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmInfo {
    pub model: String,
    pub timeout_secs: u64,
    /// Whether a credential is present; the key itself is never returned
    pub credential_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub store: String,
    pub max_concurrent: usize,
    pub max_queued: usize,
    pub outstanding: usize,
}
