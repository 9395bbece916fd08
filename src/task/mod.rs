//! Task records and their storage backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `file`: one JSON file per task, replaced atomically on every write
//!
//! A record moves forward only: `pending -> processing -> completed | failed`
//! (a task that dies before starting may go straight to `failed`). A result
//! is present exactly when the task completed, an error exactly when it
//! failed.

mod executor;
mod file;
mod memory;

pub use executor::{ExecutorLimits, SubmitError, TaskExecutor};
pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, TaskConfig};
use crate::extraction::ExtractionOutcome;

/// Task status enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// The upstream call is in flight
    Processing,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a record may move from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Error category, e.g. `UpstreamError`
    pub kind: String,
    /// Human-readable summary
    pub message: String,
    /// Stringified underlying cause
    pub details: String,
}

impl ErrorDescriptor {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            details: details.into(),
        }
    }
}

/// The persisted state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub result: Option<ExtractionOutcome>,
    pub error: Option<ErrorDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A state change applied to an existing record.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Processing,
    Completed(ExtractionOutcome),
    Failed(ErrorDescriptor),
}

impl TaskUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Processing => TaskStatus::Processing,
            TaskUpdate::Completed(_) => TaskStatus::Completed,
            TaskUpdate::Failed(_) => TaskStatus::Failed,
        }
    }
}

impl TaskRecord {
    /// A fresh pending record.
    pub fn pending(task_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `update`, rejecting backward or repeated transitions.
    pub fn apply(&mut self, update: TaskUpdate) -> Result<(), StoreError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                task_id: self.task_id,
                from: self.status,
                to: next,
            });
        }
        let (result, error) = match update {
            TaskUpdate::Processing => (None, None),
            TaskUpdate::Completed(outcome) => (Some(outcome), None),
            TaskUpdate::Failed(descriptor) => (None, Some(descriptor)),
        };
        self.status = next;
        self.result = result;
        self.error = error;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the result/error presence rules for the current status.
    pub fn validate(&self) -> Result<(), String> {
        match (self.status, self.result.is_some(), self.error.is_some()) {
            (TaskStatus::Pending | TaskStatus::Processing, false, false) => Ok(()),
            (TaskStatus::Completed, true, false) => Ok(()),
            (TaskStatus::Failed, false, true) => Ok(()),
            (status, has_result, has_error) => Err(format!(
                "status {} with result present={} and error present={}",
                status, has_result, has_error
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Task {0} not found")]
    NotFound(Uuid),

    #[error("Task {task_id} record is corrupted: {reason}")]
    Corrupted { task_id: Uuid, reason: String },

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task storage I/O error: {0}")]
    Io(String),
}

/// Task store trait - implemented by all storage backends.
///
/// Every method is atomic per record: a reader never observes a partially
/// written record. Records of different tasks are independent.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> TaskStoreType;

    /// Create a pending record; fails with `AlreadyExists` for a known id.
    async fn create(&self, task_id: Uuid) -> Result<TaskRecord, StoreError>;

    /// Read a record.
    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, StoreError>;

    /// Apply a state change and return the updated record.
    async fn update(&self, task_id: Uuid, update: TaskUpdate) -> Result<TaskRecord, StoreError>;
}

/// Task store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStoreType {
    Memory,
    #[default]
    File,
}

impl TaskStoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStoreType::Memory => "memory",
            TaskStoreType::File => "file",
        }
    }
}

impl FromStr for TaskStoreType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            other => Err(ConfigError::InvalidValue(
                "TASK_STORE".to_string(),
                format!("unknown store '{}'", other),
            )),
        }
    }
}

/// Create a task store based on configuration.
pub async fn create_task_store(config: &TaskConfig) -> Result<Arc<dyn TaskStore>, StoreError> {
    match config.store_type {
        TaskStoreType::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
        TaskStoreType::File => {
            let store = FileTaskStore::new(config.results_dir.clone()).await?;
            tracing::debug!(dir = %store.dir().display(), "Opened file task store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionResult;

    #[test]
    fn transitions_only_move_forward() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
        for terminal in [Completed, Failed] {
            for next in [Pending, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn apply_keeps_result_and_error_exclusive() {
        let mut record = TaskRecord::pending(Uuid::new_v4());
        record.validate().expect("pending is valid");

        record.apply(TaskUpdate::Processing).expect("start");
        assert!(record.result.is_none() && record.error.is_none());

        record
            .apply(TaskUpdate::Completed(ExtractionOutcome::Parsed(
                ExtractionResult::default(),
            )))
            .expect("complete");
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.result.is_some() && record.error.is_none());
        record.validate().expect("completed is valid");

        let err = record
            .apply(TaskUpdate::Failed(ErrorDescriptor::new("X", "y", "z")))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[test]
    fn validate_rejects_torn_records() {
        let mut record = TaskRecord::pending(Uuid::new_v4());
        record.status = TaskStatus::Completed;
        assert!(record.validate().is_err());

        record.status = TaskStatus::Processing;
        record.error = Some(ErrorDescriptor::new("X", "y", "z"));
        assert!(record.validate().is_err());
    }

    #[test]
    fn record_serializes_nulls_and_lowercase_status() {
        let record = TaskRecord::pending(Uuid::nil());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value["result"].is_null());
        assert!(value["error"].is_null());
        assert_eq!(value["task_id"], Uuid::nil().to_string());
    }

    #[test]
    fn factory_builds_the_configured_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TaskConfig {
            store_type: TaskStoreType::Memory,
            results_dir: dir.path().join("results"),
            ..TaskConfig::default()
        };
        let store = tokio_test::block_on(create_task_store(&config)).unwrap();
        assert_eq!(store.kind(), TaskStoreType::Memory);
        assert!(!config.results_dir.exists());

        config.store_type = TaskStoreType::File;
        let store = tokio_test::block_on(create_task_store(&config)).unwrap();
        assert_eq!(store.kind(), TaskStoreType::File);
        assert!(config.results_dir.is_dir());
    }

    #[test]
    fn store_type_parsing() {
        assert_eq!("memory".parse::<TaskStoreType>().unwrap(), TaskStoreType::Memory);
        assert_eq!(" FILE ".parse::<TaskStoreType>().unwrap(), TaskStoreType::File);
        assert!("redis".parse::<TaskStoreType>().is_err());
    }
}
