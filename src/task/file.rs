//! JSON file-based task store.
//!
//! Each task lives in `<dir>/<task_id>.json`. Writes go to a uniquely named
//! temp file in the same directory and are then moved into place, so a
//! concurrent reader sees either the old record or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::{StoreError, TaskRecord, TaskStore, TaskStoreType, TaskUpdate};

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub async fn new(dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::Io(format!(
                "Failed to create task results dir {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", task_id))
    }

    fn temp_path(&self, task_id: Uuid) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", task_id, Uuid::new_v4().simple()))
    }

    async fn write_temp(&self, record: &TaskRecord) -> Result<PathBuf, StoreError> {
        let data = serde_json::to_vec_pretty(record).map_err(|e| {
            StoreError::Io(format!("Failed to serialize task {}: {}", record.task_id, e))
        })?;
        let tmp_path = self.temp_path(record.task_id);
        fs::write(&tmp_path, data).await.map_err(|e| {
            StoreError::Io(format!("Failed to write task {}: {}", record.task_id, e))
        })?;
        Ok(tmp_path)
    }

    async fn read_record(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
        let path = self.record_path(task_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(task_id))
            }
            Err(err) => {
                return Err(StoreError::Io(format!(
                    "Failed to read task {}: {}",
                    task_id, err
                )))
            }
        };

        let record: TaskRecord = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse task record");
            StoreError::Corrupted {
                task_id,
                reason: format!("invalid JSON: {}", e),
            }
        })?;

        if record.task_id != task_id {
            return Err(StoreError::Corrupted {
                task_id,
                reason: format!("file holds task {}", record.task_id),
            });
        }
        record
            .validate()
            .map_err(|reason| StoreError::Corrupted { task_id, reason })?;
        Ok(record)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    fn kind(&self) -> TaskStoreType {
        TaskStoreType::File
    }

    async fn create(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord::pending(task_id);
        let tmp_path = self.write_temp(&record).await?;

        // A hard link fails if the target exists, which makes creation both
        // atomic and exclusive.
        let linked = fs::hard_link(&tmp_path, self.record_path(task_id)).await;
        if let Err(e) = fs::remove_file(&tmp_path).await {
            tracing::debug!(path = %tmp_path.display(), error = %e, "Failed to remove temp file");
        }

        match linked {
            Ok(()) => Ok(record),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(task_id))
            }
            Err(err) => Err(StoreError::Io(format!(
                "Failed to create task {}: {}",
                task_id, err
            ))),
        }
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
        self.read_record(task_id).await
    }

    async fn update(&self, task_id: Uuid, update: TaskUpdate) -> Result<TaskRecord, StoreError> {
        let mut record = self.read_record(task_id).await?;
        record.apply(update)?;

        let tmp_path = self.write_temp(&record).await?;
        if let Err(err) = fs::rename(&tmp_path, self.record_path(task_id)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(format!(
                "Failed to finalize task {}: {}",
                task_id, err
            )));
        }
        Ok(record)
    }
}
