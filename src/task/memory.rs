//! In-memory task store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, TaskRecord, TaskStore, TaskStoreType, TaskUpdate};

#[derive(Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn kind(&self) -> TaskStoreType {
        TaskStoreType::Memory
    }

    async fn create(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task_id) {
            return Err(StoreError::AlreadyExists(task_id));
        }
        let record = TaskRecord::pending(task_id);
        tasks.insert(task_id, record.clone());
        Ok(record)
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or(StoreError::NotFound(task_id))
    }

    async fn update(&self, task_id: Uuid, update: TaskUpdate) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks.write().await;
        let record = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::NotFound(task_id))?;
        // Apply to a copy so a rejected update leaves the stored record untouched.
        let mut next = record.clone();
        next.apply(update)?;
        *record = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ErrorDescriptor, TaskStatus};

    #[tokio::test]
    async fn create_get_update_lifecycle() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();

        let created = store.create(id).await.expect("create");
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(store.get(id).await.expect("get"), created);

        store.update(id, TaskUpdate::Processing).await.expect("start");
        let failed = store
            .update(
                id,
                TaskUpdate::Failed(ErrorDescriptor::new("UpstreamError", "boom", "details")),
            )
            .await
            .expect("fail");
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(store.get(id).await.expect("get"), failed);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        store.create(id).await.expect("create");
        assert!(matches!(
            store.create(id).await,
            Err(StoreError::AlreadyExists(existing)) if existing == id
        ));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update(id, TaskUpdate::Processing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejected_update_leaves_record_unchanged() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let created = store.create(id).await.expect("create");

        let err = store
            .update(
                id,
                TaskUpdate::Completed(crate::extraction::ExtractionOutcome::Parsed(
                    Default::default(),
                )),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get(id).await.expect("get"), created);
    }
}
