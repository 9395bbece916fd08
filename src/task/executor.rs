//! Background execution of extraction tasks.
//!
//! `submit` creates the pending record and spawns the execution without
//! waiting on it. Executions share a fixed number of worker permits; tasks
//! waiting for a permit stay `pending`. Each execution runs in its own tokio
//! task behind `catch_unwind`, so a panic while handling one task ends as a
//! `failed` record instead of a record stuck in `processing`.
//!
//! If the process dies mid-execution the record stays `processing`; nothing
//! here can recover that.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::{ErrorDescriptor, StoreError, TaskStore, TaskUpdate};
use crate::config::Config;
use crate::extraction::{ExtractionClient, ExtractionOutcome};
use crate::llm::{LlmError, LlmErrorKind};

/// Attempts at finding an unused task id before giving up.
const MAX_ID_ATTEMPTS: usize = 3;

/// Extra time allowed on top of the upstream timeout before an execution is
/// abandoned.
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("GEMINI_API_KEY is not configured")]
    Configuration,

    #[error("Task queue is full ({0} tasks outstanding)")]
    QueueFull(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Concurrency and time limits for task execution.
#[derive(Debug, Clone)]
pub struct ExecutorLimits {
    /// Executions running at once
    pub max_concurrent: usize,
    /// Accepted tasks not yet terminal
    pub max_queued: usize,
    /// Upper bound on one extraction call
    pub deadline: Duration,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_queued: 256,
            deadline: Duration::from_secs(crate::config::DEFAULT_LLM_TIMEOUT_SECS) + DEADLINE_GRACE,
        }
    }
}

impl ExecutorLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.tasks.max_concurrent.max(1),
            max_queued: config.tasks.max_queued.max(1),
            deadline: config.llm.timeout + DEADLINE_GRACE,
        }
    }
}

/// Runs extraction tasks off the request path.
#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    client: Option<ExtractionClient>,
    permits: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    limits: ExecutorLimits,
}

impl TaskExecutor {
    /// Create an executor. Without a client every submission fails with
    /// `SubmitError::Configuration`.
    pub fn new(
        store: Arc<dyn TaskStore>,
        client: Option<ExtractionClient>,
        limits: ExecutorLimits,
    ) -> Self {
        Self {
            store,
            client,
            permits: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            outstanding: Arc::new(AtomicUsize::new(0)),
            limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn limits(&self) -> &ExecutorLimits {
        &self.limits
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Tasks accepted and not yet terminal.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Accept `text` for extraction and return the new task id.
    ///
    /// Nothing is stored when the credential is missing or the queue is full.
    pub async fn submit(&self, text: String) -> Result<Uuid, SubmitError> {
        let client = self.client.clone().ok_or(SubmitError::Configuration)?;
        let slot = QueueSlot::acquire(&self.outstanding, self.limits.max_queued)?;
        let task_id = self.allocate_task().await?;

        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.permits);
        let deadline = self.limits.deadline;
        tokio::spawn(async move {
            let _slot = slot;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(%task_id, "Worker pool closed: {}", e);
                    let descriptor = ErrorDescriptor::new(
                        "InternalError",
                        "Task could not be scheduled",
                        e.to_string(),
                    );
                    if let Err(e) = store.update(task_id, TaskUpdate::Failed(descriptor)).await {
                        tracing::error!(%task_id, "Failed to record scheduling failure: {}", e);
                    }
                    return;
                }
            };
            run_isolated(store, client, task_id, text, deadline).await;
        });

        tracing::info!(%task_id, "Task accepted");
        Ok(task_id)
    }

    async fn allocate_task(&self) -> Result<Uuid, StoreError> {
        let mut last_err = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let task_id = Uuid::new_v4();
            match self.store.create(task_id).await {
                Ok(_) => return Ok(task_id),
                Err(StoreError::AlreadyExists(id)) => {
                    tracing::warn!(task_id = %id, "Task id collision, drawing a new id");
                    last_err = Some(StoreError::AlreadyExists(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Io("no task id allocated".to_string())))
    }
}

/// Reservation of one outstanding-task slot, released on drop.
struct QueueSlot {
    counter: Arc<AtomicUsize>,
}

impl QueueSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Result<Self, SubmitError> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .map_err(SubmitError::QueueFull)?;
        Ok(Self {
            counter: Arc::clone(counter),
        })
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_isolated(
    store: Arc<dyn TaskStore>,
    client: ExtractionClient,
    task_id: Uuid,
    text: String,
    deadline: Duration,
) {
    let result = AssertUnwindSafe(execute(store.as_ref(), &client, task_id, &text, deadline))
        .catch_unwind()
        .await;

    if let Err(panic) = result {
        let message = panic_message(panic.as_ref());
        tracing::error!(%task_id, "Task execution panicked: {}", message);
        let descriptor = ErrorDescriptor::new(
            "InternalError",
            "Task execution aborted unexpectedly",
            message,
        );
        if let Err(e) = store.update(task_id, TaskUpdate::Failed(descriptor)).await {
            tracing::error!(%task_id, "Failed to record panic for task: {}", e);
        }
    }
}

async fn execute(
    store: &dyn TaskStore,
    client: &ExtractionClient,
    task_id: Uuid,
    text: &str,
    deadline: Duration,
) {
    if let Err(e) = store.update(task_id, TaskUpdate::Processing).await {
        tracing::error!(%task_id, "Failed to mark task processing: {}", e);
        let descriptor =
            ErrorDescriptor::new("StorageError", "Task could not be started", e.to_string());
        if let Err(e) = store.update(task_id, TaskUpdate::Failed(descriptor)).await {
            tracing::error!(%task_id, "Failed to record start failure: {}", e);
        }
        return;
    }
    tracing::debug!(%task_id, "Task processing");

    let extracted = match tokio::time::timeout(deadline, client.extract(text)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::deadline_exceeded(deadline)),
    };

    let update = match extracted {
        Ok(raw) => {
            let outcome = ExtractionOutcome::from(ExtractionClient::normalize(&raw));
            if let ExtractionOutcome::Unparsed(failure) = &outcome {
                tracing::warn!(%task_id, "Model output did not parse: {}", failure.parsing_error);
            }
            TaskUpdate::Completed(outcome)
        }
        Err(err) => {
            tracing::warn!(%task_id, "Extraction failed: {}", err);
            TaskUpdate::Failed(describe_llm_error(&err))
        }
    };

    match store.update(task_id, update).await {
        Ok(record) => tracing::info!(
            %task_id,
            status = %record.status,
            parse_failure = record
                .result
                .as_ref()
                .is_some_and(ExtractionOutcome::is_parse_failure),
            "Task finished"
        ),
        Err(e) => tracing::error!(%task_id, "Failed to store task outcome: {}", e),
    }
}

/// Error descriptor recorded for a failed upstream call.
pub(crate) fn describe_llm_error(err: &LlmError) -> ErrorDescriptor {
    let message = if err.is_timeout() {
        "Upstream request timed out".to_string()
    } else if err.kind == LlmErrorKind::Configuration {
        "LLM credential is not configured".to_string()
    } else {
        format!("Failed to get a response from the language model ({})", err.kind)
    };
    ErrorDescriptor::new(err.kind.category(), message, err.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use crate::task::{FileTaskStore, InMemoryTaskStore, TaskRecord, TaskStatus};
    use async_trait::async_trait;
    use std::collections::HashSet;

    enum Behavior {
        Answer(String),
        EchoLocation,
        Fail(LlmError),
        Panic,
        Hang,
    }

    struct StubLlm(Behavior);

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            match &self.0 {
                Behavior::Answer(text) => Ok(text.clone()),
                Behavior::EchoLocation => {
                    let command = prompt
                        .split("User command: \"")
                        .nth(1)
                        .and_then(|rest| rest.split('"').next())
                        .unwrap_or_default();
                    Ok(format!("{{\"location\": \"{}\"}}", command))
                }
                Behavior::Fail(err) => Err(err.clone()),
                Behavior::Panic => panic!("stub exploded"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    fn executor(behavior: Behavior, limits: ExecutorLimits) -> TaskExecutor {
        executor_over(Arc::new(InMemoryTaskStore::new()), behavior, limits)
    }

    fn executor_over(
        store: Arc<dyn TaskStore>,
        behavior: Behavior,
        limits: ExecutorLimits,
    ) -> TaskExecutor {
        let client = ExtractionClient::new(Arc::new(StubLlm(behavior)));
        TaskExecutor::new(store, Some(client), limits)
    }

    async fn wait_terminal(executor: &TaskExecutor, task_id: Uuid) -> TaskRecord {
        for _ in 0..500 {
            let record = executor.store().get(task_id).await.expect("record");
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached a terminal state", task_id);
    }

    #[tokio::test]
    async fn completed_task_carries_parsed_result() {
        let executor = executor(
            Behavior::Answer("```json\n{\"location\": \"Goa\", \"budget\": 5000}\n```".to_string()),
            ExecutorLimits::default(),
        );
        let task_id = executor.submit("beach day".to_string()).await.expect("submit");

        let record = wait_terminal(&executor, task_id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.error.is_none());
        match record.result.expect("result") {
            ExtractionOutcome::Parsed(result) => {
                assert_eq!(result.location.as_deref(), Some("Goa"));
                assert_eq!(result.budget, Some(serde_json::Number::from(5000u64)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(executor.outstanding(), 0);
    }

    #[tokio::test]
    async fn parse_failure_completes_with_raw_output() {
        let executor = executor(
            Behavior::Answer("I am not JSON".to_string()),
            ExecutorLimits::default(),
        );
        let task_id = executor.submit("hello".to_string()).await.expect("submit");

        let record = wait_terminal(&executor, task_id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        match record.result.expect("result") {
            ExtractionOutcome::Unparsed(failure) => {
                assert_eq!(failure.raw_output, "I am not JSON");
                assert!(!failure.parsing_error.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn upstream_failure_marks_task_failed() {
        let executor = executor(
            Behavior::Fail(LlmError::network_error("Connection failed: refused".to_string())),
            ExecutorLimits::default(),
        );
        let task_id = executor.submit("hello".to_string()).await.expect("submit");

        let record = wait_terminal(&executor, task_id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.result.is_none());
        let error = record.error.expect("error");
        assert_eq!(error.kind, "UpstreamError");
        assert!(error.details.contains("refused"));
    }

    #[tokio::test]
    async fn panic_in_execution_marks_task_failed() {
        let executor = executor(Behavior::Panic, ExecutorLimits::default());
        let task_id = executor.submit("hello".to_string()).await.expect("submit");

        let record = wait_terminal(&executor, task_id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.expect("error");
        assert_eq!(error.kind, "InternalError");
        assert!(error.details.contains("stub exploded"));

        // The executor keeps working after a panic.
        assert_eq!(executor.outstanding(), 0);
    }

    #[tokio::test]
    async fn hung_upstream_hits_the_deadline() {
        let limits = ExecutorLimits {
            deadline: Duration::from_millis(100),
            ..ExecutorLimits::default()
        };
        let executor = executor(Behavior::Hang, limits);
        let task_id = executor.submit("hello".to_string()).await.expect("submit");

        let record = wait_terminal(&executor, task_id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.expect("error");
        assert_eq!(error.kind, "UpstreamError");
        assert_eq!(error.message, "Upstream request timed out");
        assert!(error.details.contains("100ms task deadline"), "{}", error.details);
    }

    #[tokio::test]
    async fn missing_client_refuses_without_creating_records() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let executor = TaskExecutor::new(Arc::clone(&store), None, ExecutorLimits::default());
        assert!(!executor.is_configured());

        let err = executor.submit("hello".to_string()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Configuration));
        assert_eq!(executor.outstanding(), 0);
    }

    #[tokio::test]
    async fn full_queue_rejects_submissions() {
        let limits = ExecutorLimits {
            max_concurrent: 1,
            max_queued: 2,
            deadline: Duration::from_secs(3600),
        };
        let executor = executor(Behavior::Hang, limits);

        let first = executor.submit("one".to_string()).await.expect("first");
        let second = executor.submit("two".to_string()).await.expect("second");
        assert_ne!(first, second);

        let err = executor.submit("three".to_string()).await.unwrap_err();
        assert!(matches!(err, SubmitError::QueueFull(2)));

        // Only one permit: the second task waits as pending.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let statuses: HashSet<TaskStatus> = [
            executor.store().get(first).await.unwrap().status,
            executor.store().get(second).await.unwrap().status,
        ]
        .into_iter()
        .collect();
        assert!(statuses.contains(&TaskStatus::Pending));
    }

    async fn submit_many_and_check(executor: &TaskExecutor, count: usize) {
        let handles: Vec<_> = (0..count)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    let text = format!("city-{}", i);
                    let id = executor.submit(text.clone()).await.expect("submit");
                    (id, text)
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let (id, text) = handle.await.expect("join");
            assert!(ids.insert(id), "duplicate task id {}", id);
            let record = wait_terminal(executor, id).await;
            record.validate().expect("valid record");
            match record.result.expect("result") {
                ExtractionOutcome::Parsed(result) => {
                    assert_eq!(result.location.as_deref(), Some(text.as_str()))
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(ids.len(), count);
    }

    #[tokio::test]
    async fn concurrent_submissions_stay_independent() {
        let executor = executor(Behavior::EchoLocation, ExecutorLimits::default());
        submit_many_and_check(&executor, 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_over_file_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileTaskStore::new(temp.path().join("task_results"))
            .await
            .expect("store");
        let executor = executor_over(
            Arc::new(store),
            Behavior::EchoLocation,
            ExecutorLimits::default(),
        );
        submit_many_and_check(&executor, 16).await;
    }

    #[test]
    fn descriptors_name_the_failure() {
        let timeout = describe_llm_error(&LlmError::timeout(Duration::from_secs(60), "slow"));
        assert_eq!(timeout.kind, "UpstreamError");
        assert_eq!(timeout.message, "Upstream request timed out");

        let config = describe_llm_error(&LlmError::configuration("no key"));
        assert_eq!(config.kind, "ConfigurationError");
        assert!(config.details.contains("no key"));
    }
}
