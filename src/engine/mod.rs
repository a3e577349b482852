//! The dispatch engine — the core of the core.
//!
//! Owns a [`WorkflowStorage`], a [`TaskQueue`], and a [`WorkflowRegistry`].
//! A single cooperative dispatch loop pops tasks, invokes the named
//! step under a timeout, interprets the returned [`Transition`], and
//! either enqueues the successor or moves the workflow to cold
//! storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::queue::TaskQueue;
use crate::registry::{RegistryError, WorkflowRegistry};
use crate::storage::{SharedWorkflow, WorkflowStorage};
use crate::transition::{Params, Transition, DEFAULT_STEP_TIMEOUT};
use crate::workflow::{Workflow, WorkflowError, WorkflowHandle, WorkflowInfo, WorkflowStatus};

/// How long the dispatch loop sleeps when the queue is empty, to
/// avoid busy-waiting.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Tunables for the dispatch loop. Default matches spec: 120s per-step
/// body timeout. Tests shrink these so scenarios that would otherwise
/// take minutes run in milliseconds, without touching the dispatch
/// logic itself. The 600s ceiling on a transition's own `timeout` is
/// enforced once, at construction, by [`Transition`]'s constructors
/// (`MAX_STEP_TIMEOUT`) — the engine never re-checks or re-clamps it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_step_timeout: Duration,
    pub idle_sleep: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: DEFAULT_STEP_TIMEOUT,
            idle_sleep: IDLE_SLEEP,
        }
    }
}

/// Errors surfaced directly to a caller starting a workflow. Execution
/// errors (timeouts, step failures, invalid transitions, cancellation)
/// are never returned here — they're absorbed and recorded on the
/// workflow; see [`WorkflowError`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownWorkflow(name) => EngineError::UnknownWorkflow(name),
            RegistryError::MissingParameter(name) => EngineError::MissingParameter(name),
        }
    }
}

/// The dispatch engine.
pub struct Engine {
    storage: Arc<dyn WorkflowStorage>,
    queue: Arc<TaskQueue>,
    registry: Arc<WorkflowRegistry>,
    config: EngineConfig,
    running: Arc<AtomicBool>,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        storage: Arc<dyn WorkflowStorage>,
        queue: Arc<TaskQueue>,
        registry: Arc<WorkflowRegistry>,
    ) -> Self {
        Self::with_config(storage, queue, registry, EngineConfig::default())
    }

    pub fn with_config(
        storage: Arc<dyn WorkflowStorage>,
        queue: Arc<TaskQueue>,
        registry: Arc<WorkflowRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            registry,
            config,
            running: Arc::new(AtomicBool::new(false)),
            loop_handle: AsyncMutex::new(None),
        }
    }

    /// Whether the dispatch loop is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of workflows in warm storage.
    pub async fn active_workflow_count(&self) -> usize {
        self.storage.warm_count().await
    }

    /// Every id storage knows about, warm or cold. Used by the HTTP
    /// listing endpoint.
    pub async fn all_workflow_ids(&self) -> std::collections::HashSet<Uuid> {
        self.storage.get_all_workflows().await
    }

    /// Start a workflow instance directly, bypassing the registry.
    #[instrument(skip(self, workflow, params))]
    pub async fn start_workflow(&self, workflow: Box<dyn Workflow>, params: Params) -> Uuid {
        let mut handle = WorkflowHandle::new(workflow);
        handle.status = WorkflowStatus::Running;
        let id = handle.id;

        info!(%id, name = handle.name(), "starting workflow");
        self.storage.add_workflow(handle).await;
        self.queue.push(id, "start", params);
        self.ensure_loop_running().await;

        id
    }

    /// Look up `name` in the registry, validate required parameters,
    /// and start the resulting workflow.
    #[instrument(skip(self, params))]
    pub async fn start_workflow_by_name(
        &self,
        name: &str,
        params: Params,
    ) -> Result<Uuid, EngineError> {
        let workflow = self.registry.instantiate(name, &params)?;
        Ok(self.start_workflow(workflow, params).await)
    }

    /// Fetch a snapshot of a workflow's state, or `None` if unknown.
    pub async fn get_workflow(&self, id: Uuid) -> Option<WorkflowInfo> {
        let handle = self.storage.get(id).await?;
        let guard = handle.lock().await;
        Some(WorkflowInfo::from(&*guard))
    }

    /// Cooperatively stop a running workflow. If the workflow is not
    /// in `Running` status (already terminal, or unknown), this is a
    /// no-op — calling it twice is safe and idempotent.
    #[instrument(skip(self))]
    pub async fn stop_workflow(&self, id: Uuid) {
        let Some(handle) = self.storage.get(id).await else {
            return;
        };

        {
            let mut guard = handle.lock().await;
            if guard.status != WorkflowStatus::Running {
                return;
            }
            guard.fail(WorkflowError::Cancelled);
        }

        if let Err(err) = self.storage.move_to_cold_storage(id).await {
            warn!(%id, %err, "failed to move cancelled workflow to cold storage");
        }
    }

    /// Stop every workflow currently in warm storage.
    pub async fn stop_all_workflows(&self) {
        for id in self.storage.get_active_workflows().await {
            self.stop_workflow(id).await;
        }
    }

    /// Purge cold-storage entries completed before `before`.
    pub async fn cleanup_old_workflows(&self, before: DateTime<Utc>) {
        self.storage.cleanup_cold_storage(before).await;
    }

    /// Stop the dispatch loop and fail every workflow still in warm
    /// storage, so nothing is left stuck `Running` forever.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.loop_handle.lock().await.take() {
            handle.abort();
        }

        for id in self.storage.get_active_workflows().await {
            if let Some(handle) = self.storage.get(id).await {
                {
                    let mut guard = handle.lock().await;
                    if !guard.status.is_terminal() {
                        guard.fail(WorkflowError::Cancelled);
                    }
                }
                let _ = self.storage.move_to_cold_storage(id).await;
            }
        }
    }

    async fn ensure_loop_running(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let storage = Arc::clone(&self.storage);
        let queue = Arc::clone(&self.queue);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);

        let handle = tokio::spawn(async move {
            dispatch_loop(storage, queue, config, running).await;
        });

        *self.loop_handle.lock().await = Some(handle);
    }
}

/// The single cooperative dispatch loop. See spec steps 1-10.
async fn dispatch_loop(
    storage: Arc<dyn WorkflowStorage>,
    queue: Arc<TaskQueue>,
    config: EngineConfig,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let Some(task) = queue.try_pop() else {
            tokio::time::sleep(config.idle_sleep).await;
            continue;
        };

        let Some(handle) = storage.get(task.workflow_id).await else {
            debug!(workflow_id = %task.workflow_id, "task dropped: workflow not found");
            continue;
        };

        let mut guard = handle.lock().await;
        if guard.status.is_terminal() {
            debug!(workflow_id = %task.workflow_id, "task dropped: workflow already terminal");
            continue;
        }

        guard.current_step_name = Some(task.step_name.clone());

        let outcome = run_step(&mut guard, &task.step_name, task.params, &config).await;
        let is_terminal = apply_outcome(&mut guard, &task.step_name, outcome, &queue).await;
        drop(guard);

        if is_terminal {
            if let Err(err) = storage.move_to_cold_storage(task.workflow_id).await {
                warn!(workflow_id = %task.workflow_id, %err, "failed to move terminal workflow to cold storage");
            }
        }
    }
}

enum StepResult {
    Outcome(Transition),
    Timeout,
    Failure(String),
}

/// Invoke the named step under the engine's default step-body timeout.
async fn run_step(
    handle: &mut WorkflowHandle,
    step: &str,
    params: Params,
    config: &EngineConfig,
) -> StepResult {
    match tokio::time::timeout(
        config.default_step_timeout,
        handle.workflow.call_step(step, params),
    )
    .await
    {
        Ok(Ok(transition)) => StepResult::Outcome(transition),
        Ok(Err(failure)) => StepResult::Failure(failure.0),
        Err(_) => StepResult::Timeout,
    }
}

/// Interpret a step's outcome, mutating `handle` and (for `Next`-like
/// transitions) pushing the successor task. Returns whether `handle`
/// is now in a terminal status.
async fn apply_outcome(
    handle: &mut WorkflowHandle,
    step: &str,
    outcome: StepResult,
    queue: &TaskQueue,
) -> bool {
    let transition = match outcome {
        StepResult::Timeout => {
            warn!(%step, "step timed out");
            handle.fail(WorkflowError::StepTimeout {
                step: step.to_string(),
            });
            return true;
        }
        StepResult::Failure(message) => {
            warn!(%step, %message, "step failed");
            handle.fail(WorkflowError::StepFailure {
                step: step.to_string(),
                message,
            });
            return true;
        }
        StepResult::Outcome(t) => t,
    };

    match transition {
        Transition::End { result } => {
            handle.complete(result);
            true
        }
        Transition::Next {
            step: next_step,
            params,
            ..
        } => {
            queue.push(handle.id, next_step, params);
            false
        }
        Transition::WaitAndNext {
            wait,
            step: next_step,
            params,
            timeout,
        } => {
            if sleep_under_timeout(wait, timeout).await {
                queue.push(handle.id, next_step, params);
                false
            } else {
                handle.fail(WorkflowError::StepTimeout {
                    step: next_step,
                });
                true
            }
        }
        Transition::Schedule {
            schedule_time,
            step: next_step,
            params,
            timeout,
        } => {
            let wait = (schedule_time - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if sleep_under_timeout(wait, timeout).await {
                queue.push(handle.id, next_step, params);
                false
            } else {
                handle.fail(WorkflowError::StepTimeout {
                    step: next_step,
                });
                true
            }
        }
    }
}

/// Sleep for `wait`, itself bounded by `timeout`. Returns `false` if
/// the timeout elapsed first.
async fn sleep_under_timeout(wait: Duration, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, tokio::time::sleep(wait))
        .await
        .is_ok()
}
