//! Workflow instances and the step-dispatch trait
//!
//! A workflow is a user-defined state machine. Its steps are looked up
//! by name and invoked with a [`Params`] map, returning a
//! [`Transition`]. The engine is the only thing that may resolve a
//! step's name to a call; a workflow only needs to answer
//! [`Workflow::call_step`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::transition::{Params, Transition};

/// A step's asynchronous outcome: the transition it returns, or a
/// failure the engine records as `step-failure`.
pub type StepOutcome = Result<Transition, StepFailure>;

/// The boxed future a step invocation returns.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>>;

/// An error raised from inside a step body (not a transition-construction
/// error — those are caught before the step ever runs).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StepFailure(pub String);

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Lifecycle status of a workflow instance.
///
/// `Completed`, `Failed`, and `Timeout` are terminal: once a workflow
/// enters one of these it never leaves it and is never re-enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Reserved for future use; the dispatch loop never assigns this
    /// status itself (see the engine module docs).
    Waiting,
    Timeout,
}

impl WorkflowStatus {
    /// Whether this status is one a workflow can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Timeout
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Waiting => "waiting",
            WorkflowStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// The kind of failure recorded on a workflow that reached a terminal,
/// non-`Completed` status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkflowError {
    /// A step's body exceeded its timeout, or a `WaitAndNext`/`Schedule`
    /// sleep exceeded the transition's own timeout — both surface as
    /// the same `step-timeout` kind.
    StepTimeout { step: String },
    /// A step raised a failure other than a timeout.
    StepFailure { step: String, message: String },
    /// The workflow was stopped externally.
    Cancelled,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::StepTimeout { step } => {
                write!(f, "step '{step}' timed out")
            }
            WorkflowError::StepFailure { step, message } => {
                write!(f, "step '{step}' failed: {message}")
            }
            WorkflowError::Cancelled => write!(f, "workflow cancelled"),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// A user-defined workflow: a named set of steps, each resolved by
/// string name. `start` must be a recognized step name for every
/// implementation — the engine invokes it the same way it invokes any
/// other step.
pub trait Workflow: Send + Sync {
    /// Human label, defaults to `"Unnamed Workflow"` if unset by the
    /// implementer.
    fn name(&self) -> &str {
        "Unnamed Workflow"
    }

    /// Invoke the named step with `params`. Implementations typically
    /// match on `step` and dispatch to an inherent async method.
    fn call_step<'a>(&'a mut self, step: &'a str, params: Params) -> StepFuture<'a>;
}

/// Engine-owned bookkeeping plus the boxed workflow, as stored in
/// warm/cold storage.
pub struct WorkflowHandle {
    pub id: Uuid,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_step_name: Option<String>,
    pub result: Option<Value>,
    pub error: Option<WorkflowError>,
    pub workflow: Box<dyn Workflow>,
}

impl WorkflowHandle {
    pub fn new(workflow: Box<dyn Workflow>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            current_step_name: None,
            result: None,
            error: None,
            workflow,
        }
    }

    pub fn name(&self) -> &str {
        self.workflow.name()
    }

    /// Record success and flip to `Completed`.
    pub fn complete(&mut self, result: Value) {
        self.result = Some(result);
        self.status = WorkflowStatus::Completed;
    }

    /// Record a failure and flip to the appropriate terminal status.
    /// `Timeout` for the two timeout kinds, `Failed` otherwise.
    pub fn fail(&mut self, error: WorkflowError) {
        self.status = match error {
            WorkflowError::StepTimeout { .. } => WorkflowStatus::Timeout,
            _ => WorkflowStatus::Failed,
        };
        self.error = Some(error);
    }
}

/// A snapshot of a workflow's externally observable state, independent
/// of storage tier. Used by the HTTP surface and by tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowInfo {
    pub workflow_id: Uuid,
    pub name: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub current_step_name: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl From<&WorkflowHandle> for WorkflowInfo {
    fn from(handle: &WorkflowHandle) -> Self {
        Self {
            workflow_id: handle.id,
            name: handle.name().to_string(),
            status: handle.status,
            created_at: handle.created_at,
            current_step_name: handle.current_step_name.clone(),
            result: handle.result.clone(),
            error: handle.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Convenience constructor for a [`Params`] map from owned key/value
/// pairs, used throughout tests and the registry's default-parameter
/// merge.
pub fn params_from(entries: impl IntoIterator<Item = (String, Value)>) -> Params {
    let map: BTreeMap<String, Value> = entries.into_iter().collect();
    map.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Timeout.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Waiting.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&WorkflowStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
    }

    struct NoopWorkflow;
    impl Workflow for NoopWorkflow {
        fn call_step<'a>(&'a mut self, _step: &'a str, _params: Params) -> StepFuture<'a> {
            Box::pin(async { Ok(Transition::end(json!(null))) })
        }
    }

    #[test]
    fn fail_with_step_timeout_sets_timeout_status() {
        let mut handle = WorkflowHandle::new(Box::new(NoopWorkflow));
        handle.fail(WorkflowError::StepTimeout {
            step: "start".into(),
        });
        assert_eq!(handle.status, WorkflowStatus::Timeout);
    }

    #[test]
    fn fail_with_cancelled_sets_failed_status() {
        let mut handle = WorkflowHandle::new(Box::new(NoopWorkflow));
        handle.fail(WorkflowError::Cancelled);
        assert_eq!(handle.status, WorkflowStatus::Failed);
        assert_eq!(handle.error.unwrap().to_string(), "workflow cancelled");
    }

    #[test]
    fn complete_sets_result_and_status() {
        let mut handle = WorkflowHandle::new(Box::new(NoopWorkflow));
        handle.complete(json!(42));
        assert_eq!(handle.status, WorkflowStatus::Completed);
        assert_eq!(handle.result, Some(json!(42)));
    }

    #[test]
    fn default_name_is_unnamed() {
        let handle = WorkflowHandle::new(Box::new(NoopWorkflow));
        assert_eq!(handle.name(), "Unnamed Workflow");
    }
}
