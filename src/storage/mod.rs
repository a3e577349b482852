//! Workflow storage
//!
//! A two-tier map: warm storage for workflows that have not yet
//! reached a terminal status, cold storage for those that have. The
//! tiers are disjoint and transitions are monotonic — warm to cold,
//! never back.

mod memory;

pub use memory::InMemoryWorkflowStorage;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::workflow::WorkflowHandle;

/// A workflow behind the lock the engine holds for the duration of one
/// step dispatch. `tokio::sync::Mutex` (not `parking_lot`) because the
/// guard is held across the `.await` of the step body.
pub type SharedWorkflow = Arc<Mutex<WorkflowHandle>>;

/// Errors from storage operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("workflow not found: {0}")]
    NotFound(Uuid),
}

/// A backend for workflow storage. The in-memory implementation is
/// the only one this crate requires; the trait exists so a durable
/// backend could be added later without touching the engine.
#[async_trait]
pub trait WorkflowStorage: Send + Sync {
    /// Insert `workflow` into warm storage. If `workflow.id` collides
    /// with an existing entry, the existing entry is overwritten
    /// (collisions are not expected given UUID generation).
    async fn add_workflow(&self, workflow: WorkflowHandle);

    /// Look the workflow up in warm storage, then cold.
    async fn get(&self, id: Uuid) -> Option<SharedWorkflow>;

    /// Move a workflow from warm to cold storage. A no-op (`Ok`) if the
    /// workflow is present in warm storage but not yet terminal; an
    /// error if `id` is not present in warm storage at all.
    async fn move_to_cold_storage(&self, id: Uuid) -> Result<(), StorageError>;

    /// Remove cold-storage entries completed strictly before `before`.
    async fn cleanup_cold_storage(&self, before: DateTime<Utc>);

    /// Snapshot of warm-storage ids.
    async fn get_active_workflows(&self) -> HashSet<Uuid>;

    /// Snapshot of every id known to storage, warm or cold. Used by the
    /// HTTP listing endpoint, which shows terminal workflows too.
    async fn get_all_workflows(&self) -> HashSet<Uuid>;

    /// Number of workflows in warm storage.
    async fn warm_count(&self) -> usize;

    /// Number of workflows in cold storage.
    async fn cold_count(&self) -> usize;
}
