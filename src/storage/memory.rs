//! In-memory implementation of [`WorkflowStorage`]

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SharedWorkflow, StorageError, WorkflowStorage};
use crate::workflow::WorkflowHandle;

/// Warm/cold in-memory workflow store.
///
/// Completion instants are recorded at the moment a workflow is moved
/// to cold storage, so [`cleanup_cold_storage`](Self::cleanup_cold_storage)
/// is fully functional rather than the no-op the spec allows for
/// backends that don't timestamp terminal entries.
pub struct InMemoryWorkflowStorage {
    warm: RwLock<HashMap<Uuid, SharedWorkflow>>,
    cold: RwLock<HashMap<Uuid, SharedWorkflow>>,
    cold_completed_at: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemoryWorkflowStorage {
    pub fn new() -> Self {
        Self {
            warm: RwLock::new(HashMap::new()),
            cold: RwLock::new(HashMap::new()),
            cold_completed_at: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWorkflowStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStorage for InMemoryWorkflowStorage {
    async fn add_workflow(&self, workflow: WorkflowHandle) {
        let id = workflow.id;
        self.warm
            .write()
            .insert(id, Arc::new(Mutex::new(workflow)));
    }

    async fn get(&self, id: Uuid) -> Option<SharedWorkflow> {
        if let Some(wf) = self.warm.read().get(&id).cloned() {
            return Some(wf);
        }
        self.cold.read().get(&id).cloned()
    }

    async fn move_to_cold_storage(&self, id: Uuid) -> Result<(), StorageError> {
        let wf = { self.warm.read().get(&id).cloned() };
        let Some(wf) = wf else {
            return Err(StorageError::NotFound(id));
        };
        let is_terminal = wf.lock().await.status.is_terminal();

        if !is_terminal {
            return Ok(());
        }

        let wf = self.warm.write().remove(&id);
        if let Some(wf) = wf {
            let completed_at = Utc::now();
            wf.lock().await.completed_at = Some(completed_at);
            self.cold.write().insert(id, wf);
            self.cold_completed_at.write().insert(id, completed_at);
        }
        Ok(())
    }

    async fn cleanup_cold_storage(&self, before: DateTime<Utc>) {
        let stale: Vec<Uuid> = self
            .cold_completed_at
            .read()
            .iter()
            .filter(|(_, completed_at)| **completed_at < before)
            .map(|(id, _)| *id)
            .collect();

        if stale.is_empty() {
            return;
        }

        let mut cold = self.cold.write();
        let mut completed = self.cold_completed_at.write();
        for id in stale {
            cold.remove(&id);
            completed.remove(&id);
        }
    }

    async fn get_active_workflows(&self) -> HashSet<Uuid> {
        self.warm.read().keys().copied().collect()
    }

    async fn get_all_workflows(&self) -> HashSet<Uuid> {
        let mut ids: HashSet<Uuid> = self.warm.read().keys().copied().collect();
        ids.extend(self.cold.read().keys().copied());
        ids
    }

    async fn warm_count(&self) -> usize {
        self.warm.read().len()
    }

    async fn cold_count(&self) -> usize {
        self.cold.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::Transition;
    use crate::workflow::{StepFuture, Workflow, WorkflowStatus};
    use serde_json::json;

    struct DoneWorkflow;
    impl Workflow for DoneWorkflow {
        fn call_step<'a>(
            &'a mut self,
            _step: &'a str,
            _params: crate::transition::Params,
        ) -> StepFuture<'a> {
            Box::pin(async { Ok(Transition::end(json!(null))) })
        }
    }

    #[tokio::test]
    async fn add_then_get_finds_warm() {
        let storage = InMemoryWorkflowStorage::new();
        let handle = WorkflowHandle::new(Box::new(DoneWorkflow));
        let id = handle.id;
        storage.add_workflow(handle).await;

        assert!(storage.get(id).await.is_some());
        assert_eq!(storage.warm_count().await, 1);
        assert_eq!(storage.cold_count().await, 0);
    }

    #[tokio::test]
    async fn move_to_cold_is_noop_unless_terminal() {
        let storage = InMemoryWorkflowStorage::new();
        let handle = WorkflowHandle::new(Box::new(DoneWorkflow));
        let id = handle.id;
        storage.add_workflow(handle).await;

        storage.move_to_cold_storage(id).await.unwrap();
        assert_eq!(storage.warm_count().await, 1);
        assert_eq!(storage.cold_count().await, 0);
    }

    #[tokio::test]
    async fn move_to_cold_errors_when_id_not_in_warm_storage() {
        let storage = InMemoryWorkflowStorage::new();
        let id = Uuid::new_v4();

        let err = storage.move_to_cold_storage(id).await.unwrap_err();
        assert_eq!(err, StorageError::NotFound(id));
    }

    #[tokio::test]
    async fn move_to_cold_moves_terminal_workflow() {
        let storage = InMemoryWorkflowStorage::new();
        let mut handle = WorkflowHandle::new(Box::new(DoneWorkflow));
        handle.complete(json!(1));
        let id = handle.id;
        storage.add_workflow(handle).await;

        storage.move_to_cold_storage(id).await.unwrap();
        assert_eq!(storage.warm_count().await, 0);
        assert_eq!(storage.cold_count().await, 1);

        let wf = storage.get(id).await.unwrap();
        assert_eq!(wf.lock().await.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn tiers_are_disjoint() {
        let storage = InMemoryWorkflowStorage::new();
        let mut handle = WorkflowHandle::new(Box::new(DoneWorkflow));
        handle.complete(json!(1));
        let id = handle.id;
        storage.add_workflow(handle).await;
        storage.move_to_cold_storage(id).await.unwrap();

        let active = storage.get_active_workflows().await;
        assert!(!active.contains(&id));
    }

    #[tokio::test]
    async fn get_all_workflows_includes_both_tiers() {
        let storage = InMemoryWorkflowStorage::new();
        let warm = WorkflowHandle::new(Box::new(DoneWorkflow));
        let warm_id = warm.id;
        let mut cold = WorkflowHandle::new(Box::new(DoneWorkflow));
        cold.complete(json!(1));
        let cold_id = cold.id;

        storage.add_workflow(warm).await;
        storage.add_workflow(cold).await;
        storage.move_to_cold_storage(cold_id).await.unwrap();

        let all = storage.get_all_workflows().await;
        assert!(all.contains(&warm_id));
        assert!(all.contains(&cold_id));
    }

    #[tokio::test]
    async fn cleanup_removes_only_entries_before_cutoff() {
        let storage = InMemoryWorkflowStorage::new();
        let mut handle = WorkflowHandle::new(Box::new(DoneWorkflow));
        handle.complete(json!(1));
        let id = handle.id;
        storage.add_workflow(handle).await;
        storage.move_to_cold_storage(id).await.unwrap();

        storage
            .cleanup_cold_storage(Utc::now() - chrono::Duration::seconds(60))
            .await;
        assert_eq!(storage.cold_count().await, 1, "cutoff in the past keeps entries");

        storage
            .cleanup_cold_storage(Utc::now() + chrono::Duration::seconds(60))
            .await;
        assert_eq!(storage.cold_count().await, 0, "cutoff in the future purges entries");
    }
}
