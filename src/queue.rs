//! The task queue
//!
//! Strict FIFO of `(workflow_id, step_name, params)` tuples. The
//! engine is the sole consumer; `push`/`try_pop` never block, so a
//! plain mutex-guarded `VecDeque` is enough even under a
//! multi-threaded runtime.

use std::collections::VecDeque;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::transition::Params;

/// One unit of dispatch work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub workflow_id: Uuid,
    pub step_name: String,
    pub params: Params,
}

impl Task {
    pub fn new(workflow_id: Uuid, step_name: impl Into<String>, params: Params) -> Self {
        Self {
            workflow_id,
            step_name: step_name.into(),
            params,
        }
    }
}

/// Errors from queue operations. The base, unbounded queue never
/// produces these; [`BoundedTaskQueue`] does.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum QueueError {
    #[error("task queue is full (capacity {capacity})")]
    Full { capacity: usize },
}

/// Unbounded FIFO task queue.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the back of the queue.
    pub fn push(&self, workflow_id: Uuid, step_name: impl Into<String>, params: Params) {
        self.inner
            .lock()
            .push_back(Task::new(workflow_id, step_name, params));
    }

    /// Remove and return the oldest task, or `None` if empty.
    pub fn try_pop(&self) -> Option<Task> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// An optional, depth-capped variant of [`TaskQueue`] for implementers
/// targeting adversarial input (see the engine's design notes). Not
/// used by [`crate::engine::Engine`] by default.
pub struct BoundedTaskQueue {
    queue: TaskQueue,
    capacity: usize,
}

impl BoundedTaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: TaskQueue::new(),
            capacity,
        }
    }

    pub fn push(
        &self,
        workflow_id: Uuid,
        step_name: impl Into<String>,
        params: Params,
    ) -> Result<(), QueueError> {
        if self.queue.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.queue.push(workflow_id, step_name, params);
        Ok(())
    }

    pub fn try_pop(&self) -> Option<Task> {
        self.queue.try_pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::params_from;

    #[test]
    fn fifo_order_across_workflows() {
        let queue = TaskQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        queue.push(a, "start", params_from([]));
        queue.push(b, "start", params_from([]));
        queue.push(a, "step_b", params_from([]));

        assert_eq!(queue.try_pop().unwrap().workflow_id, a);
        assert_eq!(queue.try_pop().unwrap().workflow_id, b);
        assert_eq!(queue.try_pop().unwrap().workflow_id, a);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let queue = TaskQueue::new();
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn bounded_queue_rejects_past_capacity() {
        let queue = BoundedTaskQueue::new(1);
        let id = Uuid::new_v4();
        queue.push(id, "start", params_from([])).unwrap();
        let err = queue.push(id, "start", params_from([])).unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 1 });
    }
}
