//! # Stepwire
//!
//! A lightweight, in-process asynchronous workflow engine: workflows are
//! user-defined state machines whose steps are dispatched by name and
//! return a [`Transition`] describing what happens next.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │  (single cooperative dispatch loop, timeouts, transitions)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//! ┌───────────────────┐ ┌─────────────┐ ┌──────────────────┐
//! │     TaskQueue      │ │WorkflowStore│ │ WorkflowRegistry │
//! │  FIFO of dispatch   │ │ warm / cold │ │  name → factory  │
//! │  work, engine-only  │ │   tiers     │ │  + param schema  │
//! └───────────────────┘ └─────────────┘ └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use stepwire::prelude::*;
//!
//! struct Onboarding;
//!
//! impl Workflow for Onboarding {
//!     fn call_step<'a>(&'a mut self, step: &'a str, params: Params) -> StepFuture<'a> {
//!         Box::pin(async move {
//!             match step {
//!                 "start" => Transition::next("send_welcome_email", params, None)
//!                     .map_err(|e| StepFailure::new(e.to_string())),
//!                 "send_welcome_email" => Ok(Transition::end(serde_json::json!({"ok": true}))),
//!                 other => Ok(Transition::end(serde_json::Value::Null)),
//!             }
//!         })
//!     }
//! }
//!
//! let engine = Engine::new(
//!     std::sync::Arc::new(InMemoryWorkflowStorage::new()),
//!     std::sync::Arc::new(TaskQueue::new()),
//!     std::sync::Arc::new(WorkflowRegistry::new()),
//! );
//! ```

pub mod api;
pub mod engine;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod transition;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::engine::{Engine, EngineConfig, EngineError};
    pub use crate::queue::{BoundedTaskQueue, QueueError, Task, TaskQueue};
    pub use crate::registry::{
        ConfigError, ParameterSpec, RegistryError, WorkflowFactory, WorkflowMetadata,
        WorkflowRegistry,
    };
    pub use crate::storage::{InMemoryWorkflowStorage, StorageError, WorkflowStorage};
    pub use crate::transition::{Params, Transition, TransitionError};
    pub use crate::workflow::{
        params_from, StepFailure, StepFuture, StepOutcome, Workflow, WorkflowError,
        WorkflowHandle, WorkflowInfo, WorkflowStatus,
    };
}

// Re-export key types at crate root
pub use engine::{Engine, EngineConfig, EngineError};
pub use queue::{QueueError, Task, TaskQueue};
pub use registry::{RegistryError, WorkflowFactory, WorkflowMetadata, WorkflowRegistry};
pub use storage::{InMemoryWorkflowStorage, StorageError, WorkflowStorage};
pub use transition::{Params, Transition, TransitionError};
pub use workflow::{StepFailure, Workflow, WorkflowError, WorkflowHandle, WorkflowInfo, WorkflowStatus};
