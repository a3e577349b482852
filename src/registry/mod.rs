//! Workflow registry
//!
//! Loads workflow metadata from a YAML configuration document and
//! exposes registered workflows by name, so external callers can start
//! a workflow without compile-time knowledge of its type.

mod config;

pub use config::{load_from_config, ConfigError};

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transition::Params;
use crate::workflow::Workflow;

/// A factory that builds a fresh workflow instance. Registered once
/// per workflow type at startup (the static analogue of `lazerwfm`'s
/// `importlib`-based dynamic class load — see `config.rs`). `Arc`
/// rather than `Box` so the config loader can hand the same factory
/// to multiple registry entries (e.g. duplicate names) without
/// re-resolving it.
pub type WorkflowFactory = Arc<dyn Fn() -> Box<dyn Workflow> + Send + Sync>;

/// Declared shape of a single workflow parameter. `type` is purely
/// informational, as in the source configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParameterSpec {
    #[serde(rename = "type", default)]
    pub type_hint: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

/// Metadata describing a registered workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowMetadata {
    pub name: String,
    pub class_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSpec>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

/// Errors raised by registry lookups and parameter validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
}

/// Catalog of workflow classes and their metadata, keyed by the unique
/// registered name.
#[derive(Default)]
pub struct WorkflowRegistry {
    entries: HashMap<String, (WorkflowFactory, WorkflowMetadata)>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow factory under `metadata.name`. Duplicate
    /// names overwrite the earlier entry (last-wins), matching the
    /// source registry's documented either-or contract.
    pub fn register(&mut self, factory: WorkflowFactory, metadata: WorkflowMetadata) {
        self.entries.insert(metadata.name.clone(), (factory, metadata));
    }

    pub fn get_workflow_class(&self, name: &str) -> Option<(&WorkflowFactory, &WorkflowMetadata)> {
        self.entries.get(name).map(|(f, m)| (f, m))
    }

    pub fn list_workflows(&self) -> Vec<&WorkflowMetadata> {
        self.entries.values().map(|(_, m)| m).collect()
    }

    pub fn list_public_workflows(&self) -> Vec<&WorkflowMetadata> {
        self.entries
            .values()
            .map(|(_, m)| m)
            .filter(|m| m.is_public)
            .collect()
    }

    /// Validate `params` against the registered metadata for `name`
    /// and instantiate a fresh workflow. A `required: true` parameter
    /// absent from `params` fails with [`RegistryError::MissingParameter`]
    /// regardless of any configured `default` — nothing merges a
    /// declared default into the params a workflow actually receives,
    /// so treating a default as satisfying `required` would silently
    /// start a workflow without the parameter it asked for.
    pub fn instantiate(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Box<dyn Workflow>, RegistryError> {
        let (factory, metadata) = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownWorkflow(name.to_string()))?;

        for (param_name, spec) in &metadata.parameters {
            if spec.required && !params.contains_key(param_name) {
                return Err(RegistryError::MissingParameter(param_name.clone()));
            }
        }

        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::Transition;
    use crate::workflow::{params_from, StepFuture};
    use serde_json::json;

    struct Echo;
    impl Workflow for Echo {
        fn call_step<'a>(&'a mut self, _step: &'a str, _params: Params) -> StepFuture<'a> {
            Box::pin(async { Ok(Transition::end(json!(null))) })
        }
    }

    fn metadata(name: &str, required: &[&str]) -> WorkflowMetadata {
        WorkflowMetadata {
            name: name.to_string(),
            class_path: format!("workflows/{name}.rs:{name}"),
            description: String::new(),
            parameters: required
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        ParameterSpec {
                            type_hint: "string".into(),
                            required: true,
                            default: None,
                            description: String::new(),
                        },
                    )
                })
                .collect(),
            is_public: true,
        }
    }

    #[test]
    fn unknown_workflow_errors() {
        let registry = WorkflowRegistry::new();
        let err = registry
            .instantiate("missing", &params_from([]))
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownWorkflow("missing".into()));
    }

    #[test]
    fn missing_required_parameter_errors() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Arc::new(|| Box::new(Echo)), metadata("w", &["account_id"]));

        let err = registry.instantiate("w", &params_from([])).unwrap_err();
        assert_eq!(
            err,
            RegistryError::MissingParameter("account_id".into())
        );
    }

    #[test]
    fn required_parameter_present_succeeds() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Arc::new(|| Box::new(Echo)), metadata("w", &["account_id"]));

        let ok = registry.instantiate(
            "w",
            &params_from([("account_id".to_string(), json!("a"))]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn list_public_workflows_filters() {
        let mut registry = WorkflowRegistry::new();
        let mut private = metadata("secret", &[]);
        private.is_public = false;
        registry.register(Arc::new(|| Box::new(Echo)), metadata("public_one", &[]));
        registry.register(Arc::new(|| Box::new(Echo)), private);

        let listed = registry.list_public_workflows();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "public_one");
    }
}
