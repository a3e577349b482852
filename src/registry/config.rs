//! `workflows.yml` document model and loader
//!
//! A statically typed target can't dynamically `import` an arbitrary
//! source file and pull a class out of it the way the original
//! `importlib`-based loader does. Instead, the caller supplies a map
//! of compile-time-known factories keyed by `class` name; the `file`
//! field is retained only as part of the diagnostic `class_path`
//! string, never read from disk. Everything else — resolution order,
//! last-wins on duplicate names, `public`/`required`/`default`
//! defaults — is preserved exactly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::{ParameterSpec, WorkflowFactory, WorkflowMetadata, WorkflowRegistry};

/// Errors raised while loading `workflows.yml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(default = "default_workflows_dir")]
    workflows_dir: PathBuf,
    #[serde(default)]
    workflows: Vec<WorkflowEntry>,
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from("workflows")
}

#[derive(Debug, Deserialize)]
struct WorkflowEntry {
    name: String,
    file: String,
    class: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    public: bool,
    #[serde(default)]
    parameters: HashMap<String, ParameterSpec>,
}

fn default_true() -> bool {
    true
}

/// Resolve the configuration path per the documented order: the
/// caller-supplied path if given, else `./workflows.yml`, else
/// `../workflows.yml`, else `None` (no config found, zero workflows
/// registered).
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    for candidate in [Path::new("workflows.yml"), Path::new("../workflows.yml")] {
        if candidate.exists() {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

/// Load workflow entries from `path` into `registry`, resolving each
/// entry's `class` against `constructors`. Unknown entries are not a
/// hard failure by default — see [`load_from_config`]'s contract.
fn load_document(
    path: &Path,
    constructors: &HashMap<&str, WorkflowFactory>,
    registry: &mut WorkflowRegistry,
) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let doc: ConfigDocument = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let workflows_dir = if doc.workflows_dir.is_absolute() {
        doc.workflows_dir.clone()
    } else {
        path.parent()
            .map(|dir| dir.join(&doc.workflows_dir))
            .unwrap_or_else(|| doc.workflows_dir.clone())
    };

    for entry in doc.workflows {
        let module_path = workflows_dir.join(&entry.file);
        info!(name = %entry.name, class = %entry.class, path = %module_path.display(), "registering workflow");

        let Some(factory) = constructors.get(entry.class.as_str()) else {
            warn!(name = %entry.name, class = %entry.class, "no constructor registered for class, skipping");
            continue;
        };

        let metadata = WorkflowMetadata {
            name: entry.name.clone(),
            class_path: format!("{}:{}", module_path.display(), entry.class),
            description: entry.description,
            parameters: entry.parameters,
            is_public: entry.public,
        };

        registry.register(factory.clone(), metadata);
    }

    Ok(())
}

/// Load workflows from the resolved configuration document. If no
/// configuration file can be found at any of the documented
/// locations, this is not an error — it leaves `registry` with
/// whatever was already registered (possibly nothing).
pub fn load_from_config(
    explicit_path: Option<&Path>,
    constructors: HashMap<&str, WorkflowFactory>,
    registry: &mut WorkflowRegistry,
) -> Result<(), ConfigError> {
    match resolve_config_path(explicit_path) {
        Some(path) => load_document(&path, &constructors, registry),
        None => {
            info!("no workflows.yml found; no workflows registered from config");
            Ok(())
        }
    }
}
