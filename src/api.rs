//! HTTP control surface
//!
//! A thin `axum` adapter over [`Engine`] and [`WorkflowRegistry`]. Every
//! handler does exactly what the corresponding engine/registry method
//! does; no business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::{Engine, EngineError};
use crate::registry::WorkflowRegistry;
use crate::transition::Params;
use crate::workflow::{WorkflowInfo, WorkflowStatus};

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub registry: Arc<WorkflowRegistry>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, registry: Arc<WorkflowRegistry>) -> Self {
        Self { engine, registry }
    }
}

/// Build the router. The caller is responsible for serving it (e.g.
/// via `axum::serve`) and for any outer middleware (CORS, tracing).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflows/available", get(list_available_workflows))
        .route("/workflows/:id", get(get_workflow))
        .route("/workflows/start/:name", post(start_workflow))
        .route("/workflows/:id/stop", post(stop_workflow))
        .route("/workflows/stop-all", post(stop_all_workflows))
        .route("/workflows/cleanup", post(cleanup_workflows))
        .route("/health", get(health))
        .with_state(state)
}

/// API-facing error, mapped to a JSON body plus status code.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownWorkflow(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            EngineError::MissingParameter(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListWorkflowsQuery {
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowList {
    pub workflows: Vec<WorkflowInfo>,
}

/// GET /workflows
async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<ListWorkflowsQuery>,
) -> Json<WorkflowList> {
    let mut workflows = Vec::new();
    for id in state.engine.all_workflow_ids().await {
        if let Some(info) = state.engine.get_workflow(id).await {
            if query.status.map_or(true, |s| s == info.status) {
                workflows.push(info);
            }
        }
    }
    Json(WorkflowList { workflows })
}

#[derive(Debug, Serialize)]
pub struct AvailableWorkflow {
    pub name: String,
    pub description: String,
    pub parameters: std::collections::HashMap<String, crate::registry::ParameterSpec>,
}

#[derive(Debug, Serialize)]
pub struct AvailableWorkflowList {
    pub workflows: Vec<AvailableWorkflow>,
}

/// GET /workflows/available
async fn list_available_workflows(State(state): State<AppState>) -> Json<AvailableWorkflowList> {
    let workflows = state
        .registry
        .list_public_workflows()
        .into_iter()
        .map(|m| AvailableWorkflow {
            name: m.name.clone(),
            description: m.description.clone(),
            parameters: m.parameters.clone(),
        })
        .collect();
    Json(AvailableWorkflowList { workflows })
}

/// GET /workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowInfo>, ApiError> {
    state
        .engine
        .get_workflow(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown workflow: {id}")))
}

#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
pub struct StartWorkflowResponse {
    pub workflow_id: Uuid,
}

/// POST /workflows/start/{name}
async fn start_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<StartWorkflowRequest>,
) -> Result<Json<StartWorkflowResponse>, ApiError> {
    let params: Params = match body.parameters {
        Value::Object(map) => map,
        Value::Null => Params::new(),
        _ => return Err(ApiError::new(StatusCode::BAD_REQUEST, "parameters must be an object")),
    };

    let workflow_id = state.engine.start_workflow_by_name(&name, params).await?;
    Ok(Json(StartWorkflowResponse { workflow_id }))
}

/// POST /workflows/{id}/stop
async fn stop_workflow(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    state.engine.stop_workflow(id).await;
    StatusCode::NO_CONTENT
}

/// POST /workflows/stop-all
async fn stop_all_workflows(State(state): State<AppState>) -> StatusCode {
    state.engine.stop_all_workflows().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub before: DateTime<Utc>,
}

/// POST /workflows/cleanup
async fn cleanup_workflows(
    State(state): State<AppState>,
    Json(body): Json<CleanupRequest>,
) -> StatusCode {
    state.engine.cleanup_old_workflows(body.before).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_workflows: usize,
    pub engine_running: bool,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_workflows: state.engine.active_workflow_count().await,
        engine_running: state.engine.is_running(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskQueue;
    use crate::storage::InMemoryWorkflowStorage;
    use crate::transition::Transition;
    use crate::workflow::{params_from, StepFuture, Workflow};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct Echo;
    impl Workflow for Echo {
        fn call_step<'a>(&'a mut self, _step: &'a str, _params: Params) -> StepFuture<'a> {
            Box::pin(async { Ok(Transition::end(json!("done"))) })
        }
    }

    fn test_state() -> AppState {
        let mut registry = WorkflowRegistry::new();
        registry.register(
            std::sync::Arc::new(|| Box::new(Echo)),
            crate::registry::WorkflowMetadata {
                name: "echo".to_string(),
                class_path: "workflows/echo.rs:Echo".to_string(),
                description: "echoes immediately".to_string(),
                parameters: Default::default(),
                is_public: true,
            },
        );
        let registry = Arc::new(registry);

        let engine = Arc::new(Engine::new(
            Arc::new(InMemoryWorkflowStorage::new()),
            Arc::new(TaskQueue::new()),
            Arc::clone(&registry),
        ));

        AppState::new(engine, registry)
    }

    #[tokio::test]
    async fn health_reports_engine_state() {
        let state = test_state();
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_unknown_workflow_returns_404() {
        let state = test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/workflows/start/does-not-exist")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_known_workflow_returns_id() {
        let state = test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/workflows/start/echo")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
