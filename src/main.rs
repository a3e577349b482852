use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use stepwire::api;
use stepwire::engine::Engine;
use stepwire::queue::TaskQueue;
use stepwire::registry::{load_from_config, WorkflowFactory, WorkflowRegistry};
use stepwire::storage::InMemoryWorkflowStorage;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepwire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("stepwire starting...");

    // Compile-time known workflow factories. A real deployment would
    // list every workflow type it ships here; there is no dynamic
    // source loading (see registry::config module docs).
    let constructors: std::collections::HashMap<&str, WorkflowFactory> = std::collections::HashMap::new();

    let mut registry = WorkflowRegistry::new();
    let explicit_path = std::env::var("WORKFLOWS_CONFIG").ok().map(PathBuf::from);
    load_from_config(explicit_path.as_deref(), constructors, &mut registry)?;
    let registry = Arc::new(registry);

    let engine = Arc::new(Engine::new(
        Arc::new(InMemoryWorkflowStorage::new()),
        Arc::new(TaskQueue::new()),
        Arc::clone(&registry),
    ));

    let app = api::router(api::AppState::new(Arc::clone(&engine), registry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    engine.shutdown().await;
    Ok(())
}
