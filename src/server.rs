use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::feature::{FeatureStore, InMemoryFeatureStore};
use crate::queue::TaskQueue;
use crate::task::{LivePipelineFactory, PipelineFactory};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn FeatureStore>,
    pub pipelines: Arc<dyn PipelineFactory>,
    pub task_queue: RwLock<TaskQueue>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> crate::error::Result<Self> {
        let store = match &config.store.features_path {
            Some(path) => InMemoryFeatureStore::load(path).await?,
            None => {
                tracing::warn!("No features file configured, starting with an empty store");
                InMemoryFeatureStore::default()
            }
        };
        let pipelines = LivePipelineFactory::new(&config)?;

        Ok(Self::with_services(
            config,
            Arc::new(store),
            Arc::new(pipelines),
        ))
    }

    pub fn with_services(
        config: AppConfig,
        store: Arc<dyn FeatureStore>,
        pipelines: Arc<dyn PipelineFactory>,
    ) -> Self {
        Self {
            config,
            store,
            pipelines,
            task_queue: RwLock::new(TaskQueue::new()),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/tasks/generate-wpt-coverage-evaluation",
            post(crate::task::handler::handle_task),
        )
        .route("/api/v0/features/:id", get(crate::api::get_feature))
        .route(
            "/api/v0/features/:id/wpt-coverage-analysis",
            post(crate::api::request_coverage_analysis),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
