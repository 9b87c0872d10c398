use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::feature::Feature;
use crate::queue::task::Task;
use crate::server::AppState;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// `GET /api/v0/features/:id`
pub async fn get_feature(
    State(state): State<Arc<AppState>>,
    Path(feature_id): Path<i64>,
) -> Result<Json<Feature>, AppError> {
    state
        .store
        .get_feature(feature_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("feature {feature_id}")))
}

/// `POST /api/v0/features/:id/wpt-coverage-analysis`
///
/// Marks the feature in progress before queueing, so a restart in between
/// still picks it up on the startup scan.
pub async fn request_coverage_analysis(
    State(state): State<Arc<AppState>>,
    Path(feature_id): Path<i64>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.store.mark_in_progress(feature_id).await?;

    let queued = {
        let mut queue = state.task_queue.write().await;
        queue.enqueue(Task::EvaluateCoverage { feature_id })
    };

    tracing::info!(feature_id, queued, "Coverage analysis requested");

    let message = if queued {
        "Task enqueued."
    } else {
        "Task already pending."
    };
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": message }))))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::error::Result;
    use crate::feature::{CoverageStatus, Feature, FeatureStore, InMemoryFeatureStore};
    use crate::pipeline::EvaluationPipeline;
    use crate::server::{create_router, AppState};
    use crate::task::PipelineFactory;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct UnusedFactory;

    impl PipelineFactory for UnusedFactory {
        fn build(&self) -> Result<EvaluationPipeline> {
            unreachable!("no evaluation runs in these tests")
        }
    }

    fn state() -> (Arc<AppState>, Arc<InMemoryFeatureStore>) {
        let store = Arc::new(InMemoryFeatureStore::new(vec![Feature {
            id: 12,
            name: "Popover hint".to_string(),
            ..Feature::default()
        }]));
        let state = AppState::with_services(
            AppConfig::for_tests(),
            store.clone(),
            Arc::new(UnusedFactory),
        );
        (Arc::new(state), store)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_analysis_marks_and_enqueues() {
        let (state, store) = state();

        let response = create_router(state.clone())
            .oneshot(request("POST", "/api/v0/features/12/wpt-coverage-analysis"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let feature = store.get_feature(12).await.unwrap().unwrap();
        assert_eq!(feature.ai_coverage_status, CoverageStatus::InProgress);
        assert!(feature.ai_coverage_status_timestamp.is_some());
        assert_eq!(state.task_queue.read().await.len(), 1);

        // A second request while the first is still queued is not doubled.
        let response = create_router(state.clone())
            .oneshot(request("POST", "/api/v0/features/12/wpt-coverage-analysis"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(state.task_queue.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_request_analysis_unknown_feature() {
        let (state, _) = state();

        let response = create_router(state.clone())
            .oneshot(request("POST", "/api/v0/features/404/wpt-coverage-analysis"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.task_queue.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_feature() {
        let (state, _) = state();

        let response = create_router(state.clone())
            .oneshot(request("GET", "/api/v0/features/12"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let feature: Feature = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(feature.name, "Popover hint");
        assert_eq!(feature.ai_coverage_status, CoverageStatus::Pending);

        let response = create_router(state)
            .oneshot(request("GET", "/api/v0/features/13"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
