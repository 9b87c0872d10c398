use std::sync::Arc;

use crate::feature::CoverageStatus;
use crate::queue::task::Task;
use crate::server::AppState;

/// Re-enqueue features left in progress, so evaluations interrupted by a
/// restart still reach a final status. Returns how many were enqueued.
pub async fn scan_pending_features(state: &Arc<AppState>) -> usize {
    tracing::info!("Scanning for features with an evaluation in progress...");

    let features = match state.store.list_features().await {
        Ok(features) => features,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list features on startup");
            return 0;
        }
    };

    let mut enqueued = 0;
    for feature in features
        .into_iter()
        .filter(|f| f.ai_coverage_status == CoverageStatus::InProgress)
    {
        tracing::info!(
            feature_id = feature.id,
            name = %feature.name,
            "Enqueuing interrupted evaluation"
        );

        let mut queue = state.task_queue.write().await;
        if queue.enqueue(Task::EvaluateCoverage {
            feature_id: feature.id,
        }) {
            enqueued += 1;
        }
    }

    tracing::info!(count = enqueued, "Startup scan complete");
    enqueued
}
