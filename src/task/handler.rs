use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::feature::CoverageStatus;
use crate::pipeline::EvaluationOutcome;
use crate::server::AppState;

const FAILED_REPORT_PREFIX: &str = "Web Platform Tests coverage evaluation report failed to generate";

#[derive(Debug, Deserialize)]
struct TaskPayload {
    feature_id: i64,
}

/// Task endpoint invoked by the delivery system.
pub async fn handle_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, Json<Value>) {
    if !headers.contains_key(state.config.task.origin_header.as_str()) {
        tracing::warn!(
            header = %state.config.task.origin_header,
            "Task request missing origin header"
        );
        return reply(StatusCode::FORBIDDEN, "Missing task origin header.");
    }

    let payload: TaskPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid task payload");
            return reply(StatusCode::BAD_REQUEST, "Request body must contain an integer feature_id.");
        }
    };

    match process_feature(&state, payload.feature_id).await {
        Ok(message) => reply(StatusCode::OK, &message),
        Err(AppError::NotFound(what)) => {
            tracing::warn!(feature_id = payload.feature_id, "Task for unknown feature");
            reply(StatusCode::NOT_FOUND, &format!("Not found: {what}"))
        }
        Err(e) => {
            tracing::error!(feature_id = payload.feature_id, error = %e, "Task failed");
            reply(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn reply(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

/// Evaluate one feature and persist the outcome.
///
/// Whatever happens inside the pipeline, including a panic, the feature ends
/// with a terminal status and a report. Errors returned here are only those
/// of the store itself, or an unknown feature.
pub async fn process_feature(state: &AppState, feature_id: i64) -> Result<String> {
    let feature = state
        .store
        .get_feature(feature_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("feature {feature_id}")))?;

    let outcome = {
        let run = async {
            // The pipeline, and the model session it owns, lives for this
            // block only.
            match state.pipelines.build() {
                Ok(pipeline) => pipeline.run(&feature).await,
                Err(e) => EvaluationOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        };
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(feature_id, panic = %detail, "Coverage evaluation panicked");
                EvaluationOutcome::Failed {
                    reason: format!("internal error: {detail}"),
                }
            }
        }
    };

    let (status, report) = match outcome {
        EvaluationOutcome::Complete { report } => (CoverageStatus::Complete, report),
        EvaluationOutcome::Failed { reason } => (
            CoverageStatus::Failed,
            format!("{FAILED_REPORT_PREFIX}: {reason}"),
        ),
    };

    state
        .store
        .write_evaluation(feature_id, status, report)
        .await?;

    tracing::info!(feature_id, status = ?status, "Stored coverage evaluation");

    Ok(match status {
        CoverageStatus::Complete => {
            format!("Coverage evaluation for feature {feature_id} complete.")
        }
        _ => format!("Coverage evaluation for feature {feature_id} failed."),
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
