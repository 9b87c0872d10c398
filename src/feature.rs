use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};

/// Status of a feature's coverage evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// A tracked feature, as far as the coverage evaluation cares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub spec_link: String,
    /// Free text describing the feature's tests; holds the results URLs.
    #[serde(default)]
    pub wpt_descr: String,
    #[serde(default)]
    pub ai_coverage_status: CoverageStatus,
    #[serde(default)]
    pub ai_coverage_status_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_coverage_report: Option<String>,
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn get_feature(&self, id: i64) -> Result<Option<Feature>>;

    async fn list_features(&self) -> Result<Vec<Feature>>;

    /// Flag a feature as queued for evaluation.
    async fn mark_in_progress(&self, id: i64) -> Result<()>;

    /// Overwrite status, status timestamp and report in one step.
    async fn write_evaluation(&self, id: i64, status: CoverageStatus, report: String)
        -> Result<()>;
}

/// Feature store kept in memory, optionally seeded from a JSON file.
#[derive(Default)]
pub struct InMemoryFeatureStore {
    features: RwLock<BTreeMap<i64, Feature>>,
}

impl InMemoryFeatureStore {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: RwLock::new(features.into_iter().map(|f| (f.id, f)).collect()),
        }
    }

    /// Load a JSON array of features.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read features file {}: {e}", path.display()))
        })?;
        let features: Vec<Feature> = serde_json::from_str(&raw)?;
        tracing::info!(count = features.len(), path = %path.display(), "Loaded features");
        Ok(Self::new(features))
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn get_feature(&self, id: i64) -> Result<Option<Feature>> {
        Ok(self.features.read().await.get(&id).cloned())
    }

    async fn list_features(&self) -> Result<Vec<Feature>> {
        Ok(self.features.read().await.values().cloned().collect())
    }

    async fn mark_in_progress(&self, id: i64) -> Result<()> {
        let mut features = self.features.write().await;
        let feature = features
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("feature {id}")))?;
        feature.ai_coverage_status = CoverageStatus::InProgress;
        feature.ai_coverage_status_timestamp = Some(Utc::now());
        Ok(())
    }

    async fn write_evaluation(
        &self,
        id: i64,
        status: CoverageStatus,
        report: String,
    ) -> Result<()> {
        let mut features = self.features.write().await;
        let feature = features
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("feature {id}")))?;
        feature.ai_coverage_status = status;
        feature.ai_coverage_status_timestamp = Some(Utc::now());
        feature.ai_coverage_report = Some(report);
        Ok(())
    }
}
