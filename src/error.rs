use std::time::Duration;

use thiserror::Error;

use crate::llm::FailureKind;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Model API error: {0}")]
    ModelApi(String),

    /// Every attempt of a completion failed. `source` is the backend error
    /// raised by the last attempt, if it raised one.
    #[error("Model completion failed after {attempts} attempts (last failure: {last_failure})")]
    CompletionExhausted {
        attempts: u32,
        last_failure: FailureKind,
        #[source]
        source: Option<Box<AppError>>,
    },

    #[error("Model completion timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::GitHubApi(e.to_string())
    }
}

impl AppError {
    /// Classification of a failed completion, if this error came from one.
    pub fn completion_failure(&self) -> Option<FailureKind> {
        match self {
            AppError::CompletionExhausted { last_failure, .. } => Some(*last_failure),
            AppError::Timeout { .. } => Some(FailureKind::Timeout),
            AppError::ModelApi(_) => Some(FailureKind::TransientError),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
