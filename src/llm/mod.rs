pub mod client;
pub mod gemini;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{CompletionPolicy, TextCompletionClient};

/// A remote generative text backend.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Run one generation call. `Ok(None)` means the backend answered but
    /// produced no text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

/// Why a completion did not produce usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TransientError,
    EmptyResponse,
    SentinelFailure,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TransientError => "transient-error",
            FailureKind::EmptyResponse => "empty-response",
            FailureKind::SentinelFailure => "sentinel-failure",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Classified outcome of a single backend answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    Text(String),
    EmptyResponse,
    SentinelFailure(String),
}

/// Sort a backend answer into usable text, an empty answer, or a backend
/// reported synthesis failure (text starting with `sentinel`).
pub fn classify_response(text: Option<String>, sentinel: &str) -> ResponseClass {
    match text {
        None => ResponseClass::EmptyResponse,
        Some(text) if text.trim().is_empty() => ResponseClass::EmptyResponse,
        Some(text) if !sentinel.is_empty() && text.trim_start().starts_with(sentinel) => {
            ResponseClass::SentinelFailure(text)
        }
        Some(text) => ResponseClass::Text(text),
    }
}
