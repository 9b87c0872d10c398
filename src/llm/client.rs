use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::config::GeminiConfig;
use crate::error::{AppError, Result};
use crate::llm::{classify_response, FailureKind, ResponseClass, TextBackend};
use crate::prompt::PromptRequest;

/// Retry, backoff and deadline settings for a [`TextCompletionClient`].
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubled after each further one.
    pub backoff_base: Duration,
    /// Overall deadline applied by [`TextCompletionClient::complete_with_deadline`].
    pub timeout: Duration,
    pub failure_sentinel: String,
    /// Upper bound on prompts in flight during a batch.
    pub batch_concurrency: usize,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
            failure_sentinel: "GENERATION_FAILED".to_string(),
            batch_concurrency: 16,
        }
    }
}

impl CompletionPolicy {
    pub fn from_config(config: &GeminiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            timeout: config.async_timeout(),
            failure_sentinel: config.failure_sentinel.clone(),
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_failure_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.failure_sentinel = sentinel.into();
        self
    }

    #[must_use]
    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// Obtains text completions from a [`TextBackend`] with bounded retries.
///
/// The client owns the backend session; it is released when the client goes
/// out of scope.
pub struct TextCompletionClient {
    backend: Arc<dyn TextBackend>,
    policy: CompletionPolicy,
}

impl TextCompletionClient {
    pub fn new(backend: Arc<dyn TextBackend>, policy: CompletionPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    /// Run the attempt loop for one prompt.
    ///
    /// Backend errors, empty answers and sentinel failures are all retried
    /// after an exponential backoff. When every attempt fails the error is
    /// [`AppError::CompletionExhausted`], carrying the last backend error if
    /// the final attempt raised one.
    pub async fn complete(&self, prompt: &PromptRequest) -> Result<String> {
        let max_attempts = self.policy.max_attempts;

        tracing::info!(
            role = %prompt.role(),
            prompt_chars = prompt.text().len(),
            "Sending prompt to model"
        );
        tracing::debug!(role = %prompt.role(), prompt = %prompt.text(), "Prompt text");

        let mut last_failure = FailureKind::TransientError;
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=max_attempts {
            match self.backend.generate(prompt.text()).await {
                Ok(response) => match classify_response(response, &self.policy.failure_sentinel) {
                    ResponseClass::Text(text) => {
                        tracing::info!(
                            role = %prompt.role(),
                            attempt,
                            response_chars = text.len(),
                            "Model response received"
                        );
                        return Ok(text);
                    }
                    ResponseClass::EmptyResponse => {
                        tracing::warn!(role = %prompt.role(), attempt, "Model returned no text");
                        last_failure = FailureKind::EmptyResponse;
                        last_error = None;
                    }
                    ResponseClass::SentinelFailure(text) => {
                        tracing::warn!(
                            role = %prompt.role(),
                            attempt,
                            response = %text,
                            "Model reported a synthesis failure"
                        );
                        last_failure = FailureKind::SentinelFailure;
                        last_error = None;
                    }
                },
                Err(e) => {
                    tracing::error!(
                        role = %prompt.role(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Model call failed"
                    );
                    last_failure = FailureKind::TransientError;
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                tracing::info!(
                    attempt,
                    delay = ?delay,
                    "Retrying model call after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            role = %prompt.role(),
            attempts = max_attempts,
            last_failure = %last_failure,
            "Model call attempts exhausted"
        );

        Err(AppError::CompletionExhausted {
            attempts: max_attempts,
            last_failure,
            source: last_error.map(Box::new),
        })
    }

    /// [`complete`](Self::complete) under the policy's overall deadline.
    ///
    /// When the deadline elapses the attempt loop is dropped mid-flight, so
    /// no further attempts run, and [`AppError::Timeout`] is returned.
    pub async fn complete_with_deadline(&self, prompt: &PromptRequest) -> Result<String> {
        let timeout = self.policy.timeout;
        match tokio::time::timeout(timeout, self.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    role = %prompt.role(),
                    timeout = ?timeout,
                    "Model call timed out"
                );
                Err(AppError::Timeout { elapsed: timeout })
            }
        }
    }

    /// Complete every prompt concurrently. The output has one slot per input,
    /// in input order; a failed prompt leaves its error in its slot and does
    /// not affect the others.
    pub async fn complete_batch(&self, prompts: &[PromptRequest]) -> Vec<Result<String>> {
        tracing::info!(count = prompts.len(), "Starting batch completion");

        let calls: Vec<_> = prompts
            .iter()
            .map(|prompt| self.complete_with_deadline(prompt))
            .collect();
        let results: Vec<Result<String>> = stream::iter(calls)
        .buffered(self.policy.batch_concurrency)
        .collect()
        .await;

        tracing::info!(count = results.len(), "Batch completion finished");
        results
    }
}
