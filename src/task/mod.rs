pub mod handler;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::fetch::github::GitHubSourceHost;
use crate::fetch::web::HttpWebClient;
use crate::fetch::{ContentFetcher, SourceHost, WebClient};
use crate::llm::gemini::GeminiBackend;
use crate::llm::{CompletionPolicy, TextCompletionClient};
use crate::pipeline::EvaluationPipeline;
use crate::spec_source::SpecResolver;

/// Builds a fresh [`EvaluationPipeline`] for each run.
pub trait PipelineFactory: Send + Sync {
    fn build(&self) -> Result<EvaluationPipeline>;
}

/// Production wiring: Gemini for completions, GitHub for test files.
///
/// The fetch collaborators hold no per-run state and are shared; the model
/// client, and with it the backend session, is created per run.
pub struct LivePipelineFactory {
    config: AppConfig,
    host: Arc<dyn SourceHost>,
    web: Arc<dyn WebClient>,
}

impl LivePipelineFactory {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if config.github_token().is_none() {
            tracing::warn!("No GitHub token configured; test files will not be fetched");
        }

        Ok(Self {
            config: config.clone(),
            host: Arc::new(GitHubSourceHost::new(&config.github)?),
            web: Arc::new(HttpWebClient::new()?),
        })
    }
}

impl PipelineFactory for LivePipelineFactory {
    fn build(&self) -> Result<EvaluationPipeline> {
        let backend = GeminiBackend::new(&self.config.gemini)?;
        tracing::debug!(model = backend.model(), "Opened model session");

        let client = TextCompletionClient::new(
            Arc::new(backend),
            CompletionPolicy::from_config(&self.config.gemini),
        );

        Ok(EvaluationPipeline::new(
            client,
            ContentFetcher::new(Arc::clone(&self.host), Arc::clone(&self.web)),
            SpecResolver::new(Arc::clone(&self.web)),
            self.config.pipeline.clone(),
        ))
    }
}
