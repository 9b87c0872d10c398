use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// API token for the source-hosting service. Without it no test content
    /// is fetched at all.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    #[serde(default = "default_tests_repo")]
    pub tests_repo: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_github_api_base(),
            tests_repo: default_tests_repo(),
        }
    }
}

// Manual Debug impl to avoid leaking the API token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("tests_repo", &self.tests_repo)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_async_timeout_secs")]
    pub async_timeout_secs: u64,
    #[serde(default = "default_failure_sentinel")]
    pub failure_sentinel: String,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .field("async_timeout_secs", &self.async_timeout_secs)
            .field("failure_sentinel", &self.failure_sentinel)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_single_prompt_test_count")]
    pub max_single_prompt_test_count: usize,
    #[serde(default = "default_results_url_prefix")]
    pub results_url_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_single_prompt_test_count: default_max_single_prompt_test_count(),
            results_url_prefix: default_results_url_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    /// Header every task delivery must carry.
    #[serde(default = "default_origin_header")]
    pub origin_header: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            origin_header: default_origin_header(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// JSON file with the tracked features to load on startup.
    #[serde(default)]
    pub features_path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_tests_repo() -> String {
    "web-platform-tests/wpt".to_string()
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_async_timeout_secs() -> u64 {
    300
}

fn default_failure_sentinel() -> String {
    "GENERATION_FAILED".to_string()
}

fn default_batch_concurrency() -> usize {
    16
}

fn default_max_single_prompt_test_count() -> usize {
    10
}

fn default_results_url_prefix() -> String {
    "https://wpt.fyi/results".to_string()
}

fn default_origin_header() -> String {
    "x-appengine-queuename".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("wpt-coverage").required(false));
        }

        // Environment variable overrides with WPT_COVERAGE_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("WPT_COVERAGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gemini.max_attempts == 0 {
            return Err(AppError::Config(
                "gemini.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.gemini.batch_concurrency == 0 {
            return Err(AppError::Config(
                "gemini.batch_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

impl GeminiConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn async_timeout(&self) -> Duration {
        Duration::from_secs(self.async_timeout_secs)
    }
}

#[cfg(test)]
impl AppConfig {
    /// Defaults everywhere, with a placeholder model key.
    pub(crate) fn for_tests() -> Self {
        Self {
            server: ServerConfig::default(),
            github: GitHubConfig::default(),
            gemini: GeminiConfig {
                api_key: "test-key".to_string(),
                model: default_model(),
                api_base: default_gemini_api_base(),
                max_attempts: default_max_attempts(),
                backoff_base_secs: 0,
                async_timeout_secs: default_async_timeout_secs(),
                failure_sentinel: default_failure_sentinel(),
                batch_concurrency: default_batch_concurrency(),
            },
            pipeline: PipelineConfig::default(),
            task: TaskConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
