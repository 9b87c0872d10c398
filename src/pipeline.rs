use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::feature::Feature;
use crate::fetch::locations::{extract_results_paths, split_locations};
use crate::fetch::ContentFetcher;
use crate::llm::TextCompletionClient;
use crate::prompt::{self, PromptRequest};
use crate::spec_source::SpecResolver;

/// Result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The gap analysis report.
    Complete { report: String },
    /// Why no report could be produced.
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One prompt with every test and dependency file.
    Unified,
    /// One analysis prompt per test file, merged by a gap-analysis prompt.
    MultiPrompt,
}

pub fn select_strategy(test_count: usize, max_single_prompt_test_count: usize) -> Strategy {
    if test_count <= max_single_prompt_test_count {
        Strategy::Unified
    } else {
        Strategy::MultiPrompt
    }
}

/// Prompts of the multi-prompt strategy's batch stage.
///
/// The spec-synthesis prompt is kept apart from the per-test prompts and is
/// always submitted last; [`AnalysisBatch::split_results`] is the only place
/// that relies on that position.
#[derive(Debug, Clone)]
pub struct AnalysisBatch {
    test_analyses: Vec<PromptRequest>,
    spec_synthesis: PromptRequest,
}

/// Batch results, separated back into their stages.
#[derive(Debug)]
pub struct AnalysisResults {
    pub spec_synthesis: Result<String>,
    pub test_analyses: Vec<Result<String>>,
}

impl AnalysisBatch {
    pub fn new(
        feature: &Feature,
        spec_content: &str,
        test_files: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            test_analyses: test_files
                .iter()
                .map(|(path, content)| prompt::test_analysis_prompt(path, content))
                .collect(),
            spec_synthesis: prompt::spec_synthesis_prompt(feature, spec_content),
        }
    }

    /// Prompts in submission order.
    pub fn prompts(&self) -> Vec<PromptRequest> {
        let mut prompts = self.test_analyses.clone();
        prompts.push(self.spec_synthesis.clone());
        prompts
    }

    pub fn split_results(&self, mut results: Vec<Result<String>>) -> Result<AnalysisResults> {
        if results.len() != self.test_analyses.len() + 1 {
            return Err(AppError::Internal(format!(
                "Expected {} batch results, got {}",
                self.test_analyses.len() + 1,
                results.len()
            )));
        }
        let spec_synthesis = results
            .pop()
            .ok_or_else(|| AppError::Internal("Empty batch results".to_string()))?;
        Ok(AnalysisResults {
            spec_synthesis,
            test_analyses: results,
        })
    }
}

/// Concatenate the successful test analyses, numbered densely from 1 in
/// their original order. Fails when none succeeded.
pub fn merge_test_analyses(results: Vec<Result<String>>) -> Result<String> {
    let mut merged = String::new();
    let mut survivors = 0usize;

    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(text) => {
                survivors += 1;
                merged.push_str(&format!("Test {survivors} summary:\n{text}\n\n"));
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Discarding failed test analysis");
            }
        }
    }

    if survivors == 0 {
        return Err(AppError::Pipeline(
            "no successful test analysis responses".to_string(),
        ));
    }
    Ok(merged)
}

/// Produces the coverage evaluation of a single feature.
pub struct EvaluationPipeline {
    client: TextCompletionClient,
    fetcher: ContentFetcher,
    spec_resolver: SpecResolver,
    config: PipelineConfig,
}

impl EvaluationPipeline {
    pub fn new(
        client: TextCompletionClient,
        fetcher: ContentFetcher,
        spec_resolver: SpecResolver,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            fetcher,
            spec_resolver,
            config,
        }
    }

    /// Evaluate `feature`. Every error is folded into
    /// [`EvaluationOutcome::Failed`].
    pub async fn run(&self, feature: &Feature) -> EvaluationOutcome {
        tracing::info!(feature_id = feature.id, "Starting coverage evaluation");

        match self.evaluate(feature).await {
            Ok(report) => {
                tracing::info!(
                    feature_id = feature.id,
                    report_chars = report.len(),
                    "Coverage evaluation complete"
                );
                EvaluationOutcome::Complete { report }
            }
            Err(e) => {
                tracing::error!(feature_id = feature.id, error = %e, "Coverage evaluation failed");
                let reason = match e {
                    AppError::Validation(msg) | AppError::Pipeline(msg) => msg,
                    other => other.to_string(),
                };
                EvaluationOutcome::Failed { reason }
            }
        }
    }

    async fn evaluate(&self, feature: &Feature) -> Result<String> {
        if feature.spec_link.trim().is_empty() {
            return Err(AppError::Validation("no spec URL provided".to_string()));
        }

        let paths = extract_results_paths(&feature.wpt_descr, &self.config.results_url_prefix)?;
        if paths.is_empty() {
            return Err(AppError::Validation(
                "no valid results URLs found".to_string(),
            ));
        }

        let (directories, files) = split_locations(&paths);
        let test_files = self.fetcher.fetch_mixed(&directories, &files).await;

        let strategy = select_strategy(test_files.len(), self.config.max_single_prompt_test_count);
        tracing::info!(
            feature_id = feature.id,
            test_files = test_files.len(),
            strategy = ?strategy,
            "Selected evaluation strategy"
        );

        match strategy {
            Strategy::Unified => self.run_unified(feature, &test_files).await,
            Strategy::MultiPrompt => self.run_multi_prompt(feature, &test_files).await,
        }
    }

    async fn run_unified(
        &self,
        feature: &Feature,
        test_files: &BTreeMap<String, String>,
    ) -> Result<String> {
        let dependency_files = self.fetcher.fetch_dependencies(test_files).await;
        let prompt = prompt::unified_prompt(feature, test_files, &dependency_files);
        self.client.complete(&prompt).await
    }

    async fn run_multi_prompt(
        &self,
        feature: &Feature,
        test_files: &BTreeMap<String, String>,
    ) -> Result<String> {
        let spec_content = self.spec_resolver.resolve(&feature.spec_link).await;

        let batch = AnalysisBatch::new(feature, &spec_content, test_files);
        let results = self.client.complete_batch(&batch.prompts()).await;
        let AnalysisResults {
            spec_synthesis,
            test_analyses,
        } = batch.split_results(results)?;

        let spec_synthesis = spec_synthesis.map_err(|e| {
            AppError::Pipeline(format!("spec synthesis prompt failure: {e}"))
        })?;
        let test_summaries = merge_test_analyses(test_analyses)?;

        let gap_prompt = prompt::gap_analysis_prompt(&spec_synthesis, &test_summaries);
        self.client.complete_with_deadline(&gap_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{file, FakeHost, FakeWeb};
    use crate::llm::{CompletionPolicy, TextBackend};
    use crate::prompt::PromptRole;
    use crate::testing::CapturedLogs;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::Level;

    const SPEC_MARKER: &str = "Summarize the testable, normative requirements";
    const GAP_MARKER: &str = "produce a coverage gap analysis";
    const TEST_MARKER: &str = "## Test file `";

    /// Answers by prompt kind and records every prompt it receives.
    #[derive(Default)]
    struct StageBackend {
        failing_tests: Vec<String>,
        fail_spec: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl StageBackend {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        fn count(&self, marker: &str) -> usize {
            self.prompts().iter().filter(|p| p.contains(marker)).count()
        }
    }

    #[async_trait]
    impl TextBackend for StageBackend {
        async fn generate(&self, prompt: &str) -> Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());

            if prompt.contains(SPEC_MARKER) {
                if self.fail_spec {
                    return Err(AppError::ModelApi("spec stage down".to_string()));
                }
                return Ok(Some("SPEC REQUIREMENTS".to_string()));
            }
            if let Some(rest) = prompt.split(TEST_MARKER).nth(1) {
                let path = rest.split('`').next().unwrap_or_default();
                if self.failing_tests.iter().any(|f| f == path) {
                    return Err(AppError::ModelApi(format!("analysis of {path} failed")));
                }
                return Ok(Some(format!("summary of {path}")));
            }
            if prompt.contains(GAP_MARKER) {
                return Ok(Some("GAP REPORT".to_string()));
            }
            Ok(Some("UNIFIED REPORT".to_string()))
        }
    }

    fn feature(wpt_descr: &str) -> Feature {
        Feature {
            id: 42,
            name: "Grid lanes".to_string(),
            summary: "Masonry style layout".to_string(),
            spec_link: "https://spec.example.com".to_string(),
            wpt_descr: wpt_descr.to_string(),
            ..Feature::default()
        }
    }

    /// Host with one directory `css/lanes` holding `count` test files.
    fn repo(count: usize) -> (FakeHost, FakeWeb) {
        let mut web = FakeWeb::default();
        let mut entries = Vec::new();
        for i in 0..count {
            let path = format!("css/lanes/t{i:02}.html");
            let url = format!("https://raw.test/{path}");
            web = web.with_page(&url, &format!("<p>test {i}</p>"));
            entries.push(file(&path, &url));
        }
        (FakeHost::authorized().with_directory("css/lanes", entries), web)
    }

    fn pipeline(
        backend: Arc<StageBackend>,
        host: FakeHost,
        web: FakeWeb,
    ) -> (EvaluationPipeline, Arc<FakeHost>) {
        let host = Arc::new(host);
        let web = Arc::new(web);
        let policy = CompletionPolicy::default()
            .with_backoff_base(Duration::ZERO)
            .with_max_attempts(1);
        let pipeline = EvaluationPipeline::new(
            TextCompletionClient::new(backend, policy),
            ContentFetcher::new(host.clone(), web.clone()),
            SpecResolver::new(web),
            PipelineConfig::default(),
        );
        (pipeline, host)
    }

    const LANES_URL: &str = "Tests: https://wpt.fyi/results/css/lanes?label=master";

    #[test]
    fn test_strategy_threshold() {
        assert_eq!(select_strategy(0, 10), Strategy::Unified);
        assert_eq!(select_strategy(10, 10), Strategy::Unified);
        assert_eq!(select_strategy(11, 10), Strategy::MultiPrompt);
    }

    #[test]
    fn test_spec_synthesis_always_submitted_last() {
        let f = feature("");
        for count in [0usize, 1, 5, 11, 30] {
            let files: BTreeMap<String, String> = (0..count)
                .rev()
                .map(|i| (format!("t{i}.html"), format!("content {i}")))
                .collect();
            let batch = AnalysisBatch::new(&f, "spec", &files);
            let prompts = batch.prompts();

            assert_eq!(prompts.len(), count + 1);
            assert_eq!(prompts.last().unwrap().role(), PromptRole::SpecSynthesis);
            assert!(prompts[..count]
                .iter()
                .all(|p| p.role() == PromptRole::TestAnalysis));
        }
    }

    #[test]
    fn test_split_results_separates_spec_synthesis() {
        let files = BTreeMap::from([
            ("a.html".to_string(), "a".to_string()),
            ("b.html".to_string(), "b".to_string()),
        ]);
        let batch = AnalysisBatch::new(&feature(""), "spec", &files);

        let results = batch
            .split_results(vec![
                Ok("a summary".to_string()),
                Err(AppError::Timeout {
                    elapsed: Duration::from_secs(1),
                }),
                Ok("spec summary".to_string()),
            ])
            .unwrap();

        assert_eq!(results.spec_synthesis.unwrap(), "spec summary");
        assert_eq!(results.test_analyses.len(), 2);
        assert!(batch.split_results(vec![Ok("x".to_string())]).is_err());
    }

    #[test]
    fn test_merge_renumbers_survivors_densely() {
        let merged = merge_test_analyses(vec![
            Ok("first".to_string()),
            Err(AppError::Timeout {
                elapsed: Duration::from_secs(1),
            }),
            Ok("third".to_string()),
        ])
        .unwrap();

        assert_eq!(
            merged,
            "Test 1 summary:\nfirst\n\nTest 2 summary:\nthird\n\n"
        );
    }

    #[test]
    fn test_merge_fails_without_survivors() {
        let err = merge_test_analyses(vec![Err(AppError::Timeout {
            elapsed: Duration::from_secs(1),
        })])
        .unwrap_err();
        assert_eq!(err.to_string(), "Pipeline error: no successful test analysis responses");
    }

    #[tokio::test]
    async fn test_end_to_end_unified() {
        let backend = Arc::new(StageBackend::default());
        let (host, web) = repo(1);
        let (pipeline, _) = pipeline(backend.clone(), host, web);

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Complete {
                report: "UNIFIED REPORT".to_string()
            }
        );
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("https://spec.example.com"));
        assert!(prompts[0].contains("<p>test 0</p>"));
    }

    #[tokio::test]
    async fn test_ten_files_use_unified() {
        let backend = Arc::new(StageBackend::default());
        let (host, web) = repo(10);
        let (pipeline, _) = pipeline(backend.clone(), host, web);

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Complete {
                report: "UNIFIED REPORT".to_string()
            }
        );
        assert_eq!(backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_eleven_files_use_multi_prompt() {
        let backend = Arc::new(StageBackend::default());
        let (host, web) = repo(11);
        let (pipeline, _) = pipeline(backend.clone(), host, web);

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Complete {
                report: "GAP REPORT".to_string()
            }
        );
        assert_eq!(backend.count(TEST_MARKER), 11);
        assert_eq!(backend.count(SPEC_MARKER), 1);
        assert_eq!(backend.count(GAP_MARKER), 1);

        let prompts = backend.prompts();
        let spec_prompt = prompts.iter().find(|p| p.contains(SPEC_MARKER)).unwrap();
        // The spec page is not served, so the fetch error is embedded.
        assert!(spec_prompt.contains("Error: could not fetch URL"));

        let gap_prompt = prompts.iter().find(|p| p.contains(GAP_MARKER)).unwrap();
        assert!(gap_prompt.contains("SPEC REQUIREMENTS"));
        assert!(gap_prompt.contains("Test 1 summary:\nsummary of css/lanes/t00.html"));
        assert!(gap_prompt.contains("Test 11 summary:\nsummary of css/lanes/t10.html"));
    }

    #[tokio::test]
    async fn test_partial_survival_renumbers() {
        let backend = Arc::new(StageBackend {
            failing_tests: vec!["css/lanes/t01.html".to_string()],
            ..StageBackend::default()
        });
        let (host, web) = repo(3);
        let (mut pipeline, _) = pipeline(backend.clone(), host, web);
        pipeline.config.max_single_prompt_test_count = 2;
        let (logs, _guard) = CapturedLogs::install();

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        assert_eq!(
            logs.count(Level::WARN, "Discarding failed test analysis"),
            1
        );

        assert_eq!(
            outcome,
            EvaluationOutcome::Complete {
                report: "GAP REPORT".to_string()
            }
        );
        let prompts = backend.prompts();
        let gap_prompt = prompts.iter().find(|p| p.contains(GAP_MARKER)).unwrap();
        assert!(gap_prompt.contains("Test 1 summary:\nsummary of css/lanes/t00.html"));
        assert!(gap_prompt.contains("Test 2 summary:\nsummary of css/lanes/t02.html"));
        assert!(!gap_prompt.contains("Test 3 summary"));
        assert!(!gap_prompt.contains("t01.html"));
    }

    #[tokio::test]
    async fn test_all_analyses_failing_skips_gap_stage() {
        let failing = (0..11).map(|i| format!("css/lanes/t{i:02}.html")).collect();
        let backend = Arc::new(StageBackend {
            failing_tests: failing,
            ..StageBackend::default()
        });
        let (host, web) = repo(11);
        let (pipeline, _) = pipeline(backend.clone(), host, web);

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Failed {
                reason: "no successful test analysis responses".to_string()
            }
        );
        assert_eq!(backend.count(GAP_MARKER), 0);
    }

    #[tokio::test]
    async fn test_spec_synthesis_failure_is_fatal() {
        let backend = Arc::new(StageBackend {
            fail_spec: true,
            ..StageBackend::default()
        });
        let (host, web) = repo(11);
        let (pipeline, _) = pipeline(backend.clone(), host, web);

        let outcome = pipeline.run(&feature(LANES_URL)).await;

        match outcome {
            EvaluationOutcome::Failed { reason } => {
                assert!(reason.starts_with("spec synthesis prompt failure: "));
                assert!(reason.contains("after 1 attempts"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(backend.count(GAP_MARKER), 0);
    }

    #[tokio::test]
    async fn test_missing_spec_link_fails_fast() {
        let backend = Arc::new(StageBackend::default());
        let (host, web) = repo(1);
        let (pipeline, host) = pipeline(backend.clone(), host, web);

        let mut f = feature(LANES_URL);
        f.spec_link = "  ".to_string();
        let outcome = pipeline.run(&f).await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Failed {
                reason: "no spec URL provided".to_string()
            }
        );
        assert!(backend.prompts().is_empty());
        assert_eq!(host.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_results_urls_fails_fast() {
        let backend = Arc::new(StageBackend::default());
        let (host, web) = repo(1);
        let (pipeline, host) = pipeline(backend.clone(), host, web);

        let outcome = pipeline
            .run(&feature("Tested in https://github.com/web-platform-tests/wpt/pull/1"))
            .await;

        assert_eq!(
            outcome,
            EvaluationOutcome::Failed {
                reason: "no valid results URLs found".to_string()
            }
        );
        assert!(backend.prompts().is_empty());
        assert_eq!(host.call_count(), 0);
    }
}
