use std::collections::BTreeMap;
use std::fmt;

use crate::feature::Feature;

/// Which stage of the evaluation a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    SpecSynthesis,
    TestAnalysis,
    GapAnalysis,
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptRole::SpecSynthesis => "spec-synthesis",
            PromptRole::TestAnalysis => "test-analysis",
            PromptRole::GapAnalysis => "gap-analysis",
        };
        f.write_str(name)
    }
}

/// A rendered prompt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    role: PromptRole,
    text: String,
}

impl PromptRequest {
    pub fn new(role: PromptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn role(&self) -> PromptRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

fn feature_definition(feature: &Feature) -> String {
    format!("**Name:** {}\n\n**Summary:**\n{}", feature.name, feature.summary)
}

fn file_sections(files: &BTreeMap<String, String>) -> String {
    files
        .iter()
        .map(|(path, content)| format!("### `{path}`\n```\n{content}\n```"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Single prompt carrying the spec link, the feature and every fetched file.
pub fn unified_prompt(
    feature: &Feature,
    test_files: &BTreeMap<String, String>,
    dependency_files: &BTreeMap<String, String>,
) -> PromptRequest {
    let text = format!(
        r#"You are an expert reviewer of web platform specifications and the Web Platform Tests (WPT) suite.

Evaluate how well the tests below cover the specification of this feature.

## Specification
{spec_link}

## Feature
{definition}

## Test files
{tests}

## Test dependencies
{dependencies}

## Instructions
1. Read the specification and list the normative requirements it introduces.
2. For each requirement, identify which of the test files exercise it.
3. Report requirements with no or weak coverage, and suggest the tests that are missing.

Answer in Markdown."#,
        spec_link = feature.spec_link,
        definition = feature_definition(feature),
        tests = file_sections(test_files),
        dependencies = if dependency_files.is_empty() {
            "None.".to_string()
        } else {
            file_sections(dependency_files)
        },
    );
    PromptRequest::new(PromptRole::GapAnalysis, text)
}

pub fn spec_synthesis_prompt(feature: &Feature, spec_content: &str) -> PromptRequest {
    let text = format!(
        r#"You are an expert reader of web platform specifications.

Summarize the testable, normative requirements this specification introduces for the feature below. Be exhaustive and precise; list one requirement per bullet.

## Feature
{definition}

## Specification content
{spec_content}"#,
        definition = feature_definition(feature),
    );
    PromptRequest::new(PromptRole::SpecSynthesis, text)
}

pub fn test_analysis_prompt(path: &str, content: &str) -> PromptRequest {
    let text = format!(
        r#"You are an expert in the Web Platform Tests (WPT) suite.

Summarize what the following test file verifies. List each behavior asserted, including edge cases and error conditions.

## Test file `{path}`
```
{content}
```"#
    );
    PromptRequest::new(PromptRole::TestAnalysis, text)
}

pub fn gap_analysis_prompt(spec_synthesis: &str, test_analysis: &str) -> PromptRequest {
    let text = format!(
        r#"You are an expert reviewer of web platform specifications and the Web Platform Tests (WPT) suite.

Compare the specification requirements with the test summaries and produce a coverage gap analysis.

## Specification requirements
{spec_synthesis}

## Test summaries
{test_analysis}

## Instructions
1. Map each requirement to the tests that cover it.
2. Report requirements with no or weak coverage, and suggest the tests that are missing.

Answer in Markdown."#
    );
    PromptRequest::new(PromptRole::GapAnalysis, text)
}
