use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};

/// Where a feature's tests live in the test repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestLocation {
    File(String),
    Directory(String),
}

fn file_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|/)[^/]+\.[A-Za-z0-9]+$").expect("valid regex"))
}

impl TestLocation {
    /// Paths whose last segment looks like `name.ext` are files; everything
    /// else is a directory.
    pub fn classify(path: &str) -> Self {
        if file_segment().is_match(path) {
            TestLocation::File(path.to_string())
        } else {
            TestLocation::Directory(path.trim_end_matches('/').to_string())
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TestLocation::File(path) | TestLocation::Directory(path) => path,
        }
    }
}

/// Pull every results URL starting with `prefix` out of free text and map
/// each to a repository path. Order of first appearance is kept; duplicates
/// and URLs pointing at the results root are dropped.
pub fn extract_results_paths(text: &str, prefix: &str) -> Result<Vec<String>> {
    let prefix = prefix.trim_end_matches('/');
    let pattern = format!(r#"{}(/[^\s"'<>()\[\]]*)?"#, regex::escape(prefix));
    let re = Regex::new(&pattern)
        .map_err(|e| AppError::Config(format!("Invalid results URL prefix: {e}")))?;

    let mut paths: Vec<String> = Vec::new();
    for captures in re.captures_iter(text) {
        let Some(raw) = captures.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let raw = raw.split(['?', '#']).next().unwrap_or_default();
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        let path = decoded.trim_matches('/').trim_end_matches(['.', ',', ';']);
        if path.is_empty() {
            continue;
        }
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }

    Ok(paths)
}

/// Split repository paths into `(directories, files)`.
pub fn split_locations(paths: &[String]) -> (Vec<String>, Vec<String>) {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    for path in paths {
        match TestLocation::classify(path) {
            TestLocation::Directory(p) => directories.push(p),
            TestLocation::File(p) => files.push(p),
        }
    }
    (directories, files)
}
