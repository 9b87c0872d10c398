use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

/// Harness scripts every test loads; their content tells the model nothing.
const HARNESS_SCRIPTS: &[&str] = &[
    "resources/testharness.js",
    "resources/testharnessreport.js",
    "resources/testdriver.js",
    "resources/testdriver-vendor.js",
    "resources/testdriver-actions.js",
];

fn script_src() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<script\b[^>]*\bsrc\s*=\s*["']?([^"'\s>]+)"#).expect("valid regex")
    })
}

fn meta_script() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*//\s*META:\s*script=(\S+)").expect("valid regex"))
}

/// Repository paths of the helper scripts referenced by `test_files`,
/// excluding harness scripts, external URLs and files already present.
pub fn referenced_paths(test_files: &BTreeMap<String, String>) -> Vec<String> {
    let mut found = BTreeSet::new();

    for (test_path, content) in test_files {
        let references = script_src()
            .captures_iter(content)
            .chain(meta_script().captures_iter(content))
            .filter_map(|c| c.get(1).map(|m| m.as_str()));

        for reference in references {
            let Some(path) = resolve_reference(test_path, reference) else {
                continue;
            };
            if HARNESS_SCRIPTS.contains(&path.as_str()) || test_files.contains_key(&path) {
                continue;
            }
            found.insert(path);
        }
    }

    found.into_iter().collect()
}

/// Resolve a script reference found in `test_path` to a repository path.
fn resolve_reference(test_path: &str, reference: &str) -> Option<String> {
    let reference = reference.split(['?', '#']).next()?.trim();
    if reference.is_empty()
        || reference.starts_with("//")
        || reference.contains("://")
        || reference.starts_with("data:")
    {
        return None;
    }

    let joined = if let Some(absolute) = reference.strip_prefix('/') {
        absolute.to_string()
    } else {
        let dir = test_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        format!("{dir}/{reference}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Escaping the repository root makes the reference meaningless.
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
