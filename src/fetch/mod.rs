pub mod dependencies;
pub mod github;
pub mod locations;
pub mod web;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::Result;

pub use locations::TestLocation;
pub use web::WebClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One entry of the remote test repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub kind: EntryKind,
    pub download_url: Option<String>,
}

/// A file ready to download. The download URL is its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub download_url: String,
}

impl RemoteEntry {
    fn into_resolved(self) -> Option<ResolvedFile> {
        match (self.kind, self.download_url) {
            (EntryKind::File, Some(download_url)) => Some(ResolvedFile {
                path: self.path,
                download_url,
            }),
            _ => None,
        }
    }
}

/// Metadata access to the repository holding the tests.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Whether an API credential is configured.
    fn is_authorized(&self) -> bool;

    /// Entries directly inside a directory.
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Metadata for a single path. `None` when the path is not a single entry.
    async fn get_entry(&self, path: &str) -> Result<Option<RemoteEntry>>;
}

/// Turns test locations into `path -> content`, downloading each distinct
/// URL once. Failures only drop the unit that failed.
pub struct ContentFetcher {
    host: Arc<dyn SourceHost>,
    web: Arc<dyn WebClient>,
}

impl ContentFetcher {
    pub fn new(host: Arc<dyn SourceHost>, web: Arc<dyn WebClient>) -> Self {
        Self { host, web }
    }

    /// Fetch every file in `directories` (not recursive) and every path in
    /// `files`.
    ///
    /// References are taken in order, directories first. When two download
    /// URLs land on the same path, the one reached last wins.
    pub async fn fetch_mixed(
        &self,
        directories: &[String],
        files: &[String],
    ) -> BTreeMap<String, String> {
        if !self.host.is_authorized() {
            tracing::warn!("No source host credential configured, skipping test fetch");
            return BTreeMap::new();
        }

        let (listings, singles) = tokio::join!(
            join_all(directories.iter().map(|dir| self.list_files(dir))),
            join_all(files.iter().map(|file| self.resolve_file(file))),
        );

        // One slot per download URL, in first-seen order, so a file reached
        // twice is fetched once.
        let mut unique: Vec<ResolvedFile> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for resolved in listings.into_iter().flatten().chain(singles.into_iter().flatten()) {
            match slots.get(&resolved.download_url) {
                Some(&slot) => unique[slot].path = resolved.path,
                None => {
                    slots.insert(resolved.download_url.clone(), unique.len());
                    unique.push(resolved);
                }
            }
        }

        tracing::info!(
            directories = directories.len(),
            files = files.len(),
            unique_files = unique.len(),
            "Resolved test locations"
        );

        let downloads = join_all(unique.iter().map(|file| async move {
            (&file.path, self.web.get_text(&file.download_url).await)
        }))
        .await;

        let mut contents = BTreeMap::new();
        for (path, result) in downloads {
            match result {
                Ok(text) => {
                    contents.insert(path.clone(), text);
                }
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Failed to fetch file content");
                }
            }
        }

        contents
    }

    /// Fetch the helper scripts the given tests load.
    pub async fn fetch_dependencies(
        &self,
        test_files: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let paths = dependencies::referenced_paths(test_files);
        if paths.is_empty() {
            return BTreeMap::new();
        }
        tracing::info!(count = paths.len(), "Fetching test dependencies");
        self.fetch_mixed(&[], &paths).await
    }

    async fn list_files(&self, directory: &str) -> Vec<ResolvedFile> {
        match self.host.list_directory(directory).await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(RemoteEntry::into_resolved)
                .collect(),
            Err(e) => {
                tracing::error!(directory = directory, error = %e, "Failed to list directory");
                Vec::new()
            }
        }
    }

    async fn resolve_file(&self, path: &str) -> Option<ResolvedFile> {
        match self.host.get_entry(path).await {
            Ok(Some(entry)) => {
                let resolved = entry.into_resolved();
                if resolved.is_none() {
                    tracing::warn!(path = path, "Reference does not resolve to a file");
                }
                resolved
            }
            Ok(None) => {
                tracing::warn!(path = path, "Reference does not resolve to a file");
                None
            }
            Err(e) => {
                tracing::error!(path = path, error = %e, "Failed to resolve file");
                None
            }
        }
    }
}
