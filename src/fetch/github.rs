use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::fetch::{EntryKind, RemoteEntry, SourceHost};

/// Test repository access through the GitHub contents API.
pub struct GitHubSourceHost {
    /// `None` when no token is configured.
    client: Option<Octocrab>,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentEntry>),
    Single(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    download_url: Option<String>,
}

impl From<ContentEntry> for RemoteEntry {
    fn from(entry: ContentEntry) -> Self {
        let kind = match entry.kind.as_str() {
            "file" => EntryKind::File,
            "dir" => EntryKind::Directory,
            _ => EntryKind::Other,
        };
        RemoteEntry {
            path: entry.path,
            kind,
            download_url: entry.download_url,
        }
    }
}

impl GitHubSourceHost {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = parse_repo(&config.tests_repo)?;

        let client = match config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Some(
                Octocrab::builder()
                    .base_uri(config.api_base.as_str())
                    .map_err(|e| AppError::Config(format!("Invalid GitHub API base: {e}")))?
                    .personal_token(token.to_string())
                    .build()
                    .map_err(|e| {
                        AppError::GitHubApi(format!("Failed to build octocrab client: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn client(&self) -> Result<&Octocrab> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Config("GitHub token is not configured".to_string()))
    }

    fn contents_route(&self, path: &str) -> String {
        let encoded = path
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("/repos/{}/{}/contents/{encoded}", self.owner, self.repo)
    }

    async fn contents(&self, path: &str) -> Result<ContentsResponse> {
        let route = self.contents_route(path);
        self.client()?
            .get(&route, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch contents of {path}: {e}")))
    }
}

fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    match repo_full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
        _ => Err(AppError::Config(format!(
            "Invalid repo name: {repo_full_name}"
        ))),
    }
}

#[async_trait]
impl SourceHost for GitHubSourceHost {
    fn is_authorized(&self) -> bool {
        self.client.is_some()
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        match self.contents(path).await? {
            ContentsResponse::Listing(entries) => {
                Ok(entries.into_iter().map(RemoteEntry::from).collect())
            }
            ContentsResponse::Single(entry) => Err(AppError::GitHubApi(format!(
                "{path} is a {}, not a directory",
                entry.kind
            ))),
        }
    }

    async fn get_entry(&self, path: &str) -> Result<Option<RemoteEntry>> {
        match self.contents(path).await? {
            ContentsResponse::Single(entry) => Ok(Some(entry.into())),
            ContentsResponse::Listing(_) => Ok(None),
        }
    }
}
