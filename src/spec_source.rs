use std::sync::{Arc, OnceLock};

use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::fetch::WebClient;

/// Containers tried, in order, when looking for a page's main content.
const MAIN_CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=main]", "body"];

/// How a specification URL is turned into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    /// Pull request; fetched as its diff.
    PullRequest { diff_url: String },
    /// File on a source-hosting site; fetched raw.
    Blob { raw_url: String },
    /// Any other page; fetched and reduced to markdown.
    WebPage { url: String },
}

impl SpecSource {
    pub fn classify(spec_url: &str) -> Self {
        let web = || SpecSource::WebPage {
            url: spec_url.to_string(),
        };

        let Ok(parsed) = Url::parse(spec_url) else {
            return web();
        };
        if parsed.host_str() != Some("github.com") {
            return web();
        }
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [owner, repo, "pull", number, ..] => SpecSource::PullRequest {
                diff_url: format!("https://github.com/{owner}/{repo}/pull/{number}.diff"),
            },
            [owner, repo, "blob", rest @ ..] if !rest.is_empty() => SpecSource::Blob {
                raw_url: format!(
                    "https://raw.githubusercontent.com/{owner}/{repo}/{}",
                    rest.join("/")
                ),
            },
            _ => web(),
        }
    }
}

/// Fetches specification text for the multi-prompt path. Never fails: any
/// problem comes back as an error sentence in place of the content.
pub struct SpecResolver {
    web: Arc<dyn WebClient>,
}

impl SpecResolver {
    pub fn new(web: Arc<dyn WebClient>) -> Self {
        Self { web }
    }

    pub async fn resolve(&self, spec_url: &str) -> String {
        match SpecSource::classify(spec_url) {
            SpecSource::PullRequest { diff_url } => {
                self.fetch_plain(&diff_url, "pull request diff").await
            }
            SpecSource::Blob { raw_url } => self.fetch_plain(&raw_url, "raw file").await,
            SpecSource::WebPage { url } => self.fetch_web_page(&url).await,
        }
    }

    async fn fetch_plain(&self, url: &str, what: &str) -> String {
        match self.web.get_text(url).await {
            Ok(text) => {
                tracing::info!(url = url, chars = text.len(), "Fetched spec {}", what);
                text
            }
            Err(e) => {
                tracing::error!(url = url, error = %e, "Failed to fetch spec {}", what);
                format!("Error fetching {what} {url}: {e}")
            }
        }
    }

    async fn fetch_web_page(&self, url: &str) -> String {
        let html = match self.web.get_text(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(url = url, error = %e, "Failed to fetch spec page");
                return "Error: could not fetch URL".to_string();
            }
        };

        match extract_main_content(&html) {
            Ok(Some(markdown)) => {
                tracing::info!(url = url, chars = markdown.len(), "Extracted spec page content");
                markdown
            }
            Ok(None) => {
                tracing::warn!(url = url, "Spec page has no main content");
                "Error: no main content found".to_string()
            }
            Err(e) => {
                tracing::error!(url = url, error = %e, "Failed to process spec page");
                format!("Error processing web spec: {e}")
            }
        }
    }
}

fn html_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
}

/// Markdown of the page's main content, keeping tables and dropping
/// comments, scripts and navigation. `None` when nothing is left.
pub fn extract_main_content(html: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);

    let mut main = None;
    for css in MAIN_CONTENT_SELECTORS {
        if let Some(element) = document.select(&selector(css)?).next() {
            main = Some(element);
            break;
        }
    }
    let Some(main) = main else {
        return Ok(None);
    };

    let (fragment, tables) = split_out_tables(main)?;
    let fragment = html_comment().replace_all(&fragment, "");
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "nav", "footer", "template"])
        .build();
    let mut markdown = converter
        .convert(&fragment)
        .map_err(|e| AppError::Internal(format!("Markdown conversion failed: {e}")))?;
    for (marker, table) in &tables {
        markdown = markdown.replace(marker.as_str(), table);
    }

    let markdown = markdown.trim();
    if markdown.is_empty() {
        Ok(None)
    } else {
        Ok(Some(markdown.to_string()))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Internal(format!("Invalid selector {css}: {e:?}")))
}

/// The element's HTML with every top-level table replaced by a marker
/// paragraph, and the markdown table belonging to each marker.
fn split_out_tables(element: ElementRef<'_>) -> Result<(String, Vec<(String, String)>)> {
    let mut html = element.html();
    let mut tables = Vec::new();

    for table in element.select(&selector("table")?) {
        let table_html = table.html();
        // Nested tables went out with their parent.
        if !html.contains(&table_html) {
            continue;
        }
        let Some(markdown) = table_to_markdown(table)? else {
            continue;
        };
        let marker = format!("WPTTABLE{}END", tables.len());
        html = html.replacen(&table_html, &format!("<p>{marker}</p>"), 1);
        tables.push((marker, markdown));
    }

    Ok((html, tables))
}

/// Pipe table; the first row is the header. Short rows are padded.
fn table_to_markdown(table: ElementRef<'_>) -> Result<Option<String>> {
    let cells = selector("th, td")?;
    let rows: Vec<Vec<String>> = table
        .select(&selector("tr")?)
        .map(|row| row.select(&cells).map(cell_text).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return Ok(None);
    }

    let line = |row: &[String]| {
        let mut padded = row.to_vec();
        padded.resize(width, String::new());
        format!("| {} |", padded.join(" | "))
    };
    let mut lines = vec![line(rows[0].as_slice()), format!("|{}", " --- |".repeat(width))];
    lines.extend(rows[1..].iter().map(|row| line(row.as_slice())));
    Ok(Some(lines.join("\n")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}
