//! Source gatherers.
//!
//! [`WebSourceGatherer`] runs a fixed list of search queries against a JSON
//! search endpoint, fetches the hits, and keeps the readable text of each
//! page. [`StaticSourceGatherer`] and [`EmptySourceGatherer`] serve fixtures
//! and deployments without a search backend.

use async_trait::async_trait;
use polibrief_config::{ResearchConfig, SourcesConfig};
use polibrief_core::error::{Error, Result};
use polibrief_core::{ReportKey, SourceDocument, SourceGatherer};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("polibrief/", env!("CARGO_PKG_VERSION"));

/// Paragraphs shorter than this inside a content container are navigation or
/// captions, not prose.
const MIN_PARAGRAPH_CHARS: usize = 100;

const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".jpg", ".jpeg", ".png", ".gif",
    ".bmp", ".tiff", ".svg", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".zip", ".rar",
    ".tar", ".gz", ".7z",
];

static CONTAINERS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article, .article, .content, .post, main, #main, #content")
        .expect("container selector should parse")
});
static PARAGRAPHS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("paragraph selector should parse"));
static FALLBACK_TEXT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, p, li").expect("fallback selector should parse")
});
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector should parse"));
static LEAD_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:image"], meta[name="twitter:image"]"#)
        .expect("lead image selector should parse")
});

/// Search queries for a politician, most general first, without duplicates.
pub fn generate_search_queries(name: &str, position: &str) -> Vec<String> {
    let name = name.trim();
    let position = position.trim();

    let mut queries = vec![
        format!("{name} {position}").trim().to_string(),
        format!("{name} politician background"),
        format!("{name} biography"),
        format!("{name} political career"),
    ];
    for topic in ["accomplishments", "legislation authored", "policy success"] {
        queries.push(format!("{name} {topic}"));
    }
    for topic in [
        "controversy and scandal",
        "corruption allegations",
        "criticism",
        "ethics investigation",
    ] {
        queries.push(format!("{name} {topic}"));
    }
    for topic in [
        "education background",
        "political history",
        "family background",
        "business interests",
        "financial disclosure",
    ] {
        queries.push(format!("{name} {topic}"));
    }
    if !position.is_empty() {
        for topic in ["record", "performance", "tenure"] {
            queries.push(format!("{name} {position} {topic}"));
        }
        queries.push(format!("{name} before {position}"));
    }

    let mut seen = HashSet::new();
    queries.retain(|q| seen.insert(q.to_lowercase()));
    queries
}

/// Whether `url` is an absolute http(s) link to a web page rather than a
/// file download.
pub fn is_website_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return false;
    }
    let path = parsed.path().to_lowercase();
    !EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// What is kept from one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    /// `og:image` or `twitter:image`, as written in the page
    pub image: Option<String>,
    pub text: String,
}

/// Title, lead image, and readable text of an HTML document.
///
/// Paragraphs inside article-like containers are preferred; pages without
/// them fall back to every heading, paragraph, and list item.
pub fn extract_document(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    let image = document
        .select(&LEAD_IMAGE)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string);

    let mut seen = HashSet::new();
    let mut paragraphs = Vec::new();
    for container in document.select(&CONTAINERS) {
        for p in container.select(&PARAGRAPHS) {
            let text = collapse(&p.text().collect::<String>());
            if text.chars().count() > MIN_PARAGRAPH_CHARS && seen.insert(text.clone()) {
                paragraphs.push(text);
            }
        }
    }

    if paragraphs.is_empty() {
        paragraphs = document
            .select(&FALLBACK_TEXT)
            .map(|e| collapse(&e.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect();
    }

    ExtractedPage {
        title,
        image,
        text: paragraphs.join("\n\n"),
    }
}

/// Resolve a lead image against the page it came from. Only http(s) results
/// are kept.
pub fn absolute_image_url(page_url: &str, image: &str) -> Option<String> {
    let resolved = Url::parse(page_url).ok()?.join(image).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    #[serde(default)]
    title: String,
}

/// Searches the web and reads the pages it finds.
pub struct WebSourceGatherer {
    client: reqwest::Client,
    search_url: String,
    api_key: Option<String>,
    num_results_per_query: usize,
    min_document_chars: usize,
    max_documents: usize,
}

impl WebSourceGatherer {
    pub fn new(search_url: impl Into<String>, fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            search_url: search_url.into(),
            api_key: None,
            num_results_per_query: 2,
            min_document_chars: 500,
            max_documents: 20,
        })
    }

    /// Build from config. Returns `None` when no search endpoint is set.
    pub fn from_config(sources: &SourcesConfig, research: &ResearchConfig) -> Result<Option<Self>> {
        let Some(url) = sources.search_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let mut gatherer = Self::new(url, Duration::from_secs(sources.fetch_timeout_secs))?
            .with_limits(
                research.num_results_per_query,
                research.min_document_chars,
                research.max_documents,
            );
        if let Some(key) = &sources.search_api_key {
            gatherer = gatherer.with_api_key(key);
        }
        Ok(Some(gatherer))
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_limits(
        mut self,
        num_results_per_query: usize,
        min_document_chars: usize,
        max_documents: usize,
    ) -> Self {
        self.num_results_per_query = num_results_per_query;
        self.min_document_chars = min_document_chars;
        self.max_documents = max_documents;
        self
    }

    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, reqwest::Error> {
        let count = self.num_results_per_query.to_string();
        let mut req = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("count", count.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let body: SearchResponse = req.send().await?.error_for_status()?.json().await?;
        Ok(body.results)
    }

    async fn fetch(&self, hit: &SearchHit, query: &str) -> Option<SourceDocument> {
        let response = match self.client.get(&hit.url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %hit.url, error = %e, "Fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url = %hit.url, status = %response.status(), "Fetch returned error status");
            return None;
        }
        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                debug!(url = %hit.url, error = %e, "Could not read response body");
                return None;
            }
        };

        let page = extract_document(&html);
        if page.text.chars().count() < self.min_document_chars {
            debug!(url = %hit.url, chars = page.text.len(), "Document too short, skipping");
            return None;
        }
        Some(SourceDocument {
            url: hit.url.clone(),
            title: page.title.unwrap_or_else(|| hit.title.clone()),
            query: query.to_string(),
            content: page.text,
            image_url: page
                .image
                .and_then(|image| absolute_image_url(&hit.url, &image)),
        })
    }
}

#[async_trait]
impl SourceGatherer for WebSourceGatherer {
    fn name(&self) -> &str {
        "web"
    }

    async fn gather(&self, key: &ReportKey) -> Result<Vec<SourceDocument>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for query in generate_search_queries(&key.name, &key.position) {
            match self.search(&query).await {
                Ok(hits) => {
                    let fresh = hits
                        .into_iter()
                        .filter(|h| is_website_url(&h.url))
                        .filter(|h| seen.insert(h.url.clone()))
                        .take(self.num_results_per_query);
                    candidates.extend(fresh.map(|h| (h, query.clone())));
                }
                Err(e) => warn!(query = %query, error = %e, "Search query failed"),
            }
        }

        let fetches = candidates.iter().map(|(hit, query)| self.fetch(hit, query));
        let documents: Vec<SourceDocument> = futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .take(self.max_documents)
            .collect();

        info!(
            key = %key,
            candidates = candidates.len(),
            documents = documents.len(),
            "Source gathering finished"
        );
        Ok(documents)
    }
}

/// Serves a fixed document list regardless of the key.
pub struct StaticSourceGatherer {
    documents: Vec<SourceDocument>,
}

impl StaticSourceGatherer {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl SourceGatherer for StaticSourceGatherer {
    fn name(&self) -> &str {
        "static"
    }

    async fn gather(&self, _key: &ReportKey) -> Result<Vec<SourceDocument>> {
        Ok(self.documents.clone())
    }
}

/// Finds nothing. Research through it fails with "no content found".
pub struct EmptySourceGatherer;

#[async_trait]
impl SourceGatherer for EmptySourceGatherer {
    fn name(&self) -> &str {
        "empty"
    }

    async fn gather(&self, key: &ReportKey) -> Result<Vec<SourceDocument>> {
        warn!(key = %key, "No search backend configured");
        Ok(Vec::new())
    }
}
