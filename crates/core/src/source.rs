//! Source gathering: finding and reading documents about a politician.

use crate::error::Result;
use crate::report::ReportKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One fetched document with its extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub url: String,
    pub title: String,
    /// The search query that surfaced this document
    #[serde(default)]
    pub query: String,
    pub content: String,
    /// Lead image advertised by the page (`og:image`), absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Finds source documents for a politician.
///
/// Implementations: web search + fetch, static fixtures, and an empty gatherer
/// for deployments without a search backend. An empty result is not an error;
/// the caller decides what to do with it.
#[async_trait]
pub trait SourceGatherer: Send + Sync {
    fn name(&self) -> &str;

    async fn gather(&self, key: &ReportKey) -> Result<Vec<SourceDocument>>;
}
