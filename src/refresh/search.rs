//! Web search lookup for ingredient prices.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::trace;

use crate::refresh::candidates::Candidate;

/// Number of search results requested per pair.
pub const RESULT_COUNT: usize = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One search hit, reduced to its text.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a free-text query and return at most `count` hits, best first.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;
}

/// Query text for a pair, e.g. `"Aldi Milk price per gallon"`.
pub fn build_query(candidate: &Candidate) -> String {
    format!(
        "{} {} price per {}",
        candidate.vendor.name.trim(),
        candidate.ingredient.name.trim(),
        candidate.ingredient.unit.trim()
    )
}

/// Join usable hits into one snippet block for extraction.
///
/// Returns `None` when no hit carries any text, which the caller treats as
/// "nothing to extract from" rather than an error.
pub fn snippet_block(hits: &[SearchHit]) -> Option<String> {
    let blocks: Vec<String> = hits
        .iter()
        .take(RESULT_COUNT)
        .filter_map(|hit| {
            let title = clean_text(&hit.title);
            let description = clean_text(&hit.description);
            match (title.is_empty(), description.is_empty()) {
                (true, true) => None,
                (false, true) => Some(title),
                (true, false) => Some(description),
                (false, false) => Some(format!("{title}\n{description}")),
            }
        })
        .collect();

    (!blocks.is_empty()).then(|| blocks.join("\n\n"))
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip inline markup (search APIs wrap matches in `<strong>`) and entities.
fn clean_text(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, "");
    let decoded = html_escape::decode_html_entities(&without_tags);
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Brave Search web API client. Owns its subscription token.
pub struct BraveSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl BraveSearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/res/v1/web/search", self.base_url);
        let count = count.to_string();

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .context("Search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Search request failed ({status}): {text}");
        }

        let body: BraveResponse = resp.json().await.context("Malformed search response")?;
        let hits: Vec<SearchHit> = body
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                description: r.description,
            })
            .collect();

        trace!(query, hits = hits.len(), "Search completed");
        Ok(hits)
    }
}
