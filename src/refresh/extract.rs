//! Price extraction from search snippets via a text-generation model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::trace;

use crate::refresh::candidates::Candidate;
use crate::refresh::json::{parse_json_with_context, strip_code_fence};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 100;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Instruction sent with every extraction request.
pub const SYSTEM_PROMPT: &str = "You extract grocery prices from web search snippets. \
Respond with ONLY a JSON object of the form {\"price\": number|null, \"unit\": string} \
and nothing else. Use a price only if it appears verbatim in the snippets for the \
requested item at the requested store. Never estimate, average, or guess: if the \
snippets do not state a real price, respond with {\"price\": null, \"unit\": \"\"}.";

/// What the model reported for one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Price { price: f64, unit: Option<String> },
    /// The snippets contain no usable price.
    NoPrice,
}

#[async_trait]
pub trait PriceExtractor: Send + Sync {
    /// Extract a price for `candidate` from `snippets`.
    ///
    /// Transport and parse problems are errors; an explicit "no price" is
    /// [`Extraction::NoPrice`].
    async fn extract(&self, candidate: &Candidate, snippets: &str) -> Result<Extraction>;
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

/// Interpret raw model text. Code fences are tolerated.
pub fn parse_reply(text: &str) -> Result<Extraction> {
    let reply: ModelReply = parse_json_with_context(strip_code_fence(text))
        .context("Model reply is not the expected JSON object")?;

    let Some(price) = reply.price.filter(|p| p.is_finite() && *p > 0.0) else {
        return Ok(Extraction::NoPrice);
    };
    let unit = reply
        .unit
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    Ok(Extraction::Price { price, unit })
}

/// User message for one pair.
pub fn build_prompt(candidate: &Candidate, snippets: &str) -> String {
    format!(
        "Item: {} (priced per {})\nStore: {}\n\nSearch snippets:\n{}",
        candidate.ingredient.name, candidate.ingredient.unit, candidate.vendor.name, snippets
    )
}

/// Anthropic Messages API client. Owns its API key.
pub struct AnthropicExtractor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicExtractor {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build extraction HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl PriceExtractor for AnthropicExtractor {
    async fn extract(&self, candidate: &Candidate, snippets: &str) -> Result<Extraction> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0,
            "system": SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": build_prompt(candidate, snippets) }
            ],
        });

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Extraction request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Extraction request failed ({status}): {text}");
        }

        let json: serde_json::Value = resp.json().await.context("Malformed extraction response")?;
        let text = reply_text(&json);
        trace!(reply = %text, "Extraction reply");
        parse_reply(&text)
    }
}

/// Concatenate the text blocks of a Messages API response.
fn reply_text(json: &serde_json::Value) -> String {
    json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
