use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// External reasoning service: prompt in, free-form text out.
#[async_trait]
pub trait ReasoningService: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, "calling reasoning service");

        let response: GenerateResponse = self.client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Reasoning request failed")?
            .error_for_status()
            .context("Reasoning service returned an error status")?
            .json()
            .await
            .context("Failed to parse reasoning response")?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .context("No candidates in reasoning response")?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            anyhow::bail!("Empty text in reasoning response");
        }
        Ok(text)
    }
}
