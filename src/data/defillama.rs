use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

#[async_trait]
pub trait TvlSource: Send + Sync + 'static {
    /// Current total value locked (USD) for a protocol slug
    async fn protocol_tvl(&self, protocol: &str) -> Result<f64>;
}

pub struct DefiLlamaClient {
    client: Client,
    base_url: String,
}

impl DefiLlamaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TvlSource for DefiLlamaClient {
    async fn protocol_tvl(&self, protocol: &str) -> Result<f64> {
        let url = format!("{}/tvl/{}", self.base_url, protocol);

        let tvl: f64 = self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch TVL for {}", protocol))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Failed to parse TVL for {}", protocol))?;

        Ok(tvl)
    }
}
