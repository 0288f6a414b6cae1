use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::data::cache::PriceCache;

#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
    /// USD quote for a coin id; `Ok(None)` when the service has no quote for it
    async fn usd_price(&self, coin_id: &str) -> Result<Option<f64>>;
}

type PriceFetch = Shared<BoxFuture<'static, Result<Option<f64>, Arc<anyhow::Error>>>>;

pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    cache: PriceCache,
    // one upstream request per coin, joined by every concurrent caller
    in_flight: DashMap<String, PriceFetch>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

impl CoinGeckoClient {
    pub fn new(base_url: String, cache_ttl: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: PriceCache::new(cache_ttl),
            in_flight: DashMap::new(),
        }
    }

    fn start_fetch(&self, coin_id: &str) -> PriceFetch {
        fetch_price(self.client.clone(), format!("{}/simple/price", self.base_url), coin_id.to_string())
            .map(|result| result.map_err(Arc::new))
            .boxed()
            .shared()
    }
}

async fn fetch_price(client: Client, url: String, coin_id: String) -> Result<Option<f64>> {
    let quotes: HashMap<String, UsdQuote> = client
        .get(&url)
        .query(&[("ids", coin_id.as_str()), ("vs_currencies", "usd")])
        .send()
        .await
        .context("Failed to fetch price")?
        .error_for_status()
        .context("Price service returned an error status")?
        .json()
        .await
        .context("Failed to parse price response")?;

    Ok(quotes.get(&coin_id).and_then(|q| q.usd))
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn usd_price(&self, coin_id: &str) -> Result<Option<f64>> {
        if let Some(cached) = self.cache.get(coin_id) {
            debug!(coin_id, "price cache hit");
            return Ok(cached);
        }

        let fetch = self
            .in_flight
            .entry(coin_id.to_string())
            .or_insert_with(|| self.start_fetch(coin_id))
            .clone();
        let result = fetch.clone().await;
        self.in_flight.remove_if(coin_id, |_, pending| pending.ptr_eq(&fetch));

        match result {
            Ok(price) => {
                self.cache.insert(coin_id, price);
                Ok(price)
            }
            Err(e) => Err(anyhow!("{:#}", e)),
        }
    }
}
