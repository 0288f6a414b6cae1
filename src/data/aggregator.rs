use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::chain::types::Market;
use crate::data::coingecko::PriceSource;
use crate::data::defillama::TvlSource;
use crate::data::types::{ExternalDataSnapshot, SourceRecord};
use crate::execution::retry::RetryPolicy;

/// Category-driven evidence collection. Every source is best-effort.
pub struct DataAggregator {
    prices: Arc<dyn PriceSource>,
    tvl: Arc<dyn TvlSource>,
    price_coins: Vec<String>,
    defi_protocols: Vec<String>,
    policy: RetryPolicy,
}

impl DataAggregator {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        tvl: Arc<dyn TvlSource>,
        price_coins: Vec<String>,
        defi_protocols: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            prices,
            tvl,
            price_coins,
            defi_protocols,
            policy,
        }
    }

    /// Always returns a snapshot, possibly with zero sources.
    pub async fn aggregate(&self, market: &Market) -> ExternalDataSnapshot {
        let mut snapshot = ExternalDataSnapshot::empty(Utc::now());
        let category = market.category.to_lowercase();

        if category.contains("price") || category.contains("crypto") {
            if let Some(record) = self.fetch_prices().await {
                snapshot.sources.push(record);
            }
        }

        if category.contains("defi") {
            if let Some(record) = self.fetch_tvl().await {
                snapshot.sources.push(record);
            }
        }

        debug!(
            market_id = market.id,
            sources = snapshot.sources.len(),
            "external data aggregated"
        );
        snapshot
    }

    async fn fetch_prices(&self) -> Option<SourceRecord> {
        let mut prices = BTreeMap::new();
        for coin in &self.price_coins {
            let source = &self.prices;
            match self.policy.run("price", || source.usd_price(coin)).await {
                Ok(price) => {
                    prices.insert(coin.clone(), price);
                }
                Err(e) => warn!(coin = %coin, error = %e, "price fetch failed, omitting"),
            }
        }

        (!prices.is_empty()).then_some(SourceRecord::PriceData { prices })
    }

    async fn fetch_tvl(&self) -> Option<SourceRecord> {
        let mut tvl_usd = BTreeMap::new();
        for protocol in &self.defi_protocols {
            let source = &self.tvl;
            match self.policy.run("tvl", || source.protocol_tvl(protocol)).await {
                Ok(tvl) => {
                    tvl_usd.insert(protocol.clone(), tvl);
                }
                Err(e) => warn!(protocol = %protocol, error = %e, "TVL fetch failed, omitting"),
            }
        }

        (!tvl_usd.is_empty()).then_some(SourceRecord::TvlData { tvl_usd })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_market, StaticPrices, StaticTvl};
    use std::time::Duration;

    fn aggregator(prices: StaticPrices, tvl: StaticTvl) -> DataAggregator {
        DataAggregator::new(
            Arc::new(prices),
            Arc::new(tvl),
            vec!["bitcoin".to_string(), "ethereum".to_string()],
            vec!["aave".to_string()],
            RetryPolicy::new(Duration::from_millis(200), 1),
        )
    }

    #[tokio::test]
    async fn test_price_category_fetches_prices() {
        let agg = aggregator(
            StaticPrices::new(&[("bitcoin", Some(65000.0)), ("ethereum", None)]),
            StaticTvl::default(),
        );
        let market = sample_market(1, "Crypto PRICE");

        let snapshot = agg.aggregate(&market).await;

        let mut expected = BTreeMap::new();
        expected.insert("bitcoin".to_string(), Some(65000.0));
        expected.insert("ethereum".to_string(), None);
        assert_eq!(snapshot.sources, vec![SourceRecord::PriceData { prices: expected }]);
    }

    #[tokio::test]
    async fn test_failed_coin_is_omitted() {
        // ethereum is not configured in StaticPrices, so its fetch errors
        let agg = aggregator(StaticPrices::new(&[("bitcoin", Some(1.0))]), StaticTvl::default());
        let snapshot = agg.aggregate(&sample_market(1, "crypto")).await;

        match &snapshot.sources[..] {
            [SourceRecord::PriceData { prices }] => {
                assert_eq!(prices.len(), 1);
                assert!(prices.contains_key("bitcoin"));
            }
            other => panic!("unexpected sources: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_empty_snapshot() {
        let agg = aggregator(StaticPrices::failing(), StaticTvl::failing());
        let snapshot = agg.aggregate(&sample_market(1, "DeFi crypto")).await;

        assert!(snapshot.sources.is_empty());
    }

    #[tokio::test]
    async fn test_defi_category_fetches_tvl() {
        let agg = aggregator(StaticPrices::failing(), StaticTvl::new(&[("aave", 1.5e10)]));
        let snapshot = agg.aggregate(&sample_market(1, "defi")).await;

        let mut expected = BTreeMap::new();
        expected.insert("aave".to_string(), 1.5e10);
        assert_eq!(snapshot.sources, vec![SourceRecord::TvlData { tvl_usd: expected }]);
    }

    #[tokio::test]
    async fn test_unrelated_category_fetches_nothing() {
        let prices = StaticPrices::new(&[("bitcoin", Some(1.0)), ("ethereum", Some(2.0))]);
        let calls = prices.calls();
        let agg = aggregator(prices, StaticTvl::default());

        let snapshot = agg.aggregate(&sample_market(1, "Sports")).await;

        assert!(snapshot.sources.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
