//! In-process doubles for the chain, data and reasoning seams.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ethers::types::{Address, H256, U256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::chain::contract::OracleMarkets;
use crate::chain::types::{ChainError, Market, MarketEnded, MarketState, ResolutionReceipt};
use crate::data::aggregator::DataAggregator;
use crate::data::coingecko::PriceSource;
use crate::data::defillama::TvlSource;
use crate::execution::guard::IdempotencyGuard;
use crate::execution::persistence::ResolutionDatabase;
use crate::execution::retry::RetryPolicy;
use crate::execution::submitter::TransactionSubmitter;
use crate::pipeline::handler::ResolutionPipeline;
use crate::resolution::engine::InferenceEngine;
use crate::resolution::gate::ConfidenceGate;
use crate::resolution::gemini::ReasoningService;
use crate::resolution::types::{OddsRange, Outcome};

pub fn sample_market(id: u64, category: &str) -> Market {
    Market {
        id,
        creator: Address::repeat_byte(0x11),
        title: format!("Will BTC close above $100k on Jan 1? (#{})", id),
        description: "Resolves YES if the CoinGecko BTC/USD price is above 100000 at end time.".to_string(),
        category: category.to_string(),
        end_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        created_at: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
        state: MarketState::Ended,
        resolution: Outcome::Undecided,
        odds_yes: 9200,
        odds_no: 9200,
        total_yes_pool: U256::exp10(18),
        total_no_pool: U256::exp10(17),
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(200), 2).with_base_delay(Duration::from_millis(1))
}

/// Pipeline over a mock contract with fixed prices, an in-memory database and
/// the default 0.7 gate.
pub fn pipeline_with(
    contract: Arc<MockContract>,
    reasoning: ScriptedReasoning,
    dry_run: bool,
) -> ResolutionPipeline {
    let aggregator = DataAggregator::new(
        Arc::new(StaticPrices::new(&[("bitcoin", Some(101_250.0)), ("ethereum", Some(3_900.0))])),
        Arc::new(StaticTvl::new(&[("aave", 1.2e10)])),
        vec!["bitcoin".to_string(), "ethereum".to_string()],
        vec!["aave".to_string()],
        fast_policy(),
    );
    let engine = InferenceEngine::new(
        Arc::new(reasoning),
        OddsRange::new(9000, 9500),
        fast_policy(),
    );

    ResolutionPipeline::new(
        contract.clone(),
        aggregator,
        engine,
        ConfidenceGate::default(),
        TransactionSubmitter::new(contract, dry_run, Duration::from_secs(5)),
        Arc::new(IdempotencyGuard::new()),
        ResolutionDatabase::new(":memory:").unwrap(),
        None,
        fast_policy(),
    )
}

// ---- chain ----

#[derive(Default)]
struct ChainState {
    markets: BTreeMap<u64, Market>,
    count: Option<u64>,
    resolve_calls: Vec<(u64, u8, [u8; 32])>,
    failing_resolves: usize,
    latest_block: u64,
    events: Vec<MarketEnded>,
    failing_log_queries: usize,
    log_queries: Vec<(u64, u64)>,
}

/// Contract double. `market_count` errors unless `with_count` is set, which
/// puts scanners into first-gap mode.
#[derive(Default)]
pub struct MockContract {
    state: Mutex<ChainState>,
    resolve_delay: Duration,
    get_market_calls: AtomicUsize,
}

impl MockContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market(self, id: u64, category: &str, state: MarketState) -> Self {
        let mut market = sample_market(id, category);
        market.state = state;
        self.state.lock().unwrap().markets.insert(id, market);
        self
    }

    pub fn with_ended_market(self, id: u64, category: &str) -> Self {
        self.with_market(id, category, MarketState::Ended)
    }

    pub fn with_count(self, count: Option<u64>) -> Self {
        self.state.lock().unwrap().count = count;
        self
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn set_state(&self, id: u64, state: MarketState) {
        if let Some(market) = self.state.lock().unwrap().markets.get_mut(&id) {
            market.state = state;
        }
    }

    pub fn market_state(&self, id: u64) -> Option<MarketState> {
        self.state.lock().unwrap().markets.get(&id).map(|m| m.state)
    }

    pub fn fail_next_resolves(&self, n: usize) {
        self.state.lock().unwrap().failing_resolves = n;
    }

    pub fn resolve_calls(&self) -> Vec<(u64, u8, [u8; 32])> {
        self.state.lock().unwrap().resolve_calls.clone()
    }

    pub fn get_market_calls(&self) -> usize {
        self.get_market_calls.load(Ordering::SeqCst)
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().unwrap().latest_block = block;
    }

    pub fn emit_market_ended(&self, market_id: u64, block: u64) {
        self.state.lock().unwrap().events.push(MarketEnded {
            market_id,
            timestamp: 1_767_225_600,
            block_number: Some(block),
        });
    }

    pub fn fail_next_log_queries(&self, n: usize) {
        self.state.lock().unwrap().failing_log_queries = n;
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }
}

#[async_trait]
impl OracleMarkets for MockContract {
    async fn get_market(&self, market_id: u64) -> Result<Market, ChainError> {
        self.get_market_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .markets
            .get(&market_id)
            .cloned()
            .ok_or(ChainError::MarketNotFound(market_id))
    }

    async fn market_count(&self) -> Result<u64, ChainError> {
        self.state
            .lock()
            .unwrap()
            .count
            .ok_or_else(|| ChainError::Decode("marketCount() returned no data".to_string()))
    }

    async fn resolve_market(
        &self,
        market_id: u64,
        outcome_code: u8,
        evidence_hash: [u8; 32],
    ) -> Result<ResolutionReceipt, ChainError> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.resolve_calls.push((market_id, outcome_code, evidence_hash));
            if state.failing_resolves > 0 {
                state.failing_resolves -= 1;
                true
            } else {
                false
            }
        };

        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        if fail {
            return Err(ChainError::Rpc("replacement transaction underpriced".to_string()));
        }

        if let Some(market) = self.state.lock().unwrap().markets.get_mut(&market_id) {
            market.state = MarketState::Resolved;
            market.resolution = Outcome::from_code(outcome_code).unwrap_or(Outcome::Undecided);
        }
        Ok(ResolutionReceipt {
            tx_hash: H256::from_low_u64_be(market_id),
            block_number: 1_000 + market_id,
        })
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().latest_block)
    }

    async fn market_ended_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketEnded>, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((from_block, to_block));
        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(ChainError::Rpc("query returned more than 10000 results".to_string()));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| matches!(e.block_number, Some(b) if b >= from_block && b <= to_block))
            .cloned()
            .collect())
    }
}

// ---- data ----

/// Price source backed by a fixed table. Unlisted coins error.
pub struct StaticPrices {
    prices: Option<HashMap<String, Option<f64>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticPrices {
    pub fn new(prices: &[(&str, Option<f64>)]) -> Self {
        Self {
            prices: Some(prices.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            prices: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PriceSource for StaticPrices {
    async fn usd_price(&self, coin_id: &str) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .as_ref()
            .ok_or_else(|| anyhow!("price service unreachable"))?
            .get(coin_id)
            .copied()
            .ok_or_else(|| anyhow!("no fixture for {}", coin_id))
    }
}

#[derive(Default)]
pub struct StaticTvl {
    tvl: HashMap<String, f64>,
    failing: bool,
}

impl StaticTvl {
    pub fn new(tvl: &[(&str, f64)]) -> Self {
        Self {
            tvl: tvl.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            tvl: HashMap::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl TvlSource for StaticTvl {
    async fn protocol_tvl(&self, protocol: &str) -> Result<f64> {
        if self.failing {
            anyhow::bail!("TVL service unreachable");
        }
        self.tvl
            .get(protocol)
            .copied()
            .ok_or_else(|| anyhow!("unknown protocol {}", protocol))
    }
}

// ---- reasoning ----

pub struct ScriptedReasoning {
    reply: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedReasoning {
    pub fn reply(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
        }
    }

    /// Answers confidently, but only after `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            reply: Some(r#"{"outcome":"YES","confidence":0.95}"#.to_string()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("Gemini API error 503: model overloaded"))
    }
}
