use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::chain::contract::OracleMarkets;
use crate::chain::types::{ChainError, MarketState};
use crate::execution::guard::IdempotencyGuard;
use crate::execution::retry::RetryPolicy;
use crate::pipeline::dispatcher::{Dispatcher, Trigger};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Ids whose state was read
    pub visited: Vec<u64>,
    /// Ended ids handed to the dispatcher
    pub dispatched: Vec<u64>,
    /// First nonexistent id when walking without `marketCount()`
    pub stopped_at: Option<u64>,
}

pub struct BackfillScanner {
    contract: Arc<dyn OracleMarkets>,
    guard: Arc<IdempotencyGuard>,
    dispatcher: Dispatcher,
    max_scan_markets: u64,
    interval: Duration,
    policy: RetryPolicy,
}

impl BackfillScanner {
    pub fn new(
        contract: Arc<dyn OracleMarkets>,
        guard: Arc<IdempotencyGuard>,
        dispatcher: Dispatcher,
        max_scan_markets: u64,
        interval: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            contract,
            guard,
            dispatcher,
            max_scan_markets,
            interval,
            policy,
        }
    }

    /// Scan on start-up, then every `interval` until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("🔍 Backfill scanner stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // Handlers run on their own tasks; a stalled write must not hold up the next pass
            let report = self.collect().await;
            for market_id in &report.dispatched {
                drop(self.dispatcher.dispatch(*market_id, Trigger::Backfill));
            }
            info!(
                visited = report.visited.len(),
                dispatched = report.dispatched.len(),
                stopped_at = ?report.stopped_at,
                "🔍 Backfill pass complete"
            );
        }
    }

    /// One pass: dispatch every Ended market and wait for those handlers.
    pub async fn scan(&self) -> ScanReport {
        let report = self.collect().await;

        let handles: Vec<_> = report
            .dispatched
            .iter()
            .map(|id| self.dispatcher.dispatch(*id, Trigger::Backfill))
            .collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "backfill handler task panicked");
            }
        }

        report
    }

    /// Enumerate candidate ids without dispatching them.
    pub async fn collect(&self) -> ScanReport {
        let contract = &self.contract;
        let mut report = ScanReport::default();

        let (upper, count_known) = match self.policy.run("marketCount", || contract.market_count()).await {
            Ok(count) => (count, true),
            Err(e) => {
                debug!(error = %e, "marketCount() unavailable, walking ids up to first gap");
                (self.max_scan_markets, false)
            }
        };

        for market_id in 1..=upper {
            if self.guard.is_processed(market_id) {
                continue;
            }

            report.visited.push(market_id);
            match self.policy.run("getMarket", || contract.get_market(market_id)).await {
                Ok(market) if market.state == MarketState::Ended => {
                    report.dispatched.push(market_id);
                }
                Ok(_) => {}
                Err(ChainError::MarketNotFound(_)) if count_known => {
                    debug!(market_id, "gap in market ids, skipping");
                }
                Err(ChainError::MarketNotFound(_)) => {
                    // Later markets are not seen this pass
                    report.stopped_at = Some(market_id);
                    break;
                }
                Err(e) => {
                    warn!(market_id, error = %e, "failed to read market, skipping");
                }
            }
        }

        report
    }
}
