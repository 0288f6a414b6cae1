use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::chain::contract::OracleMarkets;
use crate::chain::types::{ChainError, MarketEnded};
use crate::execution::retry::RetryPolicy;
use crate::pipeline::dispatcher::{Dispatcher, Trigger};

/// Polls `MarketEnded` logs and hands every id to the dispatcher unfiltered.
pub struct EventListener {
    contract: Arc<dyn OracleMarkets>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    max_block_range: u64,
    policy: RetryPolicy,
}

impl EventListener {
    pub fn new(
        contract: Arc<dyn OracleMarkets>,
        dispatcher: Dispatcher,
        poll_interval: Duration,
        max_block_range: u64,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            contract,
            dispatcher,
            poll_interval,
            max_block_range: max_block_range.max(1),
            policy,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Cursor starts at the head seen on the first successful poll
        let mut next_block: Option<u64> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("👂 Event listener stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if next_block.is_none() {
                match self.head().await {
                    Ok(head) => {
                        info!(from_block = head, "👂 Listening for MarketEnded events");
                        next_block = Some(head);
                    }
                    Err(e) => {
                        warn!(error = %e, "could not read chain head, retrying next tick");
                        continue;
                    }
                }
            }
            let Some(cursor) = next_block.as_mut() else {
                continue;
            };

            match self.poll_once(cursor).await {
                Ok(events) => {
                    for event in events {
                        info!(
                            market_id = event.market_id,
                            block = ?event.block_number,
                            "📣 MarketEnded"
                        );
                        // Handles are dropped; each market runs detached
                        drop(self.dispatcher.dispatch(event.market_id, Trigger::Event));
                    }
                }
                Err(e) => {
                    warn!(error = %e, from_block = *cursor, "log poll failed, cursor held");
                }
            }
        }
    }

    async fn head(&self) -> Result<u64, ChainError> {
        let contract = &self.contract;
        self.policy.run("eth_blockNumber", || contract.latest_block()).await
    }

    /// Fetch logs from `next_block` up to the head, at most `max_block_range`
    /// blocks at a time. The cursor only moves when the query succeeds.
    pub async fn poll_once(&self, next_block: &mut u64) -> Result<Vec<MarketEnded>, ChainError> {
        let head = self.head().await?;
        if head < *next_block {
            return Ok(Vec::new());
        }

        let from = *next_block;
        let to = head.min(from.saturating_add(self.max_block_range - 1));
        let contract = &self.contract;
        let events = self.policy
            .run("eth_getLogs", || contract.market_ended_events(from, to))
            .await?;

        debug!(from, to, count = events.len(), "polled MarketEnded logs");
        *next_block = to + 1;
        Ok(events)
    }
}
