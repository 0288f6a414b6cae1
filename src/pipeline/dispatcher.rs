use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use crate::pipeline::handler::{HandleOutcome, ResolutionPipeline};

/// Which discovery path surfaced a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Event,
    Backfill,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Event => write!(f, "event"),
            Trigger::Backfill => write!(f, "backfill"),
        }
    }
}

/// Single funnel for both triggers. Each market runs on its own task so a slow
/// market never holds up another; duplicate ids are dropped at the pipeline's claim.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<ResolutionPipeline>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<ResolutionPipeline>) -> Self {
        Self { pipeline }
    }

    /// Resolves to `None` when handling failed; failures are logged, never propagated.
    pub fn dispatch(&self, market_id: u64, trigger: Trigger) -> JoinHandle<Option<HandleOutcome>> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            match pipeline.handle_market(market_id, trigger).await {
                Ok(outcome) => {
                    match &outcome {
                        HandleOutcome::Skipped(reason) => {
                            debug!(market_id, %trigger, %reason, "market skipped")
                        }
                        other => info!(market_id, %trigger, outcome = ?other, "market handled"),
                    }
                    Some(outcome)
                }
                Err(e) => {
                    error!(
                        market_id,
                        %trigger,
                        error = %e,
                        "❌ market handling failed, will retry on next trigger"
                    );
                    None
                }
            }
        })
    }
}
