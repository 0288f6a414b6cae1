use chrono::Utc;
use ethers::types::H256;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use crate::chain::contract::OracleMarkets;
use crate::chain::types::{ChainError, MarketState};
use crate::data::aggregator::DataAggregator;
use crate::execution::guard::{ClaimRejected, IdempotencyGuard, MarketClaim};
use crate::execution::persistence::ResolutionDatabase;
use crate::execution::retry::RetryPolicy;
use crate::execution::submitter::TransactionSubmitter;
use crate::execution::types::{AttemptRecord, ResolutionRecord};
use crate::monitoring::logger::CsvLogger;
use crate::pipeline::dispatcher::Trigger;
use crate::resolution::engine::InferenceEngine;
use crate::resolution::gate::ConfidenceGate;

#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Another trigger owns the market, or it was already committed
    Skipped(ClaimRejected),
    NotEnded(MarketState),
    /// Resolved on-chain before we got to it; committed without a write
    AlreadyResolved,
    /// Below the confidence threshold; left Ended for a later pass
    Deferred { confidence: f64 },
    DryRun { outcome_code: u8 },
    Resolved {
        outcome_code: u8,
        tx_hash: H256,
        block_number: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("reading market #{market_id} failed: {source}")]
    Read {
        market_id: u64,
        #[source]
        source: ChainError,
    },

    #[error("submitting resolution for market #{market_id} failed: {source}")]
    Write {
        market_id: u64,
        #[source]
        source: ChainError,
    },
}

pub struct ResolutionPipeline {
    contract: Arc<dyn OracleMarkets>,
    aggregator: DataAggregator,
    engine: InferenceEngine,
    gate: ConfidenceGate,
    submitter: TransactionSubmitter,
    guard: Arc<IdempotencyGuard>,
    db: Mutex<ResolutionDatabase>,
    csv: Option<CsvLogger>,
    read_policy: RetryPolicy,
}

impl ResolutionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract: Arc<dyn OracleMarkets>,
        aggregator: DataAggregator,
        engine: InferenceEngine,
        gate: ConfidenceGate,
        submitter: TransactionSubmitter,
        guard: Arc<IdempotencyGuard>,
        db: ResolutionDatabase,
        csv: Option<CsvLogger>,
        read_policy: RetryPolicy,
    ) -> Self {
        Self {
            contract,
            aggregator,
            engine,
            gate,
            submitter,
            guard,
            db: Mutex::new(db),
            csv,
            read_policy,
        }
    }

    #[cfg(test)]
    pub fn guard(&self) -> &Arc<IdempotencyGuard> {
        &self.guard
    }

    /// Shared entry point for the listener and the scanner.
    ///
    /// The claim is taken before any I/O, so concurrent triggers for the same
    /// market cannot both reach the chain write. The market is committed only
    /// after the resolve transaction is confirmed.
    pub async fn handle_market(
        &self,
        market_id: u64,
        trigger: Trigger,
    ) -> Result<HandleOutcome, PipelineError> {
        let claim = match self.guard.try_claim(market_id) {
            Ok(claim) => claim,
            Err(rejected) => {
                debug!(market_id, %trigger, reason = %rejected, "⏭️  skipping market");
                return Ok(HandleOutcome::Skipped(rejected));
            }
        };

        let mut attempt = AttemptRecord::new(market_id, trigger);
        let result = self.process(claim, &mut attempt).await;
        if let Err(e) = &result {
            attempt.error = Some(e.to_string());
        }
        self.log_attempt(&attempt);
        result
    }

    async fn process(
        &self,
        claim: MarketClaim,
        attempt: &mut AttemptRecord,
    ) -> Result<HandleOutcome, PipelineError> {
        let market_id = claim.market_id();

        let contract = &self.contract;
        let market = self.read_policy
            .run("getMarket", || contract.get_market(market_id))
            .await
            .map_err(|source| PipelineError::Read { market_id, source })?;

        match market.state {
            MarketState::Ended => {}
            MarketState::Resolved => {
                info!(market_id, resolution = %market.resolution, "market already resolved on-chain");
                claim.commit();
                return Ok(HandleOutcome::AlreadyResolved);
            }
            other => {
                debug!(market_id, state = ?other, "market not in Ended state");
                return Ok(HandleOutcome::NotEnded(other));
            }
        }

        info!(
            market_id,
            title = %market.title,
            category = %market.category,
            trigger = %attempt.trigger,
            "🎯 Processing ended market"
        );

        let snapshot = self.aggregator.aggregate(&market).await;
        let candidate = self.engine.infer(&market, &snapshot).await;
        attempt.outcome = Some(candidate.outcome);
        attempt.confidence = Some(candidate.confidence);

        if !self.gate.admits(&candidate) {
            info!(
                market_id,
                confidence = candidate.confidence,
                threshold = self.gate.threshold(),
                reasoning = %candidate.reasoning,
                "⚠️  confidence below threshold, leaving market for a later pass"
            );
            return Ok(HandleOutcome::Deferred {
                confidence: candidate.confidence,
            });
        }
        attempt.admitted = true;

        let submitted = self.submitter
            .submit(market_id, &candidate)
            .await
            .map_err(|source| PipelineError::Write { market_id, source })?;

        let Some(receipt) = submitted.receipt else {
            return Ok(HandleOutcome::DryRun {
                outcome_code: submitted.outcome_code,
            });
        };

        // Commit point: only after confirmation
        claim.commit();

        self.record_resolution(&ResolutionRecord {
            market_id,
            outcome: candidate.outcome,
            confidence: candidate.confidence,
            evidence_hash: submitted.evidence_hash,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            resolved_at: Utc::now(),
        });

        Ok(HandleOutcome::Resolved {
            outcome_code: submitted.outcome_code,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        })
    }

    // Bookkeeping failures are logged only; the chain state is authoritative.
    fn record_resolution(&self, record: &ResolutionRecord) {
        let result = self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
            .and_then(|db| db.record_resolution(record));
        if let Err(e) = result {
            warn!(market_id = record.market_id, error = %e, "failed to persist resolution");
        }
    }

    fn log_attempt(&self, attempt: &AttemptRecord) {
        let result = self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
            .and_then(|db| db.record_attempt(attempt));
        if let Err(e) = result {
            warn!(market_id = attempt.market_id, error = %e, "failed to persist attempt");
        }

        if let Some(csv) = &self.csv {
            if let Err(e) = csv.log_attempt(attempt) {
                warn!(market_id = attempt.market_id, error = %e, "failed to write CSV attempt log");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_db<T>(&self, f: impl FnOnce(&ResolutionDatabase) -> T) -> T {
        let db = self.db.lock().unwrap();
        f(&db)
    }
}
