use chrono::Utc;
use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use crate::chain::contract::OracleMarkets;
use crate::chain::types::{ChainError, ResolutionReceipt};
use crate::execution::evidence::EvidenceRecord;
use crate::resolution::types::ResolutionCandidate;

#[derive(Debug, Clone)]
pub struct SubmittedResolution {
    pub outcome_code: u8,
    pub evidence_hash: [u8; 32],
    /// `None` in dry-run mode
    pub receipt: Option<ResolutionReceipt>,
}

pub struct TransactionSubmitter {
    contract: Arc<dyn OracleMarkets>,
    dry_run: bool,
    // covers estimate, send and confirmation together
    write_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(contract: Arc<dyn OracleMarkets>, dry_run: bool, write_timeout: Duration) -> Self {
        Self {
            contract,
            dry_run,
            write_timeout,
        }
    }

    /// Submits `resolveMarket` and waits for confirmation. Not retried here: a
    /// failed write is retried by the next trigger after re-reading market state.
    pub async fn submit(
        &self,
        market_id: u64,
        candidate: &ResolutionCandidate,
    ) -> Result<SubmittedResolution, ChainError> {
        let outcome_code = candidate.outcome.code();
        let evidence = EvidenceRecord::from_candidate(candidate, Utc::now());
        let evidence_hash = evidence
            .hash()
            .map_err(|e| ChainError::Decode(format!("evidence serialization failed: {}", e)))?;

        if self.dry_run {
            info!(
                market_id,
                outcome_code,
                evidence_hash = ?H256::from(evidence_hash),
                "DRY RUN: would submit resolveMarket"
            );
            return Ok(SubmittedResolution {
                outcome_code,
                evidence_hash,
                receipt: None,
            });
        }

        info!(market_id, outcome_code, "📤 Submitting resolution to chain");
        let write = self.contract.resolve_market(market_id, outcome_code, evidence_hash);
        let receipt = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(market_id, timeout = ?self.write_timeout, "resolveMarket did not finish in time");
                return Err(ChainError::Timeout(self.write_timeout));
            }
        };
        info!(
            market_id,
            tx_hash = ?receipt.tx_hash,
            block = receipt.block_number,
            "✅ Resolution confirmed"
        );

        Ok(SubmittedResolution {
            outcome_code,
            evidence_hash,
            receipt: Some(receipt),
        })
    }
}
