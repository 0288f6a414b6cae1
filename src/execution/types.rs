use chrono::{DateTime, Utc};
use ethers::types::H256;
use crate::pipeline::dispatcher::Trigger;
use crate::resolution::types::Outcome;

/// A confirmed on-chain resolution made by this resolver
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    pub market_id: u64,
    pub outcome: Outcome,
    pub confidence: f64,
    pub evidence_hash: [u8; 32],
    pub tx_hash: H256,
    pub block_number: u64,
    pub resolved_at: DateTime<Utc>,
}

/// One handler pass for a market that got past the claim
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub market_id: u64,
    pub trigger: Trigger,
    pub outcome: Option<Outcome>,
    pub confidence: Option<f64>,
    pub admitted: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(market_id: u64, trigger: Trigger) -> Self {
        Self {
            market_id,
            trigger,
            outcome: None,
            confidence: None,
            admitted: false,
            error: None,
            attempted_at: Utc::now(),
        }
    }
}
