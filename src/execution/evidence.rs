use anyhow::Result;
use chrono::{DateTime, Utc};
use ethers::utils::keccak256;
use serde::Serialize;
use crate::resolution::types::{Outcome, ResolutionCandidate};

/// Off-chain evidence whose digest is stored on-chain with the outcome.
/// Field order is the canonical serialization order.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRecord {
    pub outcome: Outcome,
    pub confidence: f64,
    pub reasoning: String,
    pub sources: Vec<String>,
    /// Capture time in ms since epoch
    pub timestamp: i64,
}

impl EvidenceRecord {
    pub fn from_candidate(candidate: &ResolutionCandidate, captured_at: DateTime<Utc>) -> Self {
        Self {
            outcome: candidate.outcome,
            confidence: candidate.confidence,
            reasoning: candidate.reasoning.clone(),
            sources: candidate.evidence_sources.clone(),
            timestamp: captured_at.timestamp_millis(),
        }
    }

    pub fn canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Keccak-256 of the canonical JSON's UTF-8 bytes
    pub fn hash(&self) -> Result<[u8; 32]> {
        Ok(keccak256(self.canonical_json()?.as_bytes()))
    }
}
