use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use crate::chain::types::Market;
use crate::data::types::ExternalDataSnapshot;
use crate::execution::retry::RetryPolicy;
use crate::resolution::gemini::ReasoningService;
use crate::resolution::prompt::build_resolution_prompt;
use crate::resolution::types::{OddsRange, Outcome, ResolutionCandidate};

pub const MANUAL_REVIEW_REASONING: &str = "Error querying reasoning service - requires manual review";

/// Shape the reasoning service is asked to answer with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    outcome: String,
    confidence: f64,
    #[serde(default)]
    suggested_odds_yes: Option<f64>,
    #[serde(default)]
    suggested_odds_no: Option<f64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    evidence_sources: Vec<String>,
}

pub struct InferenceEngine {
    service: Arc<dyn ReasoningService>,
    odds: OddsRange,
    policy: RetryPolicy,
}

impl InferenceEngine {
    pub fn new(service: Arc<dyn ReasoningService>, odds: OddsRange, policy: RetryPolicy) -> Self {
        Self {
            service,
            odds,
            policy,
        }
    }

    /// Never fails: every error path ends in the fallback candidate.
    pub async fn infer(&self, market: &Market, snapshot: &ExternalDataSnapshot) -> ResolutionCandidate {
        let prompt = build_resolution_prompt(market, snapshot, self.odds, Utc::now());

        let service = &self.service;
        let prompt_ref = prompt.as_str();
        let text = match self.policy.run("reasoning", || service.generate(prompt_ref)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(market_id = market.id, error = %e, "reasoning service failed");
                return self.fallback();
            }
        };

        match self.parse(&text) {
            Ok(candidate) => {
                info!(
                    market_id = market.id,
                    outcome = %candidate.outcome,
                    confidence = candidate.confidence,
                    "resolution inferred"
                );
                candidate
            }
            Err(e) => {
                warn!(market_id = market.id, error = %e, "unusable reasoning response");
                self.fallback()
            }
        }
    }

    pub fn parse(&self, text: &str) -> Result<ResolutionCandidate> {
        let object = extract_first_json_object(text)
            .ok_or_else(|| anyhow!("No JSON object found in response"))?;
        let raw: RawCandidate = serde_json::from_value(object)?;

        let outcome = Outcome::from_label(&raw.outcome)
            .ok_or_else(|| anyhow!("Unknown outcome label: {}", raw.outcome))?;
        if !raw.confidence.is_finite() {
            anyhow::bail!("Non-finite confidence");
        }

        let clamp_odds = |odds: Option<f64>| match odds {
            Some(v) if v.is_finite() => self.odds.clamp(v.round() as i64),
            _ => self.odds.midpoint(),
        };

        Ok(ResolutionCandidate {
            outcome,
            confidence: raw.confidence.clamp(0.0, 1.0),
            suggested_odds_yes: clamp_odds(raw.suggested_odds_yes),
            suggested_odds_no: clamp_odds(raw.suggested_odds_no),
            reasoning: raw.reasoning,
            evidence_sources: raw.evidence_sources,
        })
    }

    pub fn fallback(&self) -> ResolutionCandidate {
        ResolutionCandidate {
            outcome: Outcome::Undecided,
            confidence: 0.0,
            suggested_odds_yes: self.odds.midpoint(),
            suggested_odds_no: self.odds.midpoint(),
            reasoning: MANUAL_REVIEW_REASONING.to_string(),
            evidence_sources: Vec::new(),
        }
    }
}

/// First substring starting at a `{` that parses as a JSON object.
/// Trailing text after the object (markdown fences, commentary) is ignored.
fn extract_first_json_object(text: &str) -> Option<serde_json::Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(value @ serde_json::Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}
