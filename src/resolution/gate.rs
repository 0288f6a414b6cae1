use crate::resolution::types::ResolutionCandidate;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Admit iff `confidence >= threshold`
    pub fn admits(&self, candidate: &ResolutionCandidate) -> bool {
        candidate.confidence >= self.threshold
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(0.7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::types::Outcome;

    fn candidate(confidence: f64) -> ResolutionCandidate {
        ResolutionCandidate {
            outcome: Outcome::Yes,
            confidence,
            suggested_odds_yes: 9200,
            suggested_odds_no: 9200,
            reasoning: String::new(),
            evidence_sources: Vec::new(),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gate = ConfidenceGate::default();

        assert!(gate.admits(&candidate(0.7)));
        assert!(gate.admits(&candidate(0.85)));
        assert!(!gate.admits(&candidate(0.69)));
        assert!(!gate.admits(&candidate(0.0)));
    }

    #[test]
    fn test_zero_threshold_admits_everything() {
        let gate = ConfidenceGate::new(0.0);
        assert!(gate.admits(&candidate(0.0)));
    }
}
